use thiserror::Error;
use tracing::warn;

use crate::core::ReadUnit;
use crate::crc::{self, CRC_LEN};

/// Address byte + header byte + CRC.
pub const MIN_RESPONSE_LEN: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Frame too short: {length} bytes (minimum 4)")]
    TooShort { length: usize },

    #[error("CRC mismatch: expected {expected:02X?}, received {received:02X?}")]
    ChecksumMismatch { expected: [u8; 2], received: [u8; 2] },

    #[error("Slave address mismatch: expected {expected}, received {received}")]
    AddressMismatch { expected: u8, received: u8 },

    #[error("Slave exception {exception_code:#04X} for function {function_code:#04X}")]
    Exception { function_code: u8, exception_code: u8 },

    #[error("Unexpected function code: expected {expected:#04X}, received {received:#04X}")]
    UnexpectedFunctionCode { expected: u8, received: u8 },

    #[error("Byte count mismatch: expected {expected}, declared {declared}, carried {carried}")]
    ByteCountMismatch {
        expected: usize,
        declared: usize,
        carried: usize,
    },
}

/// `[slave, function_code, address(BE), count(BE), crc(LE)]`
pub fn build_request(slave_address: u8, unit: &ReadUnit) -> Vec<u8> {
    let pdu = unit.create_read_request();
    let mut frame = Vec::with_capacity(1 + pdu.len() + CRC_LEN);
    frame.push(slave_address);
    frame.extend(pdu);
    crc::append_crc(&mut frame);
    frame
}

/// A response that passed the length, CRC and address checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFrame<'a> {
    pub address: u8,
    /// Byte 1 of the frame: the echoed function code on standard replies,
    /// the byte count on bridges that omit it.
    pub header: u8,
    payload: &'a [u8],
}

impl<'a> ResponseFrame<'a> {
    /// Everything between the header byte and the CRC.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// The register bytes for a read of `register_count` registers with
    /// `function_code`.
    ///
    /// A standard reply carries `[count, data..]` after the echoed function
    /// code; the count byte is dropped. Bridges that omit the echo put the
    /// count in the header and the whole payload is data. Register data has
    /// even length, so at most one reading fits a frame.
    pub fn register_data(&self, function_code: u8, register_count: u16) -> Result<&'a [u8], ProtocolError> {
        let expected = usize::from(register_count) * 2;

        let (declared, data) = match self.payload.split_first() {
            Some((&count, data)) if usize::from(count) == data.len() && data.len() % 2 == 0 => {
                if self.header != function_code {
                    warn!(expected = function_code, received = self.header, "unexpected function code");
                    return Err(ProtocolError::UnexpectedFunctionCode {
                        expected: function_code,
                        received: self.header,
                    });
                }
                (usize::from(count), data)
            }
            _ => (usize::from(self.header), self.payload),
        };

        if declared != expected || data.len() != expected {
            warn!(expected, declared, carried = data.len(), "byte count mismatch");
            return Err(ProtocolError::ByteCountMismatch {
                expected,
                declared,
                carried: data.len(),
            });
        }
        Ok(data)
    }
}

/// Validates length, CRC and slave address, in that order, then rejects
/// exception replies.
pub fn parse_response(raw: &[u8], expected_slave_address: u8) -> Result<ResponseFrame<'_>, ProtocolError> {
    if raw.len() < MIN_RESPONSE_LEN {
        return Err(ProtocolError::TooShort { length: raw.len() });
    }

    let body = crc::verify_crc(raw)?;

    let received = body[0];
    if received != expected_slave_address {
        warn!(expected = expected_slave_address, received, "slave address mismatch");
        return Err(ProtocolError::AddressMismatch {
            expected: expected_slave_address,
            received,
        });
    }

    let header = body[1];
    let payload = &body[2..];
    // A set high bit is a byte count only if the payload is that long.
    if header & 0x80 != 0 && usize::from(header) != payload.len() {
        let exception_code = payload.first().copied().unwrap_or(0);
        warn!(function_code = header & 0x7F, exception_code, "slave returned an exception");
        return Err(ProtocolError::Exception {
            function_code: header & 0x7F,
            exception_code,
        });
    }

    Ok(ResponseFrame {
        address: received,
        header,
        payload,
    })
}

/// RTU framing bound to one slave and one read.
#[derive(Debug, Clone, Copy)]
pub struct ModbusRTU {
    unit: ReadUnit,
    slave_address: u8,
}

impl ModbusRTU {
    pub fn new(unit: ReadUnit, slave_address: u8) -> Self {
        Self { unit, slave_address }
    }

    pub fn create_read_request(&self) -> Vec<u8> {
        build_request(self.slave_address, &self.unit)
    }

    /// Validates `frame` and returns its register data.
    pub fn parse_response<'a>(&self, frame: &'a [u8]) -> Result<&'a [u8], ProtocolError> {
        let response = parse_response(frame, self.slave_address)?;
        response.register_data(self.unit.function_code(), self.unit.count())
    }
}
