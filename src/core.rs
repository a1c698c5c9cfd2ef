use thiserror::Error;

use crate::codec::{self, ByteOrder, CodecError, NumericValue};

/// Function code 0x04, the only read the bridge firmware answers.
pub const READ_INPUT_REGISTERS: u8 = 0x04;

/// Largest register count a single Modbus read may request.
pub const MAX_REGISTER_COUNT: u16 = 125;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Start address is empty")]
    MissingAddress,

    #[error("Invalid register count: {0} (expected 1..=125)")]
    InvalidCount(u16),

    #[error("Invalid function code: {0:#04x}")]
    InvalidFunctionCode(u8),
}

/// How the register data of a response is turned into a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// One register, optionally signed.
    #[default]
    Register,
    /// Two registers forming a 32-bit integer.
    Long,
}

impl PayloadFormat {
    pub fn register_count(self) -> u16 {
        match self {
            PayloadFormat::Register => 1,
            PayloadFormat::Long => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeParams {
    pub format: PayloadFormat,
    pub decimals: u8,
    pub signed: bool,
    pub byte_order: ByteOrder,
}

impl DecodeParams {
    pub fn register(decimals: u8, signed: bool) -> Self {
        Self {
            format: PayloadFormat::Register,
            decimals,
            signed,
            byte_order: ByteOrder::Big,
        }
    }

    pub fn long(signed: bool, byte_order: ByteOrder, decimals: u8) -> Self {
        Self {
            format: PayloadFormat::Long,
            decimals,
            signed,
            byte_order,
        }
    }

    pub fn decode(&self, data: &[u8]) -> Result<NumericValue, CodecError> {
        match self.format {
            PayloadFormat::Register => codec::decode_register(data, self.decimals, self.signed),
            PayloadFormat::Long => codec::decode_long(data, self.signed, self.byte_order, self.decimals),
        }
    }
}

/// One validated register read: where to read, how many registers, and with
/// which function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadUnit {
    start_addr: u16,
    count: u16,
    function_code: u8,
}

#[derive(Debug, Default)]
pub struct ReadUnitBuilder {
    start_addr: Option<u16>,
    count: Option<u16>,
    function_code: Option<u8>,
}

impl ReadUnitBuilder {
    pub fn address(mut self, addr: u16) -> Self {
        self.start_addr = Some(addr);
        self
    }

    pub fn count(mut self, count: u16) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_function_code(mut self, function_code: u8) -> Self {
        self.function_code = Some(function_code);
        self
    }

    pub fn build(self) -> Result<ReadUnit, RequestError> {
        let start_addr = self.start_addr.ok_or(RequestError::MissingAddress)?;

        let count = self.count.unwrap_or(1);
        if count == 0 || count > MAX_REGISTER_COUNT {
            return Err(RequestError::InvalidCount(count));
        }

        // Codes with the high bit set are exception replies.
        let function_code = self.function_code.unwrap_or(READ_INPUT_REGISTERS);
        if function_code == 0 || function_code & 0x80 != 0 {
            return Err(RequestError::InvalidFunctionCode(function_code));
        }

        Ok(ReadUnit {
            start_addr,
            count,
            function_code,
        })
    }
}

impl ReadUnit {
    pub fn builder() -> ReadUnitBuilder {
        ReadUnitBuilder::default()
    }

    pub fn start_addr(&self) -> u16 {
        self.start_addr
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn function_code(&self) -> u8 {
        self.function_code
    }

    /// `[function_code, address_hi, address_lo, count_hi, count_lo]`
    pub fn create_read_request(&self) -> Vec<u8> {
        let mut pdu = Vec::with_capacity(5);
        pdu.push(self.function_code);
        pdu.extend_from_slice(&self.start_addr.to_be_bytes());
        pdu.extend_from_slice(&self.count.to_be_bytes());
        pdu
    }
}
