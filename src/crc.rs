//! CRC-16/Modbus: reflected polynomial 0xA001, register preloaded with 0xFFFF,
//! transmitted low byte first.

use tracing::warn;

use crate::modbus_rtu::ProtocolError;

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const CRC16_TABLE: [u16; 256] = build_crc16_table();

/// Number of checksum bytes trailing every RTU frame.
pub const CRC_LEN: usize = 2;

/// CRC register value after one pass over `data`.
pub fn crc16_u16(data: &[u8]) -> u16 {
    let mut register: u16 = 0xFFFF;
    for &byte in data {
        let idx = ((register ^ byte as u16) & 0x00FF) as usize;
        register = (register >> 8) ^ CRC16_TABLE[idx];
    }
    register
}

/// CRC of `data` in wire order (low byte first).
pub fn crc16(data: &[u8]) -> [u8; 2] {
    crc16_u16(data).to_le_bytes()
}

/// Appends the CRC of the current buffer contents.
pub fn append_crc(buffer: &mut Vec<u8>) {
    let crc = crc16(buffer);
    buffer.extend_from_slice(&crc);
}

/// Checks the trailing two bytes of `frame` against the CRC of everything
/// before them and returns the checked body.
pub fn verify_crc(frame: &[u8]) -> Result<&[u8], ProtocolError> {
    if frame.len() < CRC_LEN {
        return Err(ProtocolError::TooShort { length: frame.len() });
    }

    let (body, trailer) = frame.split_at(frame.len() - CRC_LEN);
    let expected = crc16(body);
    let received = [trailer[0], trailer[1]];

    if expected != received {
        warn!(?expected, ?received, "crc mismatch");
        return Err(ProtocolError::ChecksumMismatch { expected, received });
    }

    Ok(body)
}
