//! Modbus RTU over raw TCP, for RS-485 to Ethernet bridges.
//!
//! Frames are plain RTU (slave address, PDU, CRC-16) written to a TCP socket
//! with no MBAP header. Only "read input registers" is exercised.

pub mod codec;
pub mod config;
pub mod core;
pub mod crc;
pub mod instrument;
pub mod modbus_rtu;
pub mod retry;
pub mod transport;

pub use codec::{ByteOrder, CodecError, NumericValue};
pub use config::{ConfigError, Rs485EthConfig};
pub use crate::core::{DecodeParams, PayloadFormat, ReadUnit, ReadUnitBuilder, RequestError};
pub use instrument::Instrument;
pub use modbus_rtu::{ModbusRTU, ProtocolError};
pub use retry::RetryPolicy;
pub use transport::{TcpTransport, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    #[error(transparent)]
    NoResponse(#[from] TransportError),

    #[error("Invalid response: {0}")]
    InvalidResponse(#[from] ProtocolError),

    #[error("Decode failed: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
}

impl InstrumentError {
    /// Connectivity failure, as opposed to a bad or undecodable reply.
    pub fn is_transport(&self) -> bool {
        matches!(self, InstrumentError::NoResponse(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, InstrumentError::InvalidResponse(_))
    }

    pub fn is_codec(&self) -> bool {
        matches!(self, InstrumentError::Codec(_))
    }
}
