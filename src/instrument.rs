//! Public entry point: one call, one request/response cycle, one value.

use tracing::{debug, info};

use crate::InstrumentError;
use crate::codec::{ByteOrder, NumericValue};
use crate::core::{DecodeParams, ReadUnit};
use crate::modbus_rtu::ModbusRTU;
use crate::transport::{TcpTransport, Transport};

pub const DEFAULT_SLAVE_ADDRESS: u8 = 1;
pub const DEFAULT_PORT: u16 = 502;

/// Handle to one slave behind an RS-485/Ethernet bridge.
///
/// Holds only the endpoint and slave address. No socket is kept between
/// calls, so a handle may be cloned and used from several threads.
#[derive(Debug, Clone)]
pub struct Instrument<T = TcpTransport> {
    transport: T,
    slave_address: u8,
}

impl Instrument<TcpTransport> {
    /// Creates a handle without touching the network.
    pub fn connect(host: impl Into<String>, port: u16) -> Self {
        Self::with_transport(TcpTransport::new(host, port))
    }
}

impl<T: Transport> Instrument<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            slave_address: DEFAULT_SLAVE_ADDRESS,
        }
    }

    pub fn with_slave_address(mut self, slave_address: u8) -> Self {
        self.slave_address = slave_address;
        self
    }

    pub fn slave_address(&self) -> u8 {
        self.slave_address
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Reads `count` input registers starting at `register_address` and
    /// decodes them with `params`.
    pub fn read_value(
        &self,
        register_address: u16,
        count: u16,
        params: DecodeParams,
    ) -> Result<NumericValue, InstrumentError> {
        let unit = ReadUnit::builder()
            .address(register_address)
            .count(count)
            .build()?;
        let rtu = ModbusRTU::new(unit, self.slave_address);

        let request = rtu.create_read_request();
        let response = self.transport.send_and_receive(&request)?;
        let data = rtu.parse_response(&response)?;
        let value = params.decode(data)?;

        debug!(
            slave = self.slave_address,
            register = register_address,
            count,
            %value,
            "read value"
        );
        Ok(value)
    }

    pub fn read_register(
        &self,
        register_address: u16,
        decimals: u8,
        signed: bool,
    ) -> Result<NumericValue, InstrumentError> {
        let params = DecodeParams::register(decimals, signed);
        self.read_value(register_address, params.format.register_count(), params)
    }

    pub fn read_long(
        &self,
        register_address: u16,
        signed: bool,
        byte_order: ByteOrder,
        decimals: u8,
    ) -> Result<NumericValue, InstrumentError> {
        let params = DecodeParams::long(signed, byte_order, decimals);
        self.read_value(register_address, params.format.register_count(), params)
    }

    /// Releases the handle. Calls are synchronous, so nothing is in flight.
    pub fn shutdown(self) {
        info!(slave = self.slave_address, "instrument released");
    }
}
