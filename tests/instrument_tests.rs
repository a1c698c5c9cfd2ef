use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rs485eth_modbus::crc::append_crc;
use rs485eth_modbus::{
    ByteOrder, DecodeParams, Instrument, InstrumentError, NumericValue, ProtocolError,
    TcpTransport, Transport, TransportError,
};

fn with_crc(body: &[u8]) -> Vec<u8> {
    let mut frame = body.to_vec();
    append_crc(&mut frame);
    frame
}

/// Accepts `connections` sockets, answers each 8-byte request with `reply`
/// and closes it. Returns the requests it saw.
struct MockBridge {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    handle: JoinHandle<Vec<Vec<u8>>>,
}

impl MockBridge {
    fn start(connections: usize, reply: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should be available");
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for _ in 0..connections {
                let (mut stream, _) = listener.accept().expect("accept should succeed");
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = [0u8; 8];
                stream.read_exact(&mut request).expect("request should arrive");
                requests.push(request.to_vec());
                if !reply.is_empty() {
                    stream.write_all(&reply).expect("reply should be written");
                }
            }
            requests
        });

        Self {
            addr,
            accepted,
            handle,
        }
    }

    fn instrument(&self) -> Instrument {
        Instrument::connect(self.addr.ip().to_string(), self.addr.port())
    }

    fn finish(self) -> (usize, Vec<Vec<u8>>) {
        let requests = self.handle.join().expect("mock bridge should join");
        (self.accepted.load(Ordering::SeqCst), requests)
    }
}

#[cfg(test)]
mod tcp_tests {
    use super::*;

    #[test]
    fn test_read_serial_number_low_word() {
        let bridge = MockBridge::start(1, with_crc(&[0x01, 0x02, 0x04, 0xD2]));
        let instrument = bridge.instrument();

        let value = instrument.read_register(3062, 0, false).unwrap();
        assert_eq!(value, NumericValue::Integer(1234));

        let (accepted, requests) = bridge.finish();
        assert_eq!(accepted, 1);
        assert_eq!(
            requests[0],
            vec![0x01, 0x04, 0x0B, 0xF6, 0x00, 0x01, 0xD3, 0xDC]
        );
    }

    #[test]
    fn test_read_standard_reply_with_function_echo() {
        let bridge = MockBridge::start(1, with_crc(&[0x01, 0x04, 0x02, 0x02, 0x6E]));
        let value = bridge.instrument().read_register(3000, 1, false).unwrap();
        assert_eq!(value, NumericValue::Float(62.2));
        bridge.finish();
    }

    #[test]
    fn test_read_long() {
        let bridge = MockBridge::start(1, with_crc(&[0x01, 0x04, 0x04, 0x00, 0x00, 0x01, 0x00]));
        let value = bridge
            .instrument()
            .read_long(3062, false, ByteOrder::Big, 0)
            .unwrap();
        assert_eq!(value, NumericValue::Integer(256));

        let (_, requests) = bridge.finish();
        assert_eq!(requests[0][4..6], [0x00, 0x02]);
    }

    #[test]
    fn test_repeated_reads_open_one_socket_each() {
        let calls = 3;
        let bridge = MockBridge::start(calls, with_crc(&[0x01, 0x02, 0x04, 0xD2]));
        let instrument = bridge.instrument();

        let values: Vec<NumericValue> = (0..calls)
            .map(|_| instrument.read_register(3062, 0, false).unwrap())
            .collect();
        assert!(values.iter().all(|v| *v == NumericValue::Integer(1234)));

        let (accepted, requests) = bridge.finish();
        assert_eq!(accepted, calls);
        assert!(requests.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_concurrent_reads_from_cloned_handles() {
        let bridge = MockBridge::start(4, with_crc(&[0x01, 0x02, 0x04, 0xD2]));
        let instrument = bridge.instrument();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let instrument = instrument.clone();
                thread::spawn(move || instrument.read_register(3062, 0, false))
            })
            .collect();
        for worker in workers {
            let value = worker.join().expect("worker should join").unwrap();
            assert_eq!(value, NumericValue::Integer(1234));
        }

        let (accepted, _) = bridge.finish();
        assert_eq!(accepted, 4);
    }

    #[test]
    fn test_checksum_error_is_protocol_error() {
        let bridge = MockBridge::start(1, vec![0x01, 0x02, 0x04, 0xD2, 0x00, 0x00]);
        let result = bridge.instrument().read_register(3062, 0, false);
        let err = result.unwrap_err();
        assert!(err.is_protocol());
        assert!(matches!(
            err,
            InstrumentError::InvalidResponse(ProtocolError::ChecksumMismatch { .. })
        ));
        bridge.finish();
    }

    #[test]
    fn test_address_mismatch_from_other_slave() {
        let bridge = MockBridge::start(1, with_crc(&[0x02, 0x02, 0x04, 0xD2]));
        let result = bridge.instrument().read_register(3062, 0, false);
        assert!(matches!(
            result,
            Err(InstrumentError::InvalidResponse(ProtocolError::AddressMismatch {
                expected: 1,
                received: 2,
            }))
        ));
        bridge.finish();
    }

    #[test]
    fn test_custom_slave_address() {
        let bridge = MockBridge::start(1, with_crc(&[0x07, 0x02, 0x00, 0x2A]));
        let instrument = bridge.instrument().with_slave_address(7);
        assert_eq!(instrument.read_register(10, 0, false).unwrap(), NumericValue::Integer(42));

        let (_, requests) = bridge.finish();
        assert_eq!(requests[0][0], 0x07);
    }

    #[test]
    fn test_short_reply_is_too_short() {
        let bridge = MockBridge::start(1, vec![0x01, 0x02, 0x04]);
        let result = bridge.instrument().read_register(3062, 0, false);
        assert!(matches!(
            result,
            Err(InstrumentError::InvalidResponse(ProtocolError::TooShort { length: 3 }))
        ));
        bridge.finish();
    }

    #[test]
    fn test_slave_exception_is_protocol_error() {
        let bridge = MockBridge::start(1, with_crc(&[0x01, 0x84, 0x02]));
        let err = bridge.instrument().read_register(3062, 0, false).unwrap_err();
        assert!(err.is_protocol());
        assert!(!err.is_codec());
        assert_eq!(
            err.to_string(),
            "Invalid response: Slave exception 0x02 for function 0x04"
        );
        assert!(matches!(
            err,
            InstrumentError::InvalidResponse(ProtocolError::Exception {
                function_code: 0x04,
                exception_code: 0x02,
            })
        ));
        bridge.finish();
    }

    #[test]
    fn test_wrong_function_echo_is_protocol_error() {
        let bridge = MockBridge::start(1, with_crc(&[0x01, 0x03, 0x02, 0x04, 0xD2]));
        let err = bridge.instrument().read_register(3062, 0, false).unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::InvalidResponse(ProtocolError::UnexpectedFunctionCode {
                expected: 0x04,
                received: 0x03,
            })
        ));
        bridge.finish();
    }

    #[test]
    fn test_short_register_data_is_protocol_error() {
        // Three data bytes cannot form one register.
        let bridge = MockBridge::start(1, with_crc(&[0x01, 0x03, 0x00, 0x01, 0x02]));
        let err = bridge.instrument().read_register(3062, 0, false).unwrap_err();
        assert!(err.is_protocol());
        assert!(matches!(
            err,
            InstrumentError::InvalidResponse(ProtocolError::ByteCountMismatch { expected: 2, .. })
        ));
        bridge.finish();
    }

    #[test]
    fn test_long_reply_for_register_read_is_protocol_error() {
        let bridge = MockBridge::start(1, with_crc(&[0x01, 0x04, 0x04, 0x00, 0x00, 0x01, 0x00]));
        let err = bridge.instrument().read_register(3062, 0, false).unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::InvalidResponse(ProtocolError::ByteCountMismatch {
                expected: 2,
                declared: 4,
                carried: 4,
            })
        ));
        bridge.finish();
    }

    #[test]
    fn test_empty_reply_is_no_response() {
        let bridge = MockBridge::start(1, Vec::new());
        let err = bridge.instrument().read_register(3062, 0, false).unwrap_err();
        assert!(err.is_transport());
        assert!(matches!(
            err,
            InstrumentError::NoResponse(TransportError::NoResponse { source: None, .. })
        ));
        bridge.finish();
    }

    #[test]
    fn test_connection_refused_is_no_response() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let instrument = Instrument::connect("127.0.0.1", addr.port());
        let err = instrument.read_register(3062, 0, false).unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::NoResponse(TransportError::NoResponse { source: Some(_), .. })
        ));
    }

    #[test]
    fn test_silent_bridge_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            let _ = done_rx.recv_timeout(Duration::from_secs(5));
        });

        let transport = TcpTransport::new("127.0.0.1", addr.port())
            .with_timeout(Duration::from_millis(200));
        let instrument = Instrument::with_transport(transport);
        let err = instrument.read_register(3062, 0, false).unwrap_err();
        assert!(err.is_transport());

        done_tx.send(()).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn test_connect_does_no_io() {
        let instrument = Instrument::connect("192.0.2.1", 502);
        assert_eq!(instrument.slave_address(), 1);
        assert_eq!(instrument.transport().endpoint(), "192.0.2.1:502");
        assert_eq!(instrument.transport().timeout(), Duration::from_secs(1));
        assert_eq!(instrument.transport().buffer_size(), 1024);
        instrument.shutdown();
    }
}

/// Replays canned replies and records the requests it was given.
struct ScriptedTransport {
    replies: Mutex<Vec<Vec<u8>>>,
    requests: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedTransport {
    fn new(replies: Vec<Vec<u8>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl Transport for ScriptedTransport {
    fn send_and_receive(&self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.requests.lock().unwrap().push(request.to_vec());
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(TransportError::NoResponse {
                endpoint: "script".to_string(),
                source: None,
            });
        }
        Ok(replies.remove(0))
    }
}

#[cfg(test)]
mod decode_tests {
    use super::*;

    #[test]
    fn test_read_long_big_swap() {
        let transport = ScriptedTransport::new(vec![with_crc(&[0x01, 0x04, 0x04, 0x00, 0x01, 0x00, 0x00])]);
        let instrument = Instrument::with_transport(transport);

        let value = instrument.read_long(100, false, ByteOrder::BigSwap, 0).unwrap();
        assert_eq!(value, NumericValue::Integer(0x0100_0000));
    }

    #[test]
    fn test_read_long_signed_scaled() {
        // -1500 big-endian
        let transport = ScriptedTransport::new(vec![with_crc(&[0x01, 0x04, 0x04, 0xFF, 0xFF, 0xFA, 0x24])]);
        let instrument = Instrument::with_transport(transport);

        let value = instrument.read_long(100, true, ByteOrder::Big, 1).unwrap();
        assert_eq!(value, NumericValue::Float(-150.0));
    }

    #[test]
    fn test_read_value_generic_entry() {
        let transport = ScriptedTransport::new(vec![with_crc(&[0x01, 0x02, 0xFF, 0xF6])]);
        let instrument = Instrument::with_transport(transport);

        let value = instrument
            .read_value(3000, 1, DecodeParams::register(0, true))
            .unwrap();
        assert_eq!(value, NumericValue::Integer(-10));
        assert_eq!(
            instrument.transport().requests.lock().unwrap()[0],
            vec![0x01, 0x04, 0x0B, 0xB8, 0x00, 0x01, 0xB3, 0xCB]
        );
    }

    #[test]
    fn test_invalid_count_never_reaches_transport() {
        let instrument = Instrument::with_transport(ScriptedTransport::new(Vec::new()));
        let result = instrument.read_value(3000, 0, DecodeParams::register(0, false));
        assert!(matches!(result, Err(InstrumentError::InvalidRequest(_))));
        assert!(instrument.transport().requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_count_wider_than_format_is_codec_error() {
        let transport = ScriptedTransport::new(vec![with_crc(&[0x01, 0x04, 0x04, 0x00, 0x01, 0x00, 0x02])]);
        let instrument = Instrument::with_transport(transport);

        let err = instrument
            .read_value(3000, 2, DecodeParams::register(0, false))
            .unwrap_err();
        assert!(err.is_codec());
        assert!(!err.is_protocol());
    }

    #[test]
    fn test_no_retry_inside_instrument() {
        let instrument = Instrument::with_transport(ScriptedTransport::new(Vec::new()));
        assert!(instrument.read_register(3000, 0, false).is_err());
        assert_eq!(instrument.transport().requests.lock().unwrap().len(), 1);
    }
}
