//! We use this mocking module in unit tests to emulate a serial port with a 1788B on the far end.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    frame::{FRAME_LEN, Frame},
    transport::Transport,
    types::{Command, StatusCode},
};

/// Builds the reply to one complete 26-byte request.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Something that happened on the mock link, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Stale inbound bytes thrown away.
    Discard(usize),
    /// A full request frame was written; holds its command byte.
    Write(u8),
    /// Bytes handed to a reader.
    Read(Vec<u8>),
}

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Everything written to the mock serial port
    written: Vec<u8>,
    /// Request bytes that have not yet formed a whole frame
    pending: Vec<u8>,
    /// Bytes waiting to be read
    inbound: VecDeque<u8>,
    /// Canned replies, released one per request
    responses: VecDeque<Vec<u8>>,
    responder: Option<Responder>,
    events: Arc<Mutex<Vec<Event>>>,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors, including when discarding input
    should_error_on_read: bool,
    /// Flag to simulate errors on `read` only
    should_error_on_receive: bool,
    /// Number of upcoming reads that are interrupted
    interrupted_reads: usize,
    /// Hand out one byte per read, each after this delay
    byte_delay: Option<Duration>,
    /// Last per-read timeout set by the driver
    read_timeout: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum MockSerialError {
    /// Nothing left to read
    #[error("Mock read timed out")]
    Timeout,
    /// Read interrupted by a signal, worth retrying
    #[error("Mock read interrupted")]
    Interrupted,
    /// Generic simulated error for testing
    #[error("Simulated serial error")]
    SimulatedError,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::Interrupted => embedded_io::ErrorKind::Interrupted,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }

        self.written.extend_from_slice(buf);
        self.pending.extend_from_slice(buf);

        while self.pending.len() >= FRAME_LEN {
            let request: Vec<u8> = self.pending.drain(..FRAME_LEN).collect();
            self.record(Event::Write(request[2]));

            let reply = match self.responder.as_mut() {
                Some(responder) => Some(responder(&request[..])),
                None => self.responses.pop_front(),
            };
            if let Some(reply) = reply {
                self.inbound.extend(reply);
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read || self.should_error_on_receive {
            return Err(MockSerialError::SimulatedError);
        }

        if self.interrupted_reads > 0 {
            self.interrupted_reads -= 1;
            return Err(MockSerialError::Interrupted);
        }

        let mut limit = buf.len();
        if let Some(delay) = self.byte_delay {
            let wait = self.read_timeout.map_or(delay, |timeout| timeout.min(delay));
            std::thread::sleep(wait);
            if wait < delay {
                return Err(MockSerialError::Timeout);
            }
            limit = 1;
        }

        if self.inbound.is_empty() {
            return Err(MockSerialError::Timeout);
        }

        let bytes_to_read = core::cmp::min(limit, self.inbound.len());
        let chunk: Vec<u8> = self.inbound.drain(..bytes_to_read).collect();
        buf[..bytes_to_read].copy_from_slice(&chunk);
        self.record(Event::Read(chunk));

        Ok(bytes_to_read)
    }
}

impl Transport for MockSerial {
    fn discard_input(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::SimulatedError);
        }
        let stale = self.inbound.len();
        self.inbound.clear();
        self.record(Event::Discard(stale));
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), Self::Error> {
        self.read_timeout = Some(timeout);
        Ok(())
    }
}

impl MockSerial {
    /// Create a new MockSerial instance that never answers.
    pub fn new() -> Self {
        Self {
            written: Vec::new(),
            pending: Vec::new(),
            inbound: VecDeque::new(),
            responses: VecDeque::new(),
            responder: None,
            events: Arc::new(Mutex::new(Vec::new())),
            should_error_on_write: false,
            should_error_on_read: false,
            should_error_on_receive: false,
            interrupted_reads: 0,
            byte_delay: None,
            read_timeout: None,
        }
    }

    /// A mock that answers every request the way a healthy supply would.
    ///
    /// Set commands are acknowledged with [`StatusCode::Success`], status reads get `status`.
    pub fn device(status: Frame) -> Self {
        let mut mock = Self::new();
        mock.responder = Some(Box::new(move |request: &[u8]| {
            if request[2] == Command::ReadStatus as u8 {
                status.as_bytes().to_vec()
            } else {
                ack(request[1], StatusCode::Success).as_bytes().to_vec()
            }
        }));
        mock
    }

    /// Queue a raw reply, released when the next full request is written.
    pub fn queue_response(&mut self, data: &[u8]) {
        self.responses.push_back(data.to_vec());
    }

    /// Bytes that are already waiting before any request is sent.
    pub fn inject_stale(&mut self, data: &[u8]) {
        self.inbound.extend(data.iter().copied());
    }

    /// Get a reference to the data that was written to this mock serial port
    pub fn written_data(&self) -> &[u8] {
        &self.written
    }

    /// Shared handle on the event log, still readable after the mock moves into a driver.
    pub fn events(&self) -> Arc<Mutex<Vec<Event>>> {
        Arc::clone(&self.events)
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }

    /// Configure whether `read` alone fails, leaving `discard_input` working
    pub fn set_receive_error(&mut self, should_error: bool) {
        self.should_error_on_receive = should_error;
    }

    /// Make the next `count` reads fail with an interrupted error
    pub fn interrupt_reads(&mut self, count: usize) {
        self.interrupted_reads = count;
    }

    /// Deliver replies one byte at a time, `delay` apart, like a slow link.
    ///
    /// A read whose timeout is shorter than `delay` waits out the timeout and fails.
    pub fn set_byte_delay(&mut self, delay: Duration) {
        self.byte_delay = Some(delay);
    }

    fn record(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}

/// The acknowledgement a supply sends after a set command.
pub fn ack(address: u8, status: StatusCode) -> Frame {
    Frame::encode(address, Command::StatusResponse, &[status as u8])
}

/// A read-status reply. `status_bits` lands at frame offset 9.
pub fn status_frame(
    current_ma: u16,
    voltage_mv: u32,
    status_bits: u8,
    current_setpoint_ma: u16,
    voltage_setpoint_mv: u32,
) -> Frame {
    // Payload offsets are frame offsets minus 3.
    let mut payload = [0u8; 22];
    payload[0..2].copy_from_slice(&current_ma.to_le_bytes());
    payload[2..6].copy_from_slice(&voltage_mv.to_le_bytes());
    payload[6] = status_bits;
    payload[7..9].copy_from_slice(&current_setpoint_ma.to_le_bytes());
    payload[13..17].copy_from_slice(&voltage_setpoint_mv.to_le_bytes());
    Frame::encode(0x00, Command::ReadStatus, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_new_mock_serial() {
        let mock = MockSerial::new();
        assert!(mock.written_data().is_empty());
        assert!(mock.inbound.is_empty());
        assert!(!mock.should_error_on_write);
        assert!(!mock.should_error_on_read);
    }

    #[test]
    fn test_partial_writes_wait_for_full_frame() {
        let mut mock = MockSerial::new();
        mock.queue_response(b"reply");
        let request = Frame::encode(0x00, Command::SetOutput, &[1]);

        mock.write(&request.as_bytes()[..10]).unwrap();
        assert!(mock.inbound.is_empty());

        mock.write(&request.as_bytes()[10..]).unwrap();
        assert_eq!(mock.inbound.len(), 5);
        assert_eq!(mock.written_data(), request.as_bytes());
    }

    #[test]
    fn test_read_partial_data() {
        let mut mock = MockSerial::new();
        mock.inject_stale(b"Long response data");

        let mut buffer = [0u8; 5];
        assert_eq!(mock.read(&mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"Long ");
    }

    #[test]
    fn test_read_timeout_when_no_data() {
        let mut mock = MockSerial::new();
        let mut buffer = [0u8; 10];

        let err = mock.read(&mut buffer).unwrap_err();
        assert!(matches!(err, MockSerialError::Timeout));
        assert!(matches!(err.kind(), embedded_io::ErrorKind::TimedOut));
    }

    #[test]
    fn test_discard_clears_inbound() {
        let mut mock = MockSerial::new();
        mock.inject_stale(&[1, 2, 3]);
        mock.discard_input().unwrap();

        assert!(mock.inbound.is_empty());
        assert_eq!(mock.events().lock().unwrap().as_slice(), &[Event::Discard(3)]);
    }

    #[test]
    fn test_device_answers_by_command() {
        let status = status_frame(100, 5000, 0x01, 200, 5000);
        let mut mock = MockSerial::device(status);

        mock.write(Frame::encode(0x00, Command::ReadStatus, &[]).as_bytes())
            .unwrap();
        let mut buffer = [0u8; FRAME_LEN];
        mock.read(&mut buffer).unwrap();
        assert_eq!(&buffer, status.as_bytes());

        mock.write(Frame::encode(0x03, Command::SetVoltage, &[]).as_bytes())
            .unwrap();
        mock.read(&mut buffer).unwrap();
        assert_eq!(&buffer, ack(0x03, StatusCode::Success).as_bytes());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            MockSerialError::SimulatedError.to_string(),
            "Simulated serial error"
        );
        assert!(matches!(
            MockSerialError::Interrupted.kind(),
            embedded_io::ErrorKind::Interrupted
        ));
    }

    #[test]
    fn test_receive_error_spares_discard() {
        let mut mock = MockSerial::new();
        mock.inject_stale(b"data");
        mock.set_receive_error(true);

        let mut buffer = [0u8; 4];
        assert!(mock.read(&mut buffer).is_err());
        assert!(mock.discard_input().is_ok());
    }

    #[test]
    fn test_interrupted_reads_then_data() {
        let mut mock = MockSerial::new();
        mock.inject_stale(b"ok");
        mock.interrupt_reads(1);

        let mut buffer = [0u8; 2];
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::Interrupted)
        ));
        assert_eq!(mock.read(&mut buffer).unwrap(), 2);
    }

    #[test]
    fn test_byte_delay_honours_read_timeout() {
        let mut mock = MockSerial::new();
        mock.inject_stale(b"abc");
        mock.set_byte_delay(Duration::from_millis(10));

        let mut buffer = [0u8; 3];
        assert_eq!(mock.read(&mut buffer).unwrap(), 1);

        mock.set_read_timeout(Duration::from_millis(1)).unwrap();
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::Timeout)
        ));
    }

    #[test]
    fn test_error_flags_toggle() {
        let mut mock = MockSerial::new();

        mock.set_write_error(true);
        assert!(mock.write(b"test").is_err());
        assert!(mock.flush().is_err());
        mock.set_write_error(false);
        assert!(mock.write(b"test").is_ok());

        mock.inject_stale(b"data");
        mock.set_read_error(true);
        let mut buffer = [0u8; 10];
        assert!(mock.read(&mut buffer).is_err());
        mock.set_read_error(false);
        assert!(mock.read(&mut buffer).is_ok());
    }
}
