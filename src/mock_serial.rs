//! We use this mocking module in unit tests to emulate the FEB bus and the settle delays.

use embedded_hal::delay::DelayNs;
use thiserror::Error;

/// Our mock type used to emulate a line-oriented instrument bus.
pub struct MockSerial {
    /// Buffer to store data written to the mock bus
    write_buffer: heapless::Vec<u8, 1024>,
    /// Buffer containing queued response lines to be read
    read_buffer: heapless::Vec<u8, 256>,
    /// Current position in the read buffer
    read_position: usize,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
    /// Report running out of data as a timeout rather than would-block
    timeout_when_empty: bool,
}

#[derive(Error, Debug)]
pub enum MockSerialError {
    /// Simulated timeout error
    #[error("Timed out")]
    Timeout,
    /// Simulated buffer overflow
    #[error("Mock buffer overflow")]
    BufferOverflow,
    /// Generic simulated error for testing
    #[error("Simulated error")]
    SimulatedError,
    /// Would block - no data available
    #[error("No data available")]
    WouldBlock,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
            MockSerialError::WouldBlock => embedded_io::ErrorKind::Other,
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

        self.write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;
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
        if self.should_error_on_read {
            return Err(MockSerialError::SimulatedError);
        }

        if self.read_position >= self.read_buffer.len() {
            if self.timeout_when_empty {
                return Err(MockSerialError::Timeout);
            }
            return Err(MockSerialError::WouldBlock);
        }

        let available_bytes = self.read_buffer.len() - self.read_position;
        let bytes_to_read = core::cmp::min(buf.len(), available_bytes);

        buf[..bytes_to_read].copy_from_slice(
            &self.read_buffer[self.read_position..self.read_position + bytes_to_read],
        );

        self.read_position += bytes_to_read;
        Ok(bytes_to_read)
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with empty buffers
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            should_error_on_write: false,
            should_error_on_read: false,
            timeout_when_empty: false,
        }
    }

    /// Queue one response line, terminated with `\n`.
    pub fn push_response(&mut self, line: &str) -> Result<(), MockSerialError> {
        self.push_raw(line.as_bytes())?;
        self.push_raw(b"\n")
    }

    /// Queue bytes exactly as given.
    pub fn push_raw(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Get a reference to the data that was written to this mock bus
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Iterate over the `\n` terminated frames written so far.
    pub fn written_frames(&self) -> impl Iterator<Item = &str> {
        core::str::from_utf8(&self.write_buffer)
            .unwrap_or("")
            .split_terminator('\n')
    }

    /// Number of queued response bytes not yet read.
    pub fn unread(&self) -> usize {
        self.read_buffer.len() - self.read_position
    }

    /// Clear the write buffer
    pub fn clear_written_data(&mut self) {
        self.write_buffer.clear();
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }

    /// Configure whether reading past the queued data times out instead of blocking
    pub fn set_read_timeout(&mut self, timeout: bool) {
        self.timeout_when_empty = timeout;
    }
}

/// Records the settle delays requested by the driver instead of sleeping.
#[derive(Default)]
pub struct MockDelay {
    delays_ms: heapless::Vec<u32, 128>,
    total_ns: u64,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested through `delay_ms`, in order.
    pub fn delays_ms(&self) -> &[u32] {
        &self.delays_ms
    }

    pub fn total_ns(&self) -> u64 {
        self.total_ns
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
    }

    fn delay_ms(&mut self, ms: u32) {
        // Tests never request more than the buffer holds.
        let _ = self.delays_ms.push(ms);
        self.total_ns += ms as u64 * 1_000_000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_new_mock_serial() {
        let mock = MockSerial::new();
        assert_eq!(mock.written_data().len(), 0);
        assert_eq!(mock.unread(), 0);
        assert!(!mock.should_error_on_write);
        assert!(!mock.should_error_on_read);
    }

    #[test]
    fn test_written_frames() {
        let mut mock = MockSerial::new();
        mock.write(b"c4d031a0800zx\n").unwrap();
        mock.write(b"c2x\n").unwrap();

        {
            let mut frames = mock.written_frames();
            assert_eq!(frames.next(), Some("c4d031a0800zx"));
            assert_eq!(frames.next(), Some("c2x"));
            assert_eq!(frames.next(), None);
        }

        mock.clear_written_data();
        assert_eq!(mock.written_frames().count(), 0);
    }

    #[test]
    fn test_write_buffer_overflow() {
        let mut mock = MockSerial::new();
        let large_data = [0u8; 1100];

        let result = mock.write(&large_data);
        assert!(matches!(result, Err(MockSerialError::BufferOverflow)));
    }

    #[test]
    fn test_read_queued_responses() {
        let mut mock = MockSerial::new();
        mock.push_response("0abc").unwrap();
        mock.push_response("ffff").unwrap();
        assert_eq!(mock.unread(), 10);

        let mut buffer = [0u8; 5];
        assert_eq!(mock.read(&mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"0abc\n");
        assert_eq!(mock.read(&mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"ffff\n");

        // Exhausted.
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::WouldBlock)
        ));
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockSerial::new();
        mock.set_write_error(true);
        assert!(matches!(mock.write(b"test"), Err(MockSerialError::SimulatedError)));
        assert!(mock.flush().is_err());
        assert_eq!(mock.written_data().len(), 0);

        mock.push_response("0000").unwrap();
        mock.set_read_error(true);
        let mut buffer = [0u8; 4];
        assert!(mock.read(&mut buffer).is_err());

        mock.set_read_error(false);
        assert!(mock.read(&mut buffer).is_ok());
    }

    #[test]
    fn test_read_timeout_when_empty() {
        let mut mock = MockSerial::new();
        mock.set_read_timeout(true);
        let mut buffer = [0u8; 4];
        assert!(matches!(mock.read(&mut buffer), Err(MockSerialError::Timeout)));
    }

    #[test]
    fn test_error_kinds() {
        assert!(matches!(MockSerialError::Timeout.kind(), embedded_io::ErrorKind::TimedOut));
        assert!(matches!(
            MockSerialError::BufferOverflow.kind(),
            embedded_io::ErrorKind::OutOfMemory
        ));
        assert!(matches!(MockSerialError::SimulatedError.kind(), embedded_io::ErrorKind::Other));
    }

    #[test]
    fn test_mock_delay_records() {
        let mut delay = MockDelay::new();
        delay.delay_ms(160);
        delay.delay_ms(20);
        delay.delay_ns(500);
        assert_eq!(delay.delays_ms(), &[160, 20]);
        assert_eq!(delay.total_ns(), 180_000_500);
    }
}
