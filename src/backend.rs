//! Types that can exchange (read/write) bytes with a connected controller.
//!
//! The [`Backend`] trait represents all such types. The library only ever uses
//! a backend for short reads: a read returns whatever bytes are currently
//! available, and a read that times out is treated as "nothing available yet"
//! rather than as a failure.

use std::io;
use std::time::Duration;

use serialport as sp;

#[cfg(windows)]
use sp::COMPort as ExternSerial;
use sp::SerialPort;
#[cfg(unix)]
use sp::TTYPort as ExternSerial;

/// The placeholder name for a backend that doesn't have a name.
pub(crate) const UNKNOWN_BACKEND_NAME: &str = "<unknown backend>";

/// Types that allow reading and writing bytes with a connected controller.
///
/// Implement this trait to drive a controller over a transport the library
/// does not provide.
pub trait Backend: io::Read + io::Write {
	/// Set the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error>;

	/// Get the read timeout.
	///
	/// If timeout is `None`, reads will block indefinitely.
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error>;

	/// Get the "name" of the backend.
	///
	/// This can be in any format, but should uniquely identify the backend
	/// instance.
	fn name(&self) -> Option<String>;
}

impl<C: Backend + ?Sized> Backend for Box<C> {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		(**self).set_read_timeout(timeout)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		(**self).read_timeout()
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
}

impl<C: Backend + ?Sized> Backend for &mut C {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		(**self).set_read_timeout(timeout)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		(**self).read_timeout()
	}
	fn name(&self) -> Option<String> {
		(**self).name()
	}
}

impl Backend for std::net::TcpStream {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		std::net::TcpStream::set_read_timeout(self, timeout)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		std::net::TcpStream::read_timeout(self)
	}
	fn name(&self) -> Option<String> {
		self.peer_addr().map(|addr| format!("{addr}")).ok()
	}
}

/// A platform agnostic serial port backend.
//
// The `serialport` crate exposes two platform specific serial ports, `COMPort`
// and `TTYPort` for windows and unix, respectively. Wrapping whichever one the
// platform uses in a new type keeps callers platform agnostic without dynamic
// dispatch or an extra type parameter.
#[derive(Debug)]
pub struct Serial(pub(crate) ExternSerial);

impl io::Read for Serial {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.0.read(buf)
	}
}

impl io::Write for Serial {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.write(buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.0.flush()
	}
}

impl Backend for Serial {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		// The serialport API does not support infinite timeouts, so simply set
		// the timeout to the largest possible duration if `timeout` is `None`,
		// which is practically infinite.
		Ok(self.0.set_timeout(timeout.unwrap_or(Duration::MAX))?)
	}
	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(Some(self.0.timeout()))
	}
	fn name(&self) -> Option<String> {
		self.0.name()
	}
}

/// A callback that produces the controller's reply to bytes written to a [`Mock`].
#[cfg(any(test, feature = "mock"))]
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// A mock backend for use in testing.
///
/// It has the following features:
///   * It records all data written to it.
///   * It can be filled with chunks of data for reading. Each read returns at
///     most one chunk, and an empty chunk produces a zero-byte read. Once the
///     chunks run out, every read returns zero bytes.
///   * A [`Responder`] can queue a reply whenever data is written, simulating
///     a controller.
///   * Specific errors can be inserted for calls to `read`, `write`, and
///     `set_read_timeout`.
#[cfg(any(test, feature = "mock"))]
pub struct Mock {
	/// The chunks returned by successive reads.
	chunks: std::collections::VecDeque<Vec<u8>>,
	/// Every buffer passed to `write`, in order.
	written: Vec<Vec<u8>>,
	/// The number of calls to `read`.
	reads: usize,
	/// The error to surface on the next read, if any. It is only surfaced once.
	read_error: Option<io::Error>,
	/// The error to surface on the next write, if any. It is only surfaced once.
	write_error: Option<io::Error>,
	/// The error to surface on the next set_read_timeout, if any. It is only surfaced once.
	set_read_timeout_error: Option<io::Error>,
	/// The read timeout, which is otherwise ignored.
	read_timeout: Option<Duration>,
	/// Generates replies to written data.
	responder: Option<Responder>,
}

#[cfg(any(test, feature = "mock"))]
impl std::fmt::Debug for Mock {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Mock")
			.field("chunks", &self.chunks.len())
			.field("written", &self.written.len())
			.field("reads", &self.reads)
			.finish_non_exhaustive()
	}
}

#[cfg(any(test, feature = "mock"))]
impl Mock {
	/// Create a new Mock backend.
	pub fn new() -> Self {
		Mock {
			chunks: std::collections::VecDeque::new(),
			written: Vec::new(),
			reads: 0,
			read_error: None,
			write_error: None,
			set_read_timeout_error: None,
			read_timeout: Some(Duration::ZERO),
			responder: None,
		}
	}
	/// Append a chunk to be returned by a single read.
	///
	/// The data is not validated in any way.
	pub fn push<T: AsRef<[u8]>>(&mut self, chunk: T) {
		self.chunks.push_back(chunk.as_ref().to_vec());
	}
	/// Append `bytes`, split into chunks of at most `size` bytes.
	pub fn push_chunked<T: AsRef<[u8]>>(&mut self, bytes: T, size: usize) {
		for chunk in bytes.as_ref().chunks(size.max(1)) {
			self.push(chunk);
		}
	}
	/// Append `count` zero-byte reads.
	pub fn push_empty(&mut self, count: usize) {
		for _ in 0..count {
			self.chunks.push_back(Vec::new());
		}
	}
	/// Clear any chunks that have not been read.
	pub fn clear(&mut self) {
		self.chunks.clear();
	}
	/// Whether the mock has any chunks left or not.
	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}
	/// Get the number of calls to `read` so far.
	pub fn reads(&self) -> usize {
		self.reads
	}
	/// Get every buffer written so far.
	pub fn written(&self) -> &[Vec<u8>] {
		&self.written
	}
	/// Set the callback used to reply to written data.
	///
	/// Whenever data is written, the callback is called with it and any bytes
	/// it returns are appended as a single chunk.
	pub fn set_responder<F>(&mut self, responder: F)
	where
		F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
	{
		self.responder = Some(Box::new(responder));
	}
	/// Set the error for the next `read`, if any.
	pub fn read_error(&mut self, err: Option<io::Error>) {
		self.read_error = err;
	}
	/// Set the error for the next `write`, if any.
	pub fn write_error(&mut self, err: Option<io::Error>) {
		self.write_error = err;
	}
	/// Set the error for the next `set_read_timeout`, if any.
	pub fn set_read_timeout_error(&mut self, err: Option<io::Error>) {
		self.set_read_timeout_error = err;
	}
}

#[cfg(any(test, feature = "mock"))]
impl Default for Mock {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(any(test, feature = "mock"))]
impl Backend for Mock {
	fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), io::Error> {
		if let Some(err) = self.set_read_timeout_error.take() {
			Err(err)
		} else {
			self.read_timeout = timeout;
			Ok(())
		}
	}

	fn read_timeout(&self) -> Result<Option<Duration>, io::Error> {
		Ok(self.read_timeout)
	}

	fn name(&self) -> Option<String> {
		Some(format!("<mock 0x{:x}>", self as *const Mock as usize))
	}
}

#[cfg(any(test, feature = "mock"))]
impl io::Read for Mock {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.reads += 1;
		if let Some(err) = self.read_error.take() {
			return Err(err);
		}
		let Some(mut chunk) = self.chunks.pop_front() else {
			return Ok(0);
		};
		let n = chunk.len().min(buf.len());
		buf[..n].copy_from_slice(&chunk[..n]);
		if n < chunk.len() {
			// Keep the remainder for the next read.
			chunk.drain(..n);
			self.chunks.push_front(chunk);
		}
		Ok(n)
	}
}

#[cfg(any(test, feature = "mock"))]
impl io::Write for Mock {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if let Some(err) = self.write_error.take() {
			return Err(err);
		}
		self.written.push(buf.to_vec());
		if let Some(reply) = self.responder.as_mut().and_then(|respond| respond(buf)) {
			self.chunks.push_back(reply);
		}
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::{Read as _, Write as _};

	#[test]
	fn mock_reads_one_chunk_at_a_time() {
		let mut mock = Mock::new();
		mock.push(b"PRINT");
		mock.push_empty(1);
		mock.push(b" POS");
		let mut buf = [0u8; 16];
		assert_eq!(mock.read(&mut buf).unwrap(), 5);
		assert_eq!(&buf[..5], b"PRINT");
		assert_eq!(mock.read(&mut buf).unwrap(), 0);
		assert_eq!(mock.read(&mut buf).unwrap(), 4);
		assert_eq!(mock.read(&mut buf).unwrap(), 0);
		assert_eq!(mock.reads(), 4);
		assert!(mock.is_empty());
	}

	#[test]
	fn mock_splits_chunks_larger_than_buffer() {
		let mut mock = Mock::new();
		mock.push(b"abcdef");
		let mut buf = [0u8; 4];
		assert_eq!(mock.read(&mut buf).unwrap(), 4);
		assert_eq!(mock.read(&mut buf).unwrap(), 2);
		assert_eq!(&buf[..2], b"ef");
	}

	#[test]
	fn mock_responder_queues_replies() {
		let mut mock = Mock::new();
		mock.set_responder(|written| (written == b"PRINT POS\r\n").then(|| b"1.0 >".to_vec()));
		mock.write_all(b"HOME\r\n").unwrap();
		assert!(mock.is_empty());
		mock.write_all(b"PRINT POS\r\n").unwrap();
		assert!(!mock.is_empty());
		assert_eq!(mock.written().len(), 2);
	}

	#[test]
	fn mock_surfaces_injected_errors_once() {
		let mut mock = Mock::new();
		mock.read_error(Some(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
		let mut buf = [0u8; 4];
		assert!(mock.read(&mut buf).is_err());
		assert_eq!(mock.read(&mut buf).unwrap(), 0);

		mock.write_error(Some(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
		assert!(mock.write(b"x").is_err());
		assert_eq!(mock.write(b"x").unwrap(), 1);
	}
}
