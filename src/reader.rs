//! Reading the controller's replies.
//!
//! Replies are read in short reads: each read returns whatever has arrived so
//! far, or nothing at all. A reply is complete once a chunk containing the
//! prompt arrives. Reads that return nothing are counted against an iteration
//! budget, and the reader pauses for one poll interval after every read.

use crate::{
	backend::Backend,
	command::OnTimeout,
	diagnostics::{display_bytes, Diagnostics, Level},
	error::{Error, ReadTimeoutError},
	port::PortOptions,
};
use std::io;

/// The size of the buffer used for a single read.
const CHUNK_SIZE: usize = 256;

/// How a successful [`Reader::read_until_prompt`] finished.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Termination {
	/// A chunk containing the prompt was received.
	Prompt,
	/// The budget ran out first, and the command tolerates that.
	BudgetExhausted,
}

/// Reads replies from a backend.
#[derive(Debug)]
pub struct Reader<'a, B: ?Sized> {
	backend: &'a mut B,
	options: &'a PortOptions,
	diagnostics: &'a Diagnostics,
}

impl<'a, B: Backend + ?Sized> Reader<'a, B> {
	/// Create a reader over `backend`.
	pub fn new(backend: &'a mut B, options: &'a PortOptions, diagnostics: &'a Diagnostics) -> Self {
		Reader {
			backend,
			options,
			diagnostics,
		}
	}

	/// Read once into `buf`.
	///
	/// A read that times out or is interrupted is treated as a read of zero bytes.
	fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
		match self.backend.read(buf) {
			Ok(n) => Ok(n),
			Err(e)
				if matches!(
					e.kind(),
					io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
				) =>
			{
				Ok(0)
			}
			Err(e) => Err(e.into()),
		}
	}

	/// Discard any bytes waiting to be read.
	///
	/// The reader pauses for one poll interval before each read and stops at
	/// the first read that returns nothing. Returns the number of bytes
	/// discarded.
	pub fn flush(&mut self) -> Result<usize, Error> {
		let mut chunk = [0u8; CHUNK_SIZE];
		let mut discarded = 0;
		loop {
			self.options.pause(self.diagnostics);
			let n = self.read_chunk(&mut chunk)?;
			if n == 0 {
				return Ok(discarded);
			}
			discarded += n;
			diag!(
				self.diagnostics,
				Level::Debug,
				"discarded stale input: {}",
				display_bytes(&chunk[..n])
			);
		}
	}

	/// Read until a chunk containing the prompt arrives.
	///
	/// Every received byte is appended to `reply`, if provided, including
	/// anything that follows the prompt in the same chunk. Each read that
	/// returns nothing counts against `budget`; once `budget` empty reads have
	/// been made the read either fails with a [`ReadTimeoutError`] or, if
	/// `on_timeout` is [`OnTimeout::Quiet`], finishes with
	/// [`Termination::BudgetExhausted`].
	///
	/// Reads that return data never count against the budget, so a reply that
	/// keeps trickling in without a prompt is read indefinitely.
	pub fn read_until_prompt(
		&mut self,
		budget: u32,
		on_timeout: OnTimeout,
		mut reply: Option<&mut Vec<u8>>,
	) -> Result<Termination, Error> {
		let prompt = self.options.prompt;
		let mut chunk = [0u8; CHUNK_SIZE];
		let mut empty_reads = 0u32;
		loop {
			let n = self.read_chunk(&mut chunk)?;
			if n > 0 {
				let data = &chunk[..n];
				diag!(self.diagnostics, Level::Trace, "read {}", display_bytes(data));
				if let Some(reply) = reply.as_deref_mut() {
					reply.extend_from_slice(data);
				}
				if data.contains(&prompt) {
					return Ok(Termination::Prompt);
				}
			} else {
				empty_reads += 1;
			}

			self.options.pause(self.diagnostics);

			if empty_reads >= budget {
				let received = reply.as_deref().map(Vec::as_slice).unwrap_or_default();
				return match on_timeout {
					OnTimeout::Error => Err(ReadTimeoutError::new(budget, received).into()),
					OnTimeout::Quiet => {
						diag!(
							self.diagnostics,
							Level::Debug,
							"no prompt after {budget} empty reads, continuing"
						);
						Ok(Termination::BudgetExhausted)
					}
				};
			}
		}
	}
}
