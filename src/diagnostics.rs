//! Leveled logging and last-error bookkeeping.
//!
//! Every operation in the library is handed a [`Diagnostics`] value rather than
//! reaching for process-wide state. A `Diagnostics` combines a [`Sink`], which
//! receives log records, with a [`Filter`], which decides which records are
//! emitted, and it remembers the [`LastError`] recorded by a failing
//! operation.
//!
//! By default records are forwarded to the [`log`] facade via [`LogSink`], so
//! any logger the application installs will receive them:
//!
//! ```
//! use newmark::diagnostics::{Bitmask, Diagnostics, LogSink};
//!
//! // Only emit errors and warnings.
//! let diagnostics = Diagnostics::new(LogSink, Bitmask(Bitmask::ERROR | Bitmask::WARN));
//! ```

use crate::error::{EscapeOverflowError, Error, ErrorCode};
use std::{
	fmt,
	sync::{Arc, Mutex},
};

pub use log::Level;

/// Emit a log record through a [`Diagnostics`], tagged with the calling module.
macro_rules! diag {
	($diag:expr, $level:expr, $($arg:tt)+) => {
		$diag.log($level, module_path!(), format_args!($($arg)+))
	};
}

/// The maximum length of text, in bytes, that [`escape`] will render.
pub const ESCAPE_LIMIT: usize = 1024;

/// A destination for log records.
pub trait Sink: Send + Sync {
	/// Emit a record produced by the module `source`.
	fn emit(&self, level: Level, source: &'static str, message: &str);
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
	fn emit(&self, level: Level, source: &'static str, message: &str) {
		(**self).emit(level, source, message);
	}
}

impl<S: Sink + ?Sized> Sink for Box<S> {
	fn emit(&self, level: Level, source: &'static str, message: &str) {
		(**self).emit(level, source, message);
	}
}

/// Decides which log records reach a [`Sink`].
pub trait Filter: Send + Sync {
	/// Whether a record at `level` should be emitted.
	fn should_emit(&self, level: Level) -> bool;
}

/// Emit records at or more severe than the contained level.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Threshold(pub Level);

impl Filter for Threshold {
	fn should_emit(&self, level: Level) -> bool {
		level <= self.0
	}
}

/// Emit records whose level's bit is set in the contained mask.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Bitmask(pub u8);

impl Bitmask {
	/// The bit for [`Level::Error`].
	pub const ERROR: u8 = 1 << 0;
	/// The bit for [`Level::Warn`].
	pub const WARN: u8 = 1 << 1;
	/// The bit for [`Level::Info`].
	pub const INFO: u8 = 1 << 2;
	/// The bit for [`Level::Debug`].
	pub const DEBUG: u8 = 1 << 3;
	/// The bit for [`Level::Trace`].
	pub const TRACE: u8 = 1 << 4;
	/// Every level's bit.
	pub const ALL: u8 = Self::ERROR | Self::WARN | Self::INFO | Self::DEBUG | Self::TRACE;

	/// Get the bit corresponding to `level`.
	pub fn bit(level: Level) -> u8 {
		1 << (level as usize - 1)
	}
}

impl Filter for Bitmask {
	fn should_emit(&self, level: Level) -> bool {
		self.0 & Bitmask::bit(level) != 0
	}
}

/// A [`Sink`] that forwards records to the [`log`] facade, using the source
/// module as the record's target.
#[derive(Debug, Copy, Clone, Default)]
pub struct LogSink;

impl Sink for LogSink {
	fn emit(&self, level: Level, source: &'static str, message: &str) {
		log::log!(target: source, level, "{message}");
	}
}

/// The code and message of the most recent failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LastError {
	/// The numeric code of the failure.
	pub code: ErrorCode,
	/// The formatted message.
	pub message: String,
}

/// A log sink, a filter, and the last error recorded through them.
pub struct Diagnostics {
	/// Where records are sent.
	sink: Box<dyn Sink>,
	/// Which records are sent.
	filter: Box<dyn Filter>,
	/// The most recent failure, if any.
	last_error: Mutex<Option<LastError>>,
}

impl fmt::Debug for Diagnostics {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Diagnostics")
			.field("last_error", &self.last_error())
			.finish_non_exhaustive()
	}
}

impl Default for Diagnostics {
	/// Forward every record to the [`log`] facade.
	fn default() -> Self {
		Diagnostics::new(LogSink, Threshold(Level::Trace))
	}
}

impl Diagnostics {
	/// Create a `Diagnostics` with the given sink and filter.
	pub fn new<S, F>(sink: S, filter: F) -> Self
	where
		S: Sink + 'static,
		F: Filter + 'static,
	{
		Diagnostics {
			sink: Box::new(sink),
			filter: Box::new(filter),
			last_error: Mutex::new(None),
		}
	}

	/// Replace the filter, returning the previous one.
	pub fn set_filter<F: Filter + 'static>(&mut self, filter: F) -> Box<dyn Filter> {
		std::mem::replace(&mut self.filter, Box::new(filter))
	}

	/// Whether a record at `level` would be emitted.
	pub fn enabled(&self, level: Level) -> bool {
		self.filter.should_emit(level)
	}

	/// Emit a record, if the filter allows it.
	///
	/// The message is only formatted when the record is emitted.
	pub fn log(&self, level: Level, source: &'static str, args: fmt::Arguments<'_>) {
		if self.filter.should_emit(level) {
			match args.as_str() {
				Some(message) => self.sink.emit(level, source, message),
				None => self.sink.emit(level, source, &args.to_string()),
			}
		}
	}

	/// Store the last error.
	pub fn set_last_error<M: Into<String>>(&self, code: ErrorCode, message: M) {
		let record = LastError {
			code,
			message: message.into(),
		};
		match self.last_error.lock() {
			Ok(mut guard) => *guard = Some(record),
			// The record is plain data, so a panic elsewhere cannot leave it inconsistent.
			Err(poisoned) => *poisoned.into_inner() = Some(record),
		}
	}

	/// Get a copy of the last error, if any.
	pub fn last_error(&self) -> Option<LastError> {
		match self.last_error.lock() {
			Ok(guard) => guard.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		}
	}

	/// Forget the last error, returning it.
	pub fn clear_last_error(&self) -> Option<LastError> {
		match self.last_error.lock() {
			Ok(mut guard) => guard.take(),
			Err(poisoned) => poisoned.into_inner().take(),
		}
	}

	/// Log `error` and store it as the last error.
	pub fn record(&self, source: &'static str, error: &Error) {
		let message = error.to_string();
		self.log(
			Level::Error,
			source,
			format_args!("[{}] {message}", error.code()),
		);
		self.set_last_error(error.code(), message);
	}
}

/// Render control characters in `text` for display: CR becomes `<cr>` and LF
/// becomes `<lf>`.
///
/// Text longer than [`ESCAPE_LIMIT`] bytes is rejected.
///
/// ```
/// # use newmark::diagnostics::escape;
/// assert_eq!(escape("PRINT POS\r\n").unwrap(), "PRINT POS<cr><lf>");
/// ```
pub fn escape(text: &str) -> Result<String, EscapeOverflowError> {
	if text.len() > ESCAPE_LIMIT {
		return Err(EscapeOverflowError::new(text.len(), ESCAPE_LIMIT));
	}
	let mut escaped = String::with_capacity(text.len() + 8);
	for c in text.chars() {
		match c {
			'\r' => escaped.push_str("<cr>"),
			'\n' => escaped.push_str("<lf>"),
			c => escaped.push(c),
		}
	}
	Ok(escaped)
}

/// Render raw wire bytes for a log message.
pub(crate) fn display_bytes(bytes: &[u8]) -> String {
	let text = String::from_utf8_lossy(bytes);
	escape(&text).unwrap_or_else(|_| format!("<{} bytes>", bytes.len()))
}

/// A [`Sink`] that keeps every record it receives.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct Capture {
	records: Mutex<Vec<(Level, String)>>,
}

#[cfg(test)]
impl Capture {
	/// Get the messages captured at `level`.
	pub fn messages(&self, level: Level) -> Vec<String> {
		self.records
			.lock()
			.unwrap()
			.iter()
			.filter(|(l, _)| *l == level)
			.map(|(_, m)| m.clone())
			.collect()
	}

	/// Get the number of records captured.
	pub fn len(&self) -> usize {
		self.records.lock().unwrap().len()
	}
}

#[cfg(test)]
impl Sink for Capture {
	fn emit(&self, level: Level, _source: &'static str, message: &str) {
		self.records.lock().unwrap().push((level, message.to_string()));
	}
}
