//! Parsing the controller's replies.
//!
//! The controller echoes each command and then prints its answer, ending with
//! the `>` prompt. The reply to `PRINT POS`, for instance, reads
//! `PRINT POS 12.345000 >` once whitespace (including the echoed line ending)
//! is collapsed. Each grammar is matched token by token: whitespace between
//! tokens is skipped, literal words must match exactly, and anything after the
//! prompt is ignored.
//!
//! Any reply that does not match its grammar produces an
//! [`UnexpectedReplyError`] holding the full reply text.

use crate::error::{ErrorNotClearedError, Error, UnexpectedReplyError};
use std::str::FromStr;

/// The text the controller prints once homing has finished.
pub const HOMING_COMPLETE: &str = "Homing Complete";

/// Matches a reply against a grammar one token at a time.
struct Scanner<'a> {
	/// The full reply, for error reporting.
	reply: &'a str,
	/// The part of the reply that has not been matched yet.
	rest: &'a str,
	/// The prompt that ends a reply.
	prompt: char,
}

impl<'a> Scanner<'a> {
	fn new(reply: &'a str, prompt: char) -> Self {
		Scanner {
			reply,
			rest: reply,
			prompt,
		}
	}

	fn error(&self) -> UnexpectedReplyError {
		UnexpectedReplyError::new(self.reply)
	}

	/// Match a literal word.
	fn word(&mut self, word: &str) -> Result<(), UnexpectedReplyError> {
		let rest = self.rest.trim_start();
		let rest = rest.strip_prefix(word).ok_or_else(|| self.error())?;
		// The word must not be the prefix of a longer token.
		if rest
			.chars()
			.next()
			.is_some_and(|c| !c.is_whitespace() && c != self.prompt)
		{
			return Err(self.error());
		}
		self.rest = rest;
		Ok(())
	}

	/// Match a token up to the next whitespace or prompt.
	fn token(&mut self) -> Result<&'a str, UnexpectedReplyError> {
		let rest = self.rest.trim_start();
		let end = rest
			.find(|c: char| c.is_whitespace() || c == self.prompt)
			.unwrap_or(rest.len());
		if end == 0 {
			return Err(self.error());
		}
		self.rest = &rest[end..];
		Ok(&rest[..end])
	}

	/// Match a token and parse it as a `T`.
	fn value<T: FromStr>(&mut self) -> Result<T, UnexpectedReplyError> {
		self.token()?.parse().map_err(|_| self.error())
	}

	/// Match the prompt.
	fn prompt(&mut self) -> Result<(), UnexpectedReplyError> {
		let rest = self.rest.trim_start();
		self.rest = rest.strip_prefix(self.prompt).ok_or_else(|| self.error())?;
		Ok(())
	}
}

/// Check the reply to `HOME`.
pub fn homed(reply: &str) -> Result<(), UnexpectedReplyError> {
	if reply.contains(HOMING_COMPLETE) {
		Ok(())
	} else {
		Err(UnexpectedReplyError::new(reply))
	}
}

/// Parse the reply to `PRINT POS`: `PRINT POS <float> >`.
///
/// ```
/// # use newmark::reply::position;
/// assert_eq!(position("PRINT POS 7.500000 >", '>').unwrap(), 7.5);
/// assert!(position("GARBAGE", '>').is_err());
/// ```
pub fn position(reply: &str, prompt: char) -> Result<f64, UnexpectedReplyError> {
	let mut scanner = Scanner::new(reply, prompt);
	scanner.word("PRINT")?;
	scanner.word("POS")?;
	let position = scanner.value::<f64>()?;
	scanner.prompt()?;
	if position.is_finite() {
		Ok(position)
	} else {
		Err(scanner.error())
	}
}

/// Parse the reply to `PRINT ERR`: `PRINT ERR <TRUE|FALSE> >`.
pub fn error_exists(reply: &str, prompt: char) -> Result<bool, UnexpectedReplyError> {
	let mut scanner = Scanner::new(reply, prompt);
	scanner.word("PRINT")?;
	scanner.word("ERR")?;
	let exists = match scanner.token()? {
		"TRUE" => true,
		"FALSE" => false,
		_ => return Err(scanner.error()),
	};
	scanner.prompt()?;
	Ok(exists)
}

/// Parse the reply to `PRINT ERROR`: `PRINT ERROR <int> >`.
pub fn error_code(reply: &str, prompt: char) -> Result<i64, UnexpectedReplyError> {
	let mut scanner = Scanner::new(reply, prompt);
	scanner.word("PRINT")?;
	scanner.word("ERROR")?;
	let code = scanner.value::<i64>()?;
	scanner.prompt()?;
	Ok(code)
}

/// Check the reply to `ERROR = 0`: `ERROR = <int> >`, where the code must now be zero.
pub fn error_reset(reply: &str, prompt: char) -> Result<(), Error> {
	let mut scanner = Scanner::new(reply, prompt);
	scanner.word("ERROR")?;
	scanner.word("=")?;
	let code = scanner.value::<i64>()?;
	scanner.prompt()?;
	if code == 0 {
		Ok(())
	} else {
		Err(ErrorNotClearedError::new(code).into())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn position_ok() {
		assert_eq!(position("PRINT POS 7.500000 >", '>').unwrap(), 7.5);
		assert_eq!(position("PRINT POS 12.345000 >", '>').unwrap(), 12.345);
		assert_eq!(position("PRINT POS\r\n-3.25\r\n>", '>').unwrap(), -3.25);
		// The prompt may follow the value directly, and trailing text is ignored.
		assert_eq!(position("PRINT POS 1.0>", '>').unwrap(), 1.0);
		assert_eq!(position("  PRINT POS 2 > extra", '>').unwrap(), 2.0);
	}

	#[test]
	fn position_fail() {
		let err = position("GARBAGE", '>').unwrap_err();
		assert_eq!(err.reply(), "GARBAGE");

		for reply in [
			"",
			"PRINT POS >",
			"PRINT POS abc >",
			"PRINT POS 1.0",
			"PRINT POSITION 1.0 >",
			"PRINT ERR 1.0 >",
			"PRINT POS NaN >",
		] {
			let err = position(reply, '>').unwrap_err();
			assert_eq!(err.reply(), reply);
		}
	}

	#[test]
	fn error_exists_ok() {
		assert!(error_exists("PRINT ERR TRUE >", '>').unwrap());
		assert!(!error_exists("PRINT ERR\r\nFALSE\r\n>", '>').unwrap());
	}

	#[test]
	fn error_exists_fail() {
		for reply in ["PRINT ERR MAYBE >", "PRINT ERR true >", "PRINT ERROR 1 >", "PRINT ERR TRUE"] {
			assert_eq!(error_exists(reply, '>').unwrap_err().reply(), reply);
		}
	}

	#[test]
	fn error_code_ok() {
		assert_eq!(error_code("PRINT ERROR 0 >", '>').unwrap(), 0);
		assert_eq!(error_code("PRINT ERROR 23 >", '>').unwrap(), 23);
		assert_eq!(error_code("PRINT ERROR -4 >", '>').unwrap(), -4);
	}

	#[test]
	fn error_code_fail() {
		for reply in ["PRINT ERROR 1.5 >", "PRINT ERR 1 >", "PRINT ERROR >"] {
			assert_eq!(error_code(reply, '>').unwrap_err().reply(), reply);
		}
	}

	#[test]
	fn error_reset_requires_zero() {
		error_reset("ERROR = 0 >", '>').unwrap();
		error_reset("ERROR = 0\r\n>", '>').unwrap();

		let err = error_reset("ERROR = 5 >", '>').unwrap_err();
		assert!(matches!(err, Error::ErrorNotCleared(e) if e.code() == 5), "{err:?}");

		let err = error_reset("ERROR 0 >", '>').unwrap_err();
		assert!(matches!(err, Error::UnexpectedReply(_)), "{err:?}");
	}

	#[test]
	fn homed_requires_completion_text() {
		homed("HOME\r\nHoming Complete\r\n>").unwrap();
		let err = homed("HOME\r\n>").unwrap_err();
		assert_eq!(err.reply(), "HOME\r\n>");
	}

	#[test]
	fn custom_prompt() {
		assert_eq!(position("PRINT POS 4.0 #", '#').unwrap(), 4.0);
		assert!(position("PRINT POS 4.0 >", '#').is_err());
	}
}
