use std::{
	collections::VecDeque,
	io,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	time::Duration,
};

use crate::{
	backend::Mock,
	diagnostics::{Capture, Diagnostics, Level, Threshold},
	error::{Error, ErrorCode},
	port::{Port, PortOptions, Sleep},
	stage::{Stage, STALL_LIMIT},
};
use static_assertions::assert_impl_all;

assert_impl_all!(Stage<Mock>: Send, Sync, Clone);

/// Skips sleeping entirely.
struct NoSleep;

impl Sleep for NoSleep {
	fn sleep(&self, _: Duration) -> io::Result<()> {
		Ok(())
	}
}

/// Always fails to sleep.
struct BrokenSleep;

impl Sleep for BrokenSleep {
	fn sleep(&self, _: Duration) -> io::Result<()> {
		Err(io::Error::new(io::ErrorKind::Other, "no sleep for you"))
	}
}

/// A simulated controller.
///
/// Successive position queries return the scripted positions, repeating the
/// last one once they run out. The error flag latches on the given poll and is
/// cleared by reading the error code, like the real hardware.
struct Controller {
	positions: VecDeque<f64>,
	current: f64,
	polls: u32,
	fault: Option<(u32, i64)>,
	error_flag: bool,
	error_code: i64,
	reset_leaves: i64,
}

impl Controller {
	fn new(positions: &[f64]) -> Self {
		Controller {
			positions: positions.iter().copied().collect(),
			current: 0.0,
			polls: 0,
			fault: None,
			error_flag: false,
			error_code: 0,
			reset_leaves: 0,
		}
	}

	/// Raise `code` once `poll` position queries have been answered.
	fn fault_at(mut self, poll: u32, code: i64) -> Self {
		self.fault = Some((poll, code));
		self
	}

	fn respond(&mut self, written: &[u8]) -> Option<Vec<u8>> {
		let text = String::from_utf8_lossy(written);
		let reply = match text.trim_end() {
			"HOME" => "HOME\r\nHoming Complete\r\n>".to_string(),
			"PRINT POS" => {
				if let Some(next) = self.positions.pop_front() {
					self.current = next;
				}
				self.polls += 1;
				if let Some((poll, code)) = self.fault {
					if self.polls == poll {
						self.error_flag = true;
						self.error_code = code;
					}
				}
				format!("PRINT POS\r\n{:.6}\r\n>", self.current)
			}
			"PRINT ERR" => format!(
				"PRINT ERR\r\n{}\r\n>",
				if self.error_flag { "TRUE" } else { "FALSE" }
			),
			"PRINT ERROR" => {
				self.error_flag = false;
				format!("PRINT ERROR\r\n{}\r\n>", self.error_code)
			}
			"ERROR = 0" => {
				self.error_code = self.reset_leaves;
				format!("ERROR = {}\r\n>", self.error_code)
			}
			"\u{1b}" => return None,
			other => format!("{other}\r\n>"),
		};
		Some(reply.into_bytes())
	}
}

fn port_with(controller: Controller, options: PortOptions) -> Port<Mock> {
	let mut controller = controller;
	let mut mock = Mock::new();
	mock.set_responder(move |written| controller.respond(written));
	Port::with_options(mock, options)
}

fn stage_with(controller: Controller) -> (Stage<Mock>, Arc<Capture>) {
	let mut options = PortOptions::new();
	options.sleeper(NoSleep);
	let capture = Arc::new(Capture::default());
	let diagnostics = Diagnostics::new(capture.clone(), Threshold(Level::Trace));
	(
		Stage::with_diagnostics(port_with(controller, options), diagnostics),
		capture,
	)
}

/// Get every command written so far, without line endings.
fn written(stage: &Stage<Mock>) -> Vec<String> {
	stage
		.port()
		.connection()
		.unwrap()
		.backend()
		.written()
		.iter()
		.map(|w| String::from_utf8_lossy(w).trim_end().to_string())
		.collect()
}

fn count(commands: &[String], command: &str) -> usize {
	commands.iter().filter(|c| *c == command).count()
}

#[test]
fn move_reaches_target() {
	let (stage, _) = stage_with(Controller::new(&[0.0, 5.0, 9.0, 9.99, 10.0009]));

	let reached = stage.move_to(10.0).unwrap();
	assert_eq!(reached, 10.0009);

	let commands = written(&stage);
	assert_eq!(commands[0], "ERROR = 0");
	assert_eq!(commands[1], "MOVA 10.000000");
	// Each poll reads the position and then the error flag, and nothing else.
	let polls: Vec<_> = commands[2..].chunks(2).collect();
	assert_eq!(polls.len(), 5);
	for poll in polls {
		assert_eq!(poll, ["PRINT POS", "PRINT ERR"]);
	}
	assert_eq!(count(&commands, "PRINT ERROR"), 0);
	assert_eq!(stage.last_error(), None);
}

#[test]
fn move_finishes_on_first_reading_within_tolerance() {
	let (stage, _) = stage_with(Controller::new(&[0.0, 5.0, 9.0, 9.999, 10.0]));

	assert_eq!(stage.move_to(10.0).unwrap(), 9.999);
	assert_eq!(count(&written(&stage), "PRINT POS"), 4);
}

#[test]
fn move_uses_current_tolerance() {
	let (stage, _) = stage_with(Controller::new(&[0.0, 9.6, 9.9, 10.0]));
	stage.set_tolerance(0.5).unwrap();

	assert_eq!(stage.move_to(10.0).unwrap(), 9.6);
}

#[test]
fn move_stalls_after_unchanged_readings() {
	let (stage, _) = stage_with(Controller::new(&[3.0]));

	let err = stage.move_to(10.0).unwrap_err();
	let Error::MoveStalled(stalled) = err else {
		panic!("unexpected error {err:?}");
	};
	assert_eq!(stalled.polls(), STALL_LIMIT);
	assert_eq!(stalled.position(), 3.0);
	assert_eq!(stalled.target(), 10.0);

	let commands = written(&stage);
	assert_eq!(count(&commands, "PRINT POS"), STALL_LIMIT as usize);
	// The stall is detected before the error flag is read on the final poll.
	assert_eq!(count(&commands, "PRINT ERR"), STALL_LIMIT as usize - 1);
	assert_eq!(stage.last_error().unwrap().code, ErrorCode::MoveStalled);
}

#[test]
fn movement_resets_stall_counter() {
	let mut positions = vec![1.0; 9];
	positions.extend([2.0; 9]);
	positions.push(10.0);
	let (stage, _) = stage_with(Controller::new(&positions));

	assert_eq!(stage.move_to(10.0).unwrap(), 10.0);
	assert_eq!(count(&written(&stage), "PRINT POS"), 19);
}

#[test]
fn move_reports_controller_error() {
	let (stage, _) = stage_with(Controller::new(&[0.0, 1.0, 2.0, 3.0]).fault_at(3, 23));

	let err = stage.move_to(10.0).unwrap_err();
	let Error::ControllerFault(fault) = err else {
		panic!("unexpected error {err:?}");
	};
	assert_eq!(fault.code(), 23);

	let commands = written(&stage);
	assert_eq!(count(&commands, "PRINT POS"), 3);
	assert_eq!(count(&commands, "PRINT ERROR"), 1);
	// The flag is read before the code, which clears it.
	let n = commands.len();
	assert_eq!(commands[n - 2..], ["PRINT ERR", "PRINT ERROR"]);

	let last = stage.last_error().unwrap();
	assert_eq!(last.code, ErrorCode::ControllerFault);
	assert!(last.message.contains("23"), "{}", last.message);
}

#[test]
fn move_stops_when_reset_fails() {
	let mut controller = Controller::new(&[0.0]);
	controller.reset_leaves = 5;
	let (stage, _) = stage_with(controller);

	let err = stage.move_to(10.0).unwrap_err();
	assert!(matches!(err, Error::ErrorNotCleared(e) if e.code() == 5), "{err:?}");
	assert_eq!(written(&stage), ["ERROR = 0"]);
	assert_eq!(stage.last_error().unwrap().code, ErrorCode::ErrorNotCleared);
}

#[test]
fn move_rejects_non_finite_target() {
	let (stage, _) = stage_with(Controller::new(&[0.0]));

	for target in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
		let err = stage.move_to(target).unwrap_err();
		assert!(matches!(err, Error::InvalidArgument(_)), "{err:?}");
	}
	assert!(stage.move_absolute(f64::NAN).is_err());
	assert!(stage.move_relative(f64::INFINITY).is_err());
	assert!(written(&stage).is_empty());
	assert_eq!(stage.last_error().unwrap().code, ErrorCode::InvalidArgument);
}

#[test]
fn move_survives_failed_sleeps() {
	let mut options = PortOptions::new();
	options.sleeper(BrokenSleep);
	let capture = Arc::new(Capture::default());
	let diagnostics = Diagnostics::new(capture.clone(), Threshold(Level::Warn));
	let stage = Stage::with_diagnostics(
		port_with(Controller::new(&[0.0, 10.0]), options),
		diagnostics,
	);

	assert_eq!(stage.move_to(10.0).unwrap(), 10.0);
	assert!(!capture.messages(Level::Warn).is_empty());
	assert_eq!(stage.last_error(), None);
}

#[test]
fn move_logs_transitions() {
	let (stage, capture) = stage_with(Controller::new(&[0.0, 10.0]));

	stage.move_to(10.0).unwrap();
	let debug = capture.messages(Level::Debug);
	for phase in ["resetting error", "moving", "polling", "reached 10.000000"] {
		assert!(debug.iter().any(|m| m.contains(phase)), "{phase}: {debug:?}");
	}
	let polls = capture
		.messages(Level::Trace)
		.into_iter()
		.filter(|m| m.contains("poll "))
		.count();
	assert_eq!(polls, 2);
}

#[test]
fn tolerance_setter_validates() {
	let (stage, _) = stage_with(Controller::new(&[0.0]));
	assert_eq!(stage.tolerance(), 0.002);

	stage.set_tolerance(1.0).unwrap();
	assert_eq!(stage.tolerance(), 1.0);
	stage.set_tolerance(0.0).unwrap();
	assert_eq!(stage.tolerance(), 0.0);

	let err = stage.set_tolerance(1.5).unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)), "{err:?}");
	assert_eq!(stage.tolerance(), 0.0);
	assert_eq!(stage.last_error().unwrap().code, ErrorCode::InvalidArgument);

	assert!(stage.set_tolerance(-0.1).is_err());
	assert!(stage.set_tolerance(f64::NAN).is_err());
	assert_eq!(stage.tolerance(), 0.0);
}

#[test]
fn clones_share_tolerance_and_last_error() {
	let (stage, _) = stage_with(Controller::new(&[0.0]));
	let other = stage.clone();

	other.set_tolerance(0.25).unwrap();
	assert_eq!(stage.tolerance(), 0.25);

	assert!(other.set_tolerance(2.0).is_err());
	assert_eq!(stage.last_error().unwrap().code, ErrorCode::InvalidArgument);
}

#[test]
fn single_commands() {
	let (stage, _) = stage_with(Controller::new(&[12.345]));

	stage.home().unwrap();
	assert_eq!(stage.position().unwrap(), 12.345);
	stage.move_absolute(20.0).unwrap();
	stage.move_relative(-2.5).unwrap();
	assert!(!stage.error_exists().unwrap());
	assert_eq!(stage.error_code().unwrap(), 0);
	stage.reset_error().unwrap();
	stage.abort().unwrap();

	assert_eq!(
		written(&stage),
		[
			"HOME",
			"PRINT POS",
			"MOVA 20.000000",
			"MOVR -2.500000",
			"PRINT ERR",
			"PRINT ERROR",
			"ERROR = 0",
			"\u{1b}",
		]
	);
	assert_eq!(stage.last_error(), None);
}

#[test]
fn garbage_reply_is_a_parse_error() {
	let mut mock = Mock::new();
	mock.set_responder(|_| Some(b"GARBAGE >".to_vec()));
	let mut options = PortOptions::new();
	options.sleeper(NoSleep);
	let stage = Stage::new(Port::with_options(mock, options));

	let err = stage.position().unwrap_err();
	let Error::UnexpectedReply(unexpected) = err else {
		panic!("unexpected error {err:?}");
	};
	assert_eq!(unexpected.reply(), "GARBAGE >");

	let last = stage.last_error().unwrap();
	assert_eq!(last.code, ErrorCode::UnexpectedReply);
	assert!(last.message.contains("GARBAGE"), "{}", last.message);

	assert!(stage.home().is_err());
	assert!(stage.error_exists().is_err());
	assert!(stage.error_code().is_err());
	assert!(stage.reset_error().is_err());
}

#[test]
fn reset_error_requires_zero() {
	let mut mock = Mock::new();
	mock.set_responder(|_| Some(b"ERROR = 5 >".to_vec()));
	let mut options = PortOptions::new();
	options.sleeper(NoSleep);
	let stage = Stage::new(Port::with_options(mock, options));

	let err = stage.reset_error().unwrap_err();
	assert!(matches!(err, Error::ErrorNotCleared(e) if e.code() == 5), "{err:?}");
	assert_eq!(stage.last_error().unwrap().code, ErrorCode::ErrorNotCleared);
}

#[test]
fn missing_reply_times_out() {
	let mut options = PortOptions::new();
	options.sleeper(NoSleep);
	let stage = Stage::new(Port::with_options(Mock::new(), options));

	let err = stage.position().unwrap_err();
	assert!(err.is_timeout(), "{err:?}");
	assert_eq!(stage.last_error().unwrap().code, ErrorCode::ReadTimeout);
}

#[test]
fn stage_is_usable_across_threads() {
	let (stage, _) = stage_with(Controller::new(&[4.0]));
	let done = Arc::new(AtomicBool::new(false));

	let handle = {
		let stage = stage.clone();
		let done = done.clone();
		std::thread::spawn(move || {
			let position = stage.position().unwrap();
			done.store(true, Ordering::SeqCst);
			position
		})
	};
	assert_eq!(handle.join().unwrap(), 4.0);
	assert!(done.load(Ordering::SeqCst));
	assert_eq!(stage.position().unwrap(), 4.0);
}
