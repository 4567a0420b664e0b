//! The interface to a single-axis linear slide.

#[cfg(test)]
mod test;

use crate::{
	backend::{Backend, Serial},
	command::Command,
	diagnostics::{Diagnostics, LastError, Level},
	error::{ControllerFaultError, Error, InvalidArgumentError, MoveStalledError},
	port::{Connection, Port},
	reply,
	shared::SharedMut,
	tolerance::Tolerance,
};
use std::{
	net::{TcpStream, ToSocketAddrs},
	sync::{Arc, Mutex},
};

/// The number of consecutive identical position readings after which a move
/// is considered stalled.
pub const STALL_LIMIT: u32 = 10;

/// A linear slide driven through a controller.
///
/// Every command is a single exchange on the underlying [`Port`]; the
/// connection is locked for the exchange and released before the reply is
/// parsed. Clones of a `Stage` share the port, the [`Diagnostics`] and the
/// [`Tolerance`].
///
/// Any failure is both returned and recorded as the [last error](Stage::last_error).
///
/// ## Example
///
/// ```rust
/// # use newmark::{error::Error, Port, Stage};
/// # fn wrapper() -> Result<(), Error> {
/// let stage = Stage::new(Port::open_tcp("192.168.0.10:5001")?);
/// if stage.error_exists()? {
///     println!("controller error {}", stage.error_code()?);
///     stage.reset_error()?;
/// }
/// stage.move_relative(-2.5)?;
/// # Ok(())
/// # }
/// ```
pub struct Stage<B, S = Arc<Mutex<Connection<B>>>> {
	port: Port<B, S>,
	diagnostics: Arc<Diagnostics>,
	tolerance: Arc<Tolerance>,
}

impl<B, S: Clone> Clone for Stage<B, S> {
	fn clone(&self) -> Self {
		Stage {
			port: self.port.clone(),
			diagnostics: Arc::clone(&self.diagnostics),
			tolerance: Arc::clone(&self.tolerance),
		}
	}
}

impl<B, S> std::fmt::Debug for Stage<B, S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Stage")
			.field("port", &self.port)
			.field("diagnostics", &self.diagnostics)
			.field("tolerance", &self.tolerance.get())
			.finish()
	}
}

impl Stage<Serial> {
	/// Open the serial port at the specified path using the default options.
	pub fn open_serial(path: &str) -> Result<Self, Error> {
		Ok(Stage::new(Port::open_serial(path)?))
	}
}

impl Stage<TcpStream> {
	/// Open a TCP connection at the specified address using the default options.
	pub fn open_tcp<A: ToSocketAddrs>(address: A) -> Result<Self, Error> {
		Ok(Stage::new(Port::open_tcp(address)?))
	}
}

/// Reject non-finite positions and distances before they reach the wire.
fn check_finite(what: &'static str, value: f64) -> Result<(), InvalidArgumentError> {
	if value.is_finite() {
		Ok(())
	} else {
		Err(InvalidArgumentError::new(what, value))
	}
}

impl<B, S> Stage<B, S>
where
	B: Backend,
	S: SharedMut<Connection<B>>,
{
	/// Create a `Stage` that forwards its log records to the [`log`] crate.
	pub fn new(port: Port<B, S>) -> Self {
		Stage::with_diagnostics(port, Diagnostics::default())
	}

	/// Create a `Stage` with custom diagnostics.
	pub fn with_diagnostics<D: Into<Arc<Diagnostics>>>(port: Port<B, S>, diagnostics: D) -> Self {
		Stage {
			port,
			diagnostics: diagnostics.into(),
			tolerance: Arc::default(),
		}
	}

	/// Get the underlying port.
	pub fn port(&self) -> &Port<B, S> {
		&self.port
	}

	/// Get the diagnostics used by this stage.
	pub fn diagnostics(&self) -> &Diagnostics {
		&self.diagnostics
	}

	/// Get the most recent failure, if any.
	pub fn last_error(&self) -> Option<LastError> {
		self.diagnostics.last_error()
	}

	/// Record a failure before handing it back to the caller.
	fn recorded<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
		result.map_err(|err| {
			self.diagnostics.record(module_path!(), &err);
			err
		})
	}

	/// Exchange `command` and parse its reply with `parse`.
	fn command<T, F>(&self, command: Command, parse: F) -> Result<T, Error>
	where
		F: FnOnce(&str, char) -> Result<T, Error>,
	{
		let reply = self.port.exchange(command, &self.diagnostics)?;
		parse(&reply, char::from(self.port.options().prompt))
	}

	fn send_home(&self) -> Result<(), Error> {
		self.command(Command::Home, |text, _| Ok(reply::homed(text)?))
	}

	fn read_position(&self) -> Result<f64, Error> {
		self.command(Command::Position, |text, prompt| {
			Ok(reply::position(text, prompt)?)
		})
	}

	fn send_move_absolute(&self, position: f64) -> Result<(), Error> {
		check_finite("target position", position)?;
		self.command(Command::MoveAbsolute(position), |_, _| Ok(()))
	}

	fn read_error_exists(&self) -> Result<bool, Error> {
		self.command(Command::ErrorExists, |text, prompt| {
			Ok(reply::error_exists(text, prompt)?)
		})
	}

	fn read_error_code(&self) -> Result<i64, Error> {
		self.command(Command::ErrorCode, |text, prompt| {
			Ok(reply::error_code(text, prompt)?)
		})
	}

	fn send_reset_error(&self) -> Result<(), Error> {
		self.command(Command::ResetError, reply::error_reset)
	}

	/// Home the stage.
	///
	/// The controller may take up to a minute to finish homing. The reply must
	/// report that homing completed.
	pub fn home(&self) -> Result<(), Error> {
		self.recorded(self.send_home())
	}

	/// Read the current position, in mm.
	pub fn position(&self) -> Result<f64, Error> {
		self.recorded(self.read_position())
	}

	/// Start a move to an absolute position, in mm.
	///
	/// This returns once the controller has acknowledged the command, not
	/// when the move has finished. See [`move_to`](Stage::move_to).
	pub fn move_absolute(&self, position: f64) -> Result<(), Error> {
		self.recorded(self.send_move_absolute(position))
	}

	/// Start a move by a relative distance, in mm.
	pub fn move_relative(&self, distance: f64) -> Result<(), Error> {
		self.recorded(
			check_finite("distance", distance)
				.map_err(Error::from)
				.and_then(|()| self.command(Command::MoveRelative(distance), |_, _| Ok(()))),
		)
	}

	/// Stop any motion immediately.
	///
	/// The controller may not answer, so a missing reply is not an error.
	pub fn abort(&self) -> Result<(), Error> {
		self.recorded(self.command(Command::Abort, |_, _| Ok(())))
	}

	/// Whether the controller has an error to report.
	///
	/// The controller clears this flag whenever the error code is read, so it
	/// must be checked before [`error_code`](Stage::error_code).
	pub fn error_exists(&self) -> Result<bool, Error> {
		self.recorded(self.read_error_exists())
	}

	/// Read the controller's error code.
	///
	/// The code persists until it is [reset](Stage::reset_error).
	pub fn error_code(&self) -> Result<i64, Error> {
		self.recorded(self.read_error_code())
	}

	/// Reset the controller's error code to zero.
	///
	/// Fails with [`ErrorNotCleared`](Error::ErrorNotCleared) if the
	/// controller still reports a non-zero code afterwards.
	pub fn reset_error(&self) -> Result<(), Error> {
		self.recorded(self.send_reset_error())
	}

	/// Set how close the stage must come to its target for
	/// [`move_to`](Stage::move_to) to finish, in mm.
	///
	/// The value must be within `[0, 1]`; otherwise the current tolerance is kept.
	pub fn set_tolerance(&self, tolerance: f64) -> Result<(), Error> {
		self.recorded(self.tolerance.set(tolerance).map_err(Error::from))
	}

	/// Get the current tolerance, in mm.
	pub fn tolerance(&self) -> f64 {
		self.tolerance.get()
	}

	/// Move to `target`, in mm, and wait until the stage gets there.
	///
	/// The controller's error code is reset and the move is started. Then,
	/// once every poll interval, the position is read and the controller is
	/// asked whether an error exists. The move finishes when the position is
	/// within the [tolerance](Stage::set_tolerance) of the target, and the
	/// position that satisfied it is returned.
	///
	/// The move fails with
	///   * [`ControllerFault`](Error::ControllerFault) if the controller
	///     reports an error, carrying the controller's error code, or
	///   * [`MoveStalled`](Error::MoveStalled) if [`STALL_LIMIT`] consecutive
	///     position readings are identical.
	///
	/// The connection is locked for each command separately, never for the
	/// whole move.
	pub fn move_to(&self, target: f64) -> Result<f64, Error> {
		self.recorded(self.run_move(target))
	}

	fn run_move(&self, target: f64) -> Result<f64, Error> {
		check_finite("target position", target)?;

		diag!(self.diagnostics, Level::Debug, "move to {target:.6}: resetting error");
		self.send_reset_error()?;

		diag!(self.diagnostics, Level::Debug, "move to {target:.6}: moving");
		self.send_move_absolute(target)?;

		diag!(self.diagnostics, Level::Debug, "move to {target:.6}: polling");
		let mut previous: Option<u64> = None;
		let mut unchanged = 0;
		let mut polls = 0u32;
		loop {
			self.port.options().pause(&self.diagnostics);

			let position = self.read_position()?;
			polls = polls.saturating_add(1);

			let bits = position.to_bits();
			if previous == Some(bits) {
				unchanged += 1;
			} else {
				unchanged = 1;
				previous = Some(bits);
			}
			diag!(
				self.diagnostics,
				Level::Trace,
				"move to {target:.6}: poll {polls} at {position:.6} ({unchanged} unchanged)"
			);
			if unchanged >= STALL_LIMIT {
				diag!(self.diagnostics, Level::Debug, "move to {target:.6}: stalled");
				return Err(MoveStalledError::new(target, position, polls).into());
			}

			// Reading the error code clears the exists flag, so the flag is
			// always read first.
			if self.read_error_exists()? {
				let code = self.read_error_code()?;
				diag!(
					self.diagnostics,
					Level::Debug,
					"move to {target:.6}: controller error {code}"
				);
				return Err(ControllerFaultError::new(code).into());
			}

			if self.tolerance.converged(position, target) {
				diag!(
					self.diagnostics,
					Level::Debug,
					"move to {target:.6}: reached {position:.6} after {polls} polls"
				);
				return Ok(position);
			}
		}
	}
}
