//! Types for opening and exchanging commands over a connection to a controller.

mod options;

use crate::{
	backend::{Backend, Serial, UNKNOWN_BACKEND_NAME},
	command::Command,
	diagnostics::{display_bytes, Diagnostics, Level},
	error::{Error, LockError},
	reader::Reader,
	shared::SharedMut,
	timeout_guard::{Link, TimeoutGuard},
};
pub use options::*;
use std::{
	io,
	marker::PhantomData,
	net::{TcpStream, ToSocketAddrs},
	sync::{Arc, Mutex},
};

/// A backend and the state attached to it.
///
/// A `Connection` is always accessed through the lock of the [`Port`] that owns it.
#[derive(Debug)]
pub struct Connection<B> {
	/// The underlying backend
	backend: B,
	/// If populated, the connection is poisoned and this error should be
	/// returned by the next exchange.
	poison: Option<io::Error>,
}

impl<B: Backend> Connection<B> {
	/// Create a healthy connection over `backend`.
	pub fn new(backend: B) -> Self {
		Connection {
			backend,
			poison: None,
		}
	}

	/// Get an immutable reference to the backend.
	pub fn backend(&self) -> &B {
		&self.backend
	}

	/// Get a mutable reference to the backend.
	///
	/// Writing to or reading from the backend directly may confuse subsequent
	/// exchanges.
	pub fn backend_mut(&mut self) -> &mut B {
		&mut self.backend
	}

	/// Consume the connection and return the backend.
	pub fn into_backend(self) -> B {
		self.backend
	}

	/// Whether the connection is poisoned.
	///
	/// The error that poisoned it is returned by the next exchange.
	pub fn is_poisoned(&self) -> bool {
		self.poison.is_some()
	}

	/// Check if the connection is poisoned and report the error if it exists.
	fn check_poisoned(&mut self) -> Result<(), io::Error> {
		if let Some(poison) = self.poison.take() {
			Err(poison)
		} else {
			Ok(())
		}
	}
}

impl<B: Backend> Link<B> for Connection<B> {
	fn backend_mut(&mut self) -> &mut B {
		&mut self.backend
	}
	fn poison(&mut self, e: io::Error) {
		self.poison = Some(e);
	}
}

/// A cloneable handle to a shared connection.
///
/// A port is parameterized by two types:
///
/// 1. `B`: the type of [`Backend`] used to exchange bytes.
///    * Use the convenience methods [`open_serial`] and [`open_tcp`] to construct
///      a serial port (`Port<Serial>`) or a TCP port (`Port<TcpStream>`). To
///      customize the construction of these types, or to construct a port with a
///      dynamic backend, use the [`OpenSerialOptions`] and [`OpenTcpOptions`] builder
///      types.
/// 2. `S`: how the [`Connection`] is shared between clones.
///    * This has a default, `Arc<Mutex<_>>`, that can be used across threads.
///      Any [`SharedMut`] implementation can be used instead with
///      [`from_shared`](Port::from_shared).
///
/// Clones of a port exchange commands over the same connection, and each
/// exchange holds the connection's lock from before its command is written
/// until its reply has been read.
///
/// [`open_serial`]: Port::open_serial
/// [`open_tcp`]: Port::open_tcp
pub struct Port<B, S = Arc<Mutex<Connection<B>>>> {
	/// The shared connection
	shared: S,
	/// The reply and polling configuration
	options: PortOptions,
	backend: PhantomData<fn() -> B>,
}

impl<B, S: Clone> Clone for Port<B, S> {
	fn clone(&self) -> Self {
		Port {
			shared: self.shared.clone(),
			options: self.options.clone(),
			backend: PhantomData,
		}
	}
}

impl<B, S> std::fmt::Debug for Port<B, S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Port")
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}

impl Port<Serial> {
	/// Open the serial port at the specified path using the default options.
	///
	/// Alternatively, use [`OpenSerialOptions`] to customize how the port is opened.
	///
	/// ## Example
	///
	/// ```rust
	/// # use newmark::Port;
	/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
	/// let mut port = Port::open_serial("/dev/ttyUSB0")?;
	/// # Ok(())
	/// # }
	/// ```
	pub fn open_serial(path: &str) -> Result<Port<Serial>, Error> {
		OpenSerialOptions::new().open(path)
	}
}

impl Port<TcpStream> {
	/// Open a TCP port at the specified address using the default options.
	///
	/// Alternatively, use [`OpenTcpOptions`] to customize how the port is opened.
	pub fn open_tcp<A: ToSocketAddrs>(address: A) -> Result<Port<TcpStream>, Error> {
		OpenTcpOptions::new().open(address)
	}
}

impl<B: Backend> Port<B> {
	/// Create a `Port` over `backend` with the default options.
	pub fn new(backend: B) -> Self {
		Port::with_options(backend, PortOptions::default())
	}

	/// Create a `Port` over `backend` with custom options.
	pub fn with_options(backend: B, options: PortOptions) -> Self {
		Port::from_shared(SharedMut::new(Connection::new(backend)), options)
	}
}

impl<B, S> Port<B, S>
where
	B: Backend,
	S: SharedMut<Connection<B>>,
{
	/// Create a `Port` from an already shared connection.
	pub fn from_shared(shared: S, options: PortOptions) -> Self {
		Port {
			shared,
			options,
			backend: PhantomData,
		}
	}

	/// Get the port's options.
	pub fn options(&self) -> &PortOptions {
		&self.options
	}

	/// Lock the connection for direct access.
	///
	/// No exchange can run on any clone of this port until the returned guard
	/// is dropped.
	pub fn connection(&self) -> Result<S::GuardMut<'_>, LockError> {
		self.shared.lock_mut()
	}

	/// Exchange a single command with the controller and return its reply.
	///
	/// The connection's lock is acquired before anything is written and is
	/// released when the exchange ends, however it ends. While it is held,
	/// any stale input is discarded, the encoded command is written, and the
	/// reply is read until the prompt, subject to the command's read budget
	/// and timeout policy.
	///
	/// The raw reply text is returned unparsed. Invalid UTF-8 is replaced.
	pub fn exchange(&self, command: Command, diagnostics: &Diagnostics) -> Result<String, Error> {
		let mut connection = self.shared.lock_mut()?;
		connection.check_poisoned()?;

		let name = connection
			.backend
			.name()
			.unwrap_or_else(|| UNKNOWN_BACKEND_NAME.to_string());
		let mut guard = TimeoutGuard::new(&mut *connection, Some(self.options.read_timeout))?;
		let backend = &mut guard.backend;

		Reader::new(&mut *backend, &self.options, diagnostics).flush()?;

		let bytes = command.to_bytes();
		diag!(diagnostics, Level::Debug, "{name} TX: {}", display_bytes(&bytes));
		backend.write_all(&bytes)?;
		backend.flush()?;

		let mut reply = Vec::new();
		Reader::new(&mut *backend, &self.options, diagnostics).read_until_prompt(
			command.read_budget(),
			command.on_timeout(),
			Some(&mut reply),
		)?;
		diag!(diagnostics, Level::Debug, "{name} RX: {}", display_bytes(&reply));

		Ok(String::from_utf8_lossy(&reply).into_owned())
	}

	/// Consume the port and return the backend.
	///
	/// If other clones of the port exist, `None` is returned.
	pub fn into_backend(self) -> Option<B> {
		S::into_inner(self.shared).map(Connection::into_backend)
	}
}
