//! A simple but careful library for driving Newmark single-axis linear slide
//! controllers.
//!
//! The controller speaks a line-based ASCII protocol over a serial or TCP
//! connection and terminates every reply with a `>` prompt. Each command is a
//! single locked exchange on the connection: stale bytes are flushed, the
//! command is written, and the reply is read until the prompt arrives.
//!
//! All communication starts with a [`Stage`]:
//!
//! ```rust
//! # use newmark::{error::Error, Stage};
//! # fn wrapper() -> Result<(), Error> {
//! let stage = Stage::open_serial("/dev/ttyUSB0")?;
//! stage.home()?;
//! stage.set_tolerance(0.005)?;
//! let reached = stage.move_to(25.0)?;
//! println!("stopped at {reached} mm");
//! # Ok(())
//! # }
//! ```
//!
//! Failures are returned to the caller and also recorded as the stage's
//! [last error](Stage::last_error), which carries a numeric
//! [`ErrorCode`](error::ErrorCode) and a formatted message.

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(missing_debug_implementations)]

#[macro_use]
pub mod diagnostics;
pub mod backend;
pub mod command;
pub mod error;
pub mod port;
pub mod reader;
pub mod reply;
pub mod shared;
pub mod stage;
pub mod timeout_guard;
pub mod tolerance;

pub use port::{Connection, OpenSerialOptions, OpenTcpOptions, Port, PortOptions};
pub use stage::Stage;
