//! The commands understood by the controller.
//!
//! A [`Command`] knows how it is encoded on the wire, how long the controller
//! may take to finish replying to it, and whether running out of time is an
//! error.

use std::io;

/// The byte that interrupts any motion in progress.
pub const ESCAPE: u8 = 0x1B;

/// What to do when a reply's read budget runs out before the prompt arrives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OnTimeout {
    /// Fail with a read timeout.
    Error,
    /// Stop reading and keep whatever was received.
    Quiet,
}

/// A command that can be sent to the controller.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Command {
    /// Home the stage (`HOME`).
    Home,
    /// Read the current position (`PRINT POS`).
    Position,
    /// Move to an absolute position, in mm (`MOVA`).
    MoveAbsolute(f64),
    /// Move by a relative distance, in mm (`MOVR`).
    MoveRelative(f64),
    /// Stop any motion immediately (a single escape byte).
    Abort,
    /// Ask whether an error exists (`PRINT ERR`).
    ///
    /// Reading the error code clears this flag on the controller.
    ErrorExists,
    /// Read the current error code (`PRINT ERROR`).
    ErrorCode,
    /// Reset the error code to zero (`ERROR = 0`).
    ResetError,
}

impl Command {
    /// Write the command, including its line ending, into `writer`.
    ///
    /// ```
    /// # use newmark::command::Command;
    /// let mut buf = Vec::new();
    /// Command::MoveAbsolute(12.5).write_into(&mut buf).unwrap();
    /// assert_eq!(buf, b"MOVA 12.500000\r\n");
    /// ```
    pub fn write_into<W: io::Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Command::Home => write!(writer, "HOME\r\n"),
            Command::Position => write!(writer, "PRINT POS\r\n"),
            Command::MoveAbsolute(position) => write!(writer, "MOVA {position:.6}\r\n"),
            Command::MoveRelative(distance) => write!(writer, "MOVR {distance:.6}\r\n"),
            Command::Abort => writer.write_all(&[ESCAPE]),
            Command::ErrorExists => write!(writer, "PRINT ERR\r\n"),
            Command::ErrorCode => write!(writer, "PRINT ERROR\r\n"),
            Command::ResetError => write!(writer, "ERROR = 0\r\n"),
        }
    }

    /// Get the encoded command.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(24);
        // Writing into a Vec cannot fail.
        let _ = self.write_into(&mut buf);
        buf
    }

    /// The number of empty reads allowed while waiting for the reply.
    ///
    /// With the 10 ms poll interval, 100 empty reads is roughly one second.
    pub fn read_budget(&self) -> u32 {
        match self {
            Command::Home => 6000,
            // The controller can take several seconds to answer this one.
            Command::ErrorExists => 1000,
            Command::Position
            | Command::MoveAbsolute(_)
            | Command::MoveRelative(_)
            | Command::Abort
            | Command::ErrorCode
            | Command::ResetError => 100,
        }
    }

    /// What happens when the read budget runs out.
    pub fn on_timeout(&self) -> OnTimeout {
        match self {
            Command::Abort => OnTimeout::Quiet,
            _ => OnTimeout::Error,
        }
    }

    /// A short name for the command, for log messages.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Home => "home",
            Command::Position => "position",
            Command::MoveAbsolute(_) => "move absolute",
            Command::MoveRelative(_) => "move relative",
            Command::Abort => "abort",
            Command::ErrorExists => "error exists",
            Command::ErrorCode => "error code",
            Command::ResetError => "reset error",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_text() {
        let cases: &[(Command, &[u8])] = &[
            (Command::Home, b"HOME\r\n"),
            (Command::Position, b"PRINT POS\r\n"),
            (Command::MoveAbsolute(10.0), b"MOVA 10.000000\r\n"),
            (Command::MoveAbsolute(-0.0015), b"MOVA -0.001500\r\n"),
            (Command::MoveRelative(2.25), b"MOVR 2.250000\r\n"),
            (Command::MoveRelative(-3.0), b"MOVR -3.000000\r\n"),
            (Command::Abort, b"\x1b"),
            (Command::ErrorExists, b"PRINT ERR\r\n"),
            (Command::ErrorCode, b"PRINT ERROR\r\n"),
            (Command::ResetError, b"ERROR = 0\r\n"),
        ];
        for (command, expected) in cases {
            assert_eq!(
                command.to_bytes(),
                *expected,
                "{} encoded as {:?}",
                command.name(),
                String::from_utf8_lossy(&command.to_bytes())
            );
        }
    }

    #[test]
    fn budgets_and_timeout_policy() {
        assert_eq!(Command::Home.read_budget(), 6000);
        assert_eq!(Command::ErrorExists.read_budget(), 1000);
        assert_eq!(Command::Position.read_budget(), 100);
        assert_eq!(Command::ResetError.read_budget(), 100);
        assert_eq!(Command::Abort.on_timeout(), OnTimeout::Quiet);
        assert_eq!(Command::Home.on_timeout(), OnTimeout::Error);
        assert_eq!(Command::MoveRelative(1.0).on_timeout(), OnTimeout::Error);
    }
}
