//! Types defining the different options when opening a port.

use super::Port;
use crate::{
    backend::{Backend, Serial},
    diagnostics::{Diagnostics, Level},
    error::Error,
};
use serialport as sp;
use std::{
    io,
    net::{TcpStream, ToSocketAddrs},
    sync::Arc,
    time::Duration,
};

/// Something that can suspend the calling thread.
///
/// The reply reader and the move orchestrator pause between reads through this
/// trait, which lets tests run without real delays. A failure to sleep is
/// logged and otherwise ignored.
pub trait Sleep: Send + Sync {
    /// Suspend the calling thread for `duration`.
    fn sleep(&self, duration: Duration) -> io::Result<()>;
}

/// Sleeps with [`std::thread::sleep`].
#[derive(Debug, Copy, Clone, Default)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, duration: Duration) -> io::Result<()> {
        std::thread::sleep(duration);
        Ok(())
    }
}

/// Options shared by every kind of port.
///
/// ## Example
///
/// ```rust
/// # use newmark::{Port, PortOptions};
/// # use std::time::Duration;
/// # fn wrapper(backend: std::net::TcpStream) {
/// let mut options = PortOptions::new();
/// options.poll_interval(Duration::from_millis(20));
/// let port = Port::with_options(backend, options);
/// # }
/// ```
#[derive(Clone)]
pub struct PortOptions {
    /// The byte that ends every reply.
    pub(crate) prompt: u8,
    /// The pause between reads, and between polls of a move.
    pub(crate) poll_interval: Duration,
    /// The backend read timeout used while exchanging a command.
    pub(crate) read_timeout: Duration,
    /// How to pause.
    pub(crate) sleeper: Arc<dyn Sleep>,
}

impl std::fmt::Debug for PortOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortOptions")
            .field("prompt", &char::from(self.prompt))
            .field("poll_interval", &self.poll_interval)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl PortOptions {
    /// The prompt the controller ends every reply with: `>`.
    pub const DEFAULT_PROMPT: u8 = b'>';
    /// The default pause between reads: 10 ms.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
    /// The default backend read timeout while exchanging a command: 1 ms.
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1);

    /// Create the default set of options ready for configuration.
    ///
    /// Equivalent to [`default`](PortOptions::default).
    pub fn new() -> Self {
        PortOptions {
            prompt: PortOptions::DEFAULT_PROMPT,
            poll_interval: PortOptions::DEFAULT_POLL_INTERVAL,
            read_timeout: PortOptions::DEFAULT_READ_TIMEOUT,
            sleeper: Arc::new(ThreadSleep),
        }
    }

    /// Set the byte that ends every reply.
    ///
    /// The default is `>`.
    pub fn prompt(&mut self, prompt: u8) -> &mut Self {
        self.prompt = prompt;
        self
    }

    /// Set the pause between reads.
    ///
    /// Read budgets count empty reads, so this also scales every reply
    /// timeout. The default is 10 ms.
    pub fn poll_interval(&mut self, interval: Duration) -> &mut Self {
        self.poll_interval = interval;
        self
    }

    /// Set the backend read timeout used while exchanging a command.
    ///
    /// It should be short so that a read with nothing to return comes back
    /// quickly. The default is 1 ms.
    pub fn read_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.read_timeout = timeout;
        self
    }

    /// Set how the port pauses between reads.
    ///
    /// The default is [`ThreadSleep`].
    pub fn sleeper<S: Sleep + 'static>(&mut self, sleeper: S) -> &mut Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Get the byte that ends every reply.
    pub fn get_prompt(&self) -> u8 {
        self.prompt
    }

    /// Get the pause between reads.
    pub fn get_poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Pause for one poll interval.
    ///
    /// A failure to sleep does not stop the caller; it is only logged.
    pub(crate) fn pause(&self, diagnostics: &Diagnostics) {
        if let Err(err) = self.sleeper.sleep(self.poll_interval) {
            diag!(diagnostics, Level::Warn, "failed to sleep between reads: {err}");
        }
    }
}

impl Default for PortOptions {
    fn default() -> Self {
        PortOptions::new()
    }
}

/// Options for configuring and opening a serial port.
///
/// ## Example
///
/// ```rust
/// # use newmark::OpenSerialOptions;
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let port = OpenSerialOptions::new()
///     .baud_rate(38_400)
///     .open("/dev/ttyUSB0")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OpenSerialOptions {
    /// The custom baud rate
    baud_rate: u32,
    /// Options for the port itself
    port: PortOptions,
}

impl OpenSerialOptions {
    /// The default baud rate of the controller: 9,600.
    pub const DEFAULT_BAUD_RATE: u32 = 9_600;

    /// Create a blank set of options ready for configuration.
    ///
    /// The default baud rate is 9,600 with 8 data bits, no parity, one stop
    /// bit and no flow control.
    ///
    /// Equivalent to [`default`](OpenSerialOptions::default).
    pub fn new() -> Self {
        OpenSerialOptions {
            baud_rate: OpenSerialOptions::DEFAULT_BAUD_RATE,
            port: PortOptions::new(),
        }
    }

    /// Set a custom baud rate.
    ///
    /// The default is 9,600.
    pub fn baud_rate(&mut self, baud_rate: u32) -> &mut Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the options for the port itself.
    ///
    /// The default is [`PortOptions::default`].
    pub fn port_options(&mut self, options: PortOptions) -> &mut Self {
        self.port = options;
        self
    }

    /// Open a [`Serial`] port at the specified path.
    fn open_serial_port(&self, path: &str) -> Result<Serial, Error> {
        sp::new(path, self.baud_rate)
            .data_bits(sp::DataBits::Eight)
            .parity(sp::Parity::None)
            .flow_control(sp::FlowControl::None)
            .stop_bits(sp::StopBits::One)
            .timeout(self.port.read_timeout)
            .open_native()
            .map(Serial)
            .map_err(Into::into)
    }

    /// Open the port at the specified path with the custom options.
    pub fn open(&self, path: &str) -> Result<Port<Serial>, Error> {
        Ok(Port::with_options(
            self.open_serial_port(path)?,
            self.port.clone(),
        ))
    }

    /// Open the port at the specified path with the custom options.
    ///
    /// The type of the underlying backend is erased via dynamic dispatch,
    /// which does have runtime overhead. [`OpenSerialOptions::open`] should
    /// generally be used instead, except when the type of the underlying
    /// backend may not be known at compile time.
    pub fn open_dyn(&self, path: &str) -> Result<Port<Box<dyn Backend + Send>>, Error> {
        Ok(Port::with_options(
            Box::new(self.open_serial_port(path)?),
            self.port.clone(),
        ))
    }
}

impl Default for OpenSerialOptions {
    fn default() -> Self {
        OpenSerialOptions::new()
    }
}

/// Options for configuring and opening a TCP port.
///
/// ## Example
///
/// ```rust
/// # use newmark::OpenTcpOptions;
/// # fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
/// let port = OpenTcpOptions::new().open("192.168.0.1:5001")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct OpenTcpOptions {
    /// Options for the port itself
    port: PortOptions,
}

impl OpenTcpOptions {
    /// Create a blank set of options ready for configuration.
    ///
    /// Equivalent to [`default`](OpenTcpOptions::default).
    pub fn new() -> Self {
        OpenTcpOptions {
            port: PortOptions::new(),
        }
    }

    /// Set the options for the port itself.
    ///
    /// The default is [`PortOptions::default`].
    pub fn port_options(&mut self, options: PortOptions) -> &mut Self {
        self.port = options;
        self
    }

    /// Open a [`TcpStream`] at the specified address.
    fn open_tcp_stream<A: ToSocketAddrs>(&self, address: A) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(address)?;
        stream.set_read_timeout(Some(self.port.read_timeout))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Open the port at the specified address with the custom options.
    pub fn open<A: ToSocketAddrs>(&self, address: A) -> Result<Port<TcpStream>, Error> {
        Ok(Port::with_options(
            self.open_tcp_stream(address)?,
            self.port.clone(),
        ))
    }

    /// Open the port at the specified address with the custom options.
    ///
    /// The type of the underlying backend is erased via dynamic dispatch,
    /// which does have runtime overhead. [`OpenTcpOptions::open`] should
    /// generally be used instead, except when the type of the underlying
    /// backend may not be known at compile time.
    pub fn open_dyn<A: ToSocketAddrs>(
        &self,
        address: A,
    ) -> Result<Port<Box<dyn Backend + Send>>, Error> {
        Ok(Port::with_options(
            Box::new(self.open_tcp_stream(address)?),
            self.port.clone(),
        ))
    }
}
