//! A "scope guard" that will reset a connection's read timeout when it goes out of scope.

use crate::backend::Backend;
use std::{io, marker::PhantomData, time::Duration};

/// A connection, as required by the [`TimeoutGuard`].
pub trait Link<B>: private::Sealed {
    /// Get the underlying backend.
    #[doc(hidden)]
    fn backend_mut(&mut self) -> &mut B;
    /// Poison the connection.
    #[doc(hidden)]
    fn poison(&mut self, e: io::Error);
}

mod private {
    /// Marks a trait a sealed.
    pub trait Sealed {}
    impl<B> Sealed for crate::port::Connection<B> {}
}

/// A "scope guard" that will update the connection's read timeout and then
/// reset it when it goes out of scope.
///
/// Each command exchange puts the backend into short-read mode with a guard,
/// so that a read returns promptly when no data is available, regardless of
/// the timeout the backend was opened with.
///
/// While the guard is in scope, the connection can only be accessed through
/// the guard. However, because the guard implements [`Deref`](std::ops::Deref)
/// and [`DerefMut`](std::ops::DerefMut) callers can treat the guard as the
/// connection.
///
/// If the original timeout cannot be restored the connection is poisoned, and
/// the error is reported by the next attempt to use it.
#[derive(Debug)]
pub struct TimeoutGuard<'a, B: Backend, L: Link<B>> {
    /// The underlying connection.
    link: &'a mut L,
    /// The original timeout that will be restored when the guard is dropped.
    original_timeout: Option<Duration>,
    backend_marker: PhantomData<B>,
}

impl<'a, B: Backend, L: Link<B>> TimeoutGuard<'a, B, L> {
    /// Update the connection's timeout and return a [`TimeoutGuard`] wrapping it.
    pub(crate) fn new(link: &'a mut L, timeout: Option<Duration>) -> Result<Self, io::Error> {
        let backend = link.backend_mut();
        let original_timeout = backend.read_timeout()?;
        backend.set_read_timeout(timeout)?;
        Ok(TimeoutGuard {
            link,
            original_timeout,
            backend_marker: PhantomData,
        })
    }
}

impl<B: Backend, L: Link<B>> std::ops::Deref for TimeoutGuard<'_, B, L> {
    type Target = L;
    /// Get a shared reference to the underlying connection.
    fn deref(&self) -> &Self::Target {
        self.link
    }
}

impl<B: Backend, L: Link<B>> std::ops::DerefMut for TimeoutGuard<'_, B, L> {
    /// Get an exclusive reference to the underlying connection.
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.link
    }
}

impl<B: Backend, L: Link<B>> std::ops::Drop for TimeoutGuard<'_, B, L> {
    fn drop(&mut self) {
        if let Err(err) = self
            .link
            .backend_mut()
            .set_read_timeout(self.original_timeout)
        {
            self.link.poison(io::Error::new(
                io::ErrorKind::Other,
                if let Some(timeout) = self.original_timeout {
                    format!(
                        "failed to reset read timeout to {} ms: {}",
                        timeout.as_millis(),
                        err
                    )
                } else {
                    format!("failed to reset to an infinite read timeout: {err}")
                },
            ));
        }
    }
}
