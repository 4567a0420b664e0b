//! Traits to access a connection through different sharing mechanisms.
//!
//! A [`Port`](crate::Port) never owns its connection outright; it holds a
//! [`SharedMut`] handle so that several callers can issue commands against the
//! same physical device. Each command acquires the lock for exactly the
//! duration of its exchange with the controller.

use crate::error::{LockError, LockPoisonedError, LockUnavailableError};
use std::{
	cell::{RefCell, RefMut},
	ops::DerefMut,
	rc::Rc,
	sync::{Arc, Mutex, MutexGuard},
};

/// Any type that can be mutably shared, either within a thread or across threads.
///
/// Dropping the guard releases the lock.
pub trait SharedMut<T>: Clone {
	/// The type protecting the shared resource
	type GuardMut<'g>: DerefMut<Target = T>
	where
		Self: 'g;

	/// Create a new instance of the shared type in the unlocked state.
	fn new(value: T) -> Self;
	/// Try to lock the underlying resource without blocking.
	fn try_lock_mut(&self) -> Result<Self::GuardMut<'_>, LockError>;
	/// Lock the underlying resource.
	///
	/// In multithreaded contexts, this will block the current thread until the
	/// resource is available.
	fn lock_mut(&self) -> Result<Self::GuardMut<'_>, LockError>;
	/// Consume the shared value and return it if there are no other shared references to it.
	/// If there are other references, `None` is returned and the value is dropped.
	fn into_inner(this: Self) -> Option<T>;
}

impl<T> SharedMut<T> for Rc<RefCell<T>> {
	type GuardMut<'g> = RefMut<'g, T> where Self: 'g;

	fn new(value: T) -> Self {
		Rc::new(RefCell::new(value))
	}
	fn try_lock_mut(&self) -> Result<Self::GuardMut<'_>, LockError> {
		self.try_borrow_mut()
			.map_err(|_| LockUnavailableError.into())
	}
	fn lock_mut(&self) -> Result<Self::GuardMut<'_>, LockError> {
		// There is no other thread to wait for, so a held borrow can never be released.
		self.try_lock_mut()
	}
	fn into_inner(this: Self) -> Option<T> {
		Rc::into_inner(this).map(RefCell::into_inner)
	}
}

impl<T> SharedMut<T> for Arc<Mutex<T>> {
	type GuardMut<'g> = MutexGuard<'g, T> where Self: 'g;

	fn new(value: T) -> Self {
		Arc::new(Mutex::new(value))
	}
	fn try_lock_mut(&self) -> Result<Self::GuardMut<'_>, LockError> {
		use std::sync::TryLockError;
		Mutex::try_lock(self).map_err(|err| match err {
			TryLockError::Poisoned(_) => LockPoisonedError.into(),
			TryLockError::WouldBlock => LockUnavailableError.into(),
		})
	}
	fn lock_mut(&self) -> Result<Self::GuardMut<'_>, LockError> {
		Mutex::lock(self).map_err(|_| LockPoisonedError.into())
	}
	fn into_inner(this: Self) -> Option<T> {
		Arc::into_inner(this).and_then(|mutex| Mutex::into_inner(mutex).ok())
	}
}
