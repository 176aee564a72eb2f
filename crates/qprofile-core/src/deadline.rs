//! Caller-supplied time bound for store and index calls.
//!
//! Every collaborator call receives the `Deadline` of the request that issued
//! it. In-memory collaborators wait for their locks with a bounded `try_*`
//! loop; the redb store checks the deadline around its transactions.

use crate::error::{QProfileError, Result};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};
use std::time::{Duration, Instant};

/// Upper bound between two lock attempts.
const LOCK_POLL: Duration = Duration::from_micros(250);

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    timeout: Duration,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
        }
    }

    /// A deadline that never expires. Used by startup paths with no caller.
    pub fn unbounded() -> Self {
        Self::after(Duration::MAX)
    }

    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.timeout
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.started.elapsed())
    }

    /// Fail with `Timeout` naming `operation` once the deadline has passed.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_expired() {
            return Err(QProfileError::timeout(operation));
        }
        Ok(())
    }

    fn pause(&self) {
        std::thread::sleep(self.remaining().min(LOCK_POLL));
    }
}

/// Acquire a read guard, giving up with `Timeout` when the deadline passes.
/// An already expired deadline fails even if the lock is free.
///
/// A poisoned lock is recovered: the guarded maps hold plain data and each
/// writer leaves them consistent before any point that can panic.
pub(crate) fn read_within<'a, T>(
    lock: &'a RwLock<T>,
    deadline: &Deadline,
    operation: &str,
) -> Result<RwLockReadGuard<'a, T>> {
    deadline.check(operation)?;
    loop {
        match lock.try_read() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                deadline.check(operation)?;
                deadline.pause();
            }
        }
    }
}

/// Write-side counterpart of [`read_within`].
pub(crate) fn write_within<'a, T>(
    lock: &'a RwLock<T>,
    deadline: &Deadline,
    operation: &str,
) -> Result<RwLockWriteGuard<'a, T>> {
    deadline.check(operation)?;
    loop {
        match lock.try_write() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                deadline.check(operation)?;
                deadline.pause();
            }
        }
    }
}
