//! SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Every critical section in this crate leaves its state consistent before it
/// can panic, so a poisoned lock is still safe to use.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
