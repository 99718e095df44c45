//! Request coalescing ("single flight").
//!
//! [`SingleFlight`] makes sure that, for any key, at most one operation is
//! running at a time. Callers that arrive while an operation for their key is
//! in flight block until it finishes and receive a clone of its result
//! instead of running the operation themselves.
//!
//! ## Generations
//!
//! ```text
//!   caller A ──► work("Tom") ──► registers call ──► runs op ──► result ─┐
//!   caller B ──► work("Tom") ──► finds call ──► waits ──────────────────┤
//!   caller C ──► work("Tom") ──► finds call ──► waits ──────────────────┤
//!                                                                       ▼
//!                                             call removed, A/B/C get same result
//!
//!   caller D ──► work("Tom") (later) ──► new generation, op runs again
//! ```
//!
//! The table lock is only held to look up, insert or remove a call record.
//! It is never held while the operation runs or while a caller waits.
//!
//! If the operation panics, the record is dropped and the waiting callers
//! start a new generation rather than blocking forever.
//!
//! ## Example Usage
//!
//! ```
//! use peercache::singleflight::SingleFlight;
//!
//! let flight: SingleFlight<String, String> = SingleFlight::new();
//! let value = flight.work("Tom", || Ok("630".to_string()));
//! assert_eq!(value, Ok("630".to_string()));
//! assert_eq!(flight.in_flight(), 0);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

enum CallState<T, E> {
    Pending,
    Done(Result<T, E>),
    Abandoned,
}

/// One in-flight operation shared by every caller of its generation.
struct Call<T, E> {
    state: Mutex<CallState<T, E>>,
    done: Condvar,
}

impl<T: Clone, E: Clone> Call<T, E> {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState::Pending),
            done: Condvar::new(),
        }
    }

    /// Blocks until the leader finishes. `None` means the leader unwound.
    fn wait(&self) -> Option<Result<T, E>> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                CallState::Pending => self.done.wait(&mut state),
                CallState::Done(result) => return Some(result.clone()),
                CallState::Abandoned => return None,
            }
        }
    }

    fn finish(&self, state: CallState<T, E>) {
        *self.state.lock() = state;
        self.done.notify_all();
    }
}

/// Deduplicates concurrent operations by key.
pub struct SingleFlight<T, E> {
    calls: Mutex<HashMap<String, Arc<Call<T, E>>>>,
}

impl<T: Clone, E: Clone> SingleFlight<T, E> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `op` for `key` unless an operation for `key` is already in
    /// flight, in which case this waits for and returns that result.
    ///
    /// `op` runs on the calling thread. Errors are shared with every waiter
    /// of the same generation but are not remembered afterwards.
    pub fn work<F>(&self, key: &str, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        loop {
            let mut calls = self.calls.lock();
            if let Some(call) = calls.get(key).map(Arc::clone) {
                drop(calls);
                match call.wait() {
                    Some(result) => return result,
                    None => continue,
                }
            }

            let call = Arc::new(Call::new());
            calls.insert(key.to_owned(), Arc::clone(&call));
            drop(calls);

            let mut leader = Leader {
                flight: self,
                key,
                call: &call,
                finished: false,
            };
            let result = op();
            leader.complete(result.clone());
            return result;
        }
    }

    /// Returns the number of keys with an operation currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn forget(&self, key: &str, call: &Arc<Call<T, E>>) {
        let mut calls = self.calls.lock();
        if calls.get(key).is_some_and(|current| Arc::ptr_eq(current, call)) {
            calls.remove(key);
        }
    }
}

impl<T: Clone, E: Clone> Default for SingleFlight<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for SingleFlight<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.calls.lock().len())
            .finish()
    }
}

/// Completes the call of the caller that runs the operation. Dropped without
/// `complete` only when the operation unwinds.
struct Leader<'a, T: Clone, E: Clone> {
    flight: &'a SingleFlight<T, E>,
    key: &'a str,
    call: &'a Arc<Call<T, E>>,
    finished: bool,
}

impl<T: Clone, E: Clone> Leader<'_, T, E> {
    fn complete(&mut self, result: Result<T, E>) {
        self.finished = true;
        // Publish the result before unregistering the call.
        *self.call.state.lock() = CallState::Done(result);
        self.flight.forget(self.key, self.call);
        self.call.done.notify_all();
    }
}

impl<T: Clone, E: Clone> Drop for Leader<'_, T, E> {
    fn drop(&mut self) {
        if !self.finished {
            self.flight.forget(self.key, self.call);
            self.call.finish(CallState::Abandoned);
        }
    }
}
