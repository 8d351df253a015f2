//! `AsyncWork<T>` — the latch returned by discovery/unpair/set-value so a
//! command handler can hand work to a background loop without blocking
//! forever. A `Mutex`/`Condvar` pair backs a handle with
//! `try_join(timeout)` semantics.

use std::sync::{Arc, Condvar, Mutex};

use gw_core::prelude::*;

struct Inner<T> {
    result: Mutex<Option<Result<T>>>,
    done: Condvar,
}

/// The consumer-facing half: awaits completion of work running elsewhere.
#[derive(Clone)]
pub struct AsyncWork<T> {
    inner: Arc<Inner<T>>,
}

/// The producer-facing half: completes the work exactly once.
pub struct AsyncWorkHandle<T> {
    inner: Arc<Inner<T>>,
}

/// Creates a linked `(AsyncWork, AsyncWorkHandle)` pair.
pub fn new_async_work<T>() -> (AsyncWork<T>, AsyncWorkHandle<T>) {
    let inner = Arc::new(Inner {
        result: Mutex::new(None),
        done: Condvar::new(),
    });
    (
        AsyncWork { inner: inner.clone() },
        AsyncWorkHandle { inner },
    )
}

impl<T> AsyncWork<T> {
    /// An already-completed work item, for managers whose operation is
    /// synchronous by construction (e.g. a command that blocks until the
    /// reply arrives before returning).
    pub fn ready(value: Result<T>) -> Self {
        let inner = Arc::new(Inner {
            result: Mutex::new(Some(value)),
            done: Condvar::new(),
        });
        Self { inner }
    }

    /// Waits up to `timeout` (`None` blocks indefinitely) for the work to
    /// complete.
    pub fn try_join(&self, timeout: Timeout) -> Result<T> {
        let guard = self.inner.result.lock().unwrap();
        let mut guard = match timeout {
            None => self.inner.done.wait_while(guard, |r| r.is_none()).unwrap(),
            Some(d) => {
                let (guard, _) = self
                    .inner
                    .done
                    .wait_timeout_while(guard, clamp_min(d), |r| r.is_none())
                    .unwrap();
                guard
            }
        };

        guard.take().unwrap_or(Err(Error::Timeout))
    }
}

impl<T> AsyncWorkHandle<T> {
    pub fn complete(self, result: Result<T>) {
        *self.inner.result.lock().unwrap() = Some(result);
        self.inner.done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_returns_immediately() {
        let work: AsyncWork<i32> = AsyncWork::ready(Ok(42));
        assert_eq!(work.try_join(None).unwrap(), 42);
    }

    #[test]
    fn completes_from_another_thread() {
        let (work, handle) = new_async_work::<i32>();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            handle.complete(Ok(7));
        });
        assert_eq!(work.try_join(None).unwrap(), 7);
    }

    #[test]
    fn join_times_out() {
        let (work, _handle) = new_async_work::<i32>();
        assert!(matches!(
            work.try_join(Some(std::time::Duration::from_millis(10))),
            Err(Error::Timeout)
        ));
    }
}
