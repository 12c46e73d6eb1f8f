use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

use crate::ast::Value;
use crate::error::AniseError;

pub type LazyThunk = Box<dyn FnOnce() -> Result<Value, AniseError> + Send>;

enum LazyState {
    Pending(Option<LazyThunk>),
    Running(ThreadId),
    Done(Result<Value, AniseError>),
}

/// A deferred expression, forced at most once. The outcome is memoized,
/// errors included: forcing again re-raises the same error without
/// re-running the body.
#[derive(Clone)]
pub struct LazyHandle {
    inner: Arc<(Mutex<LazyState>, Condvar)>,
}

impl LazyHandle {
    pub fn new(thunk: LazyThunk) -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(LazyState::Pending(Some(thunk))),
                Condvar::new(),
            )),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_realized(&self) -> bool {
        matches!(*self.inner.0.lock().unwrap(), LazyState::Done(_))
    }

    pub fn force(&self) -> Result<Value, AniseError> {
        let (lock, cond) = (&self.inner.0, &self.inner.1);
        let thunk = {
            let mut state = lock.lock().unwrap();
            loop {
                match &mut *state {
                    LazyState::Done(result) => return result.clone(),
                    LazyState::Running(owner) => {
                        if *owner == thread::current().id() {
                            return Err(AniseError::application(
                                "lazy value forces itself",
                            ));
                        }
                        state = cond.wait(state).unwrap();
                    }
                    LazyState::Pending(slot) => {
                        let thunk = slot.take().ok_or_else(|| {
                            AniseError::application("lazy value in inconsistent state")
                        })?;
                        *state = LazyState::Running(thread::current().id());
                        break thunk;
                    }
                }
            }
        };
        let result = thunk();
        let mut state = lock.lock().unwrap();
        *state = LazyState::Done(result.clone());
        cond.notify_all();
        result
    }
}
