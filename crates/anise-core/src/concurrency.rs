use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};

use crate::ast::{ErrObj, Value};
use crate::error::AniseError;

/// The polling sentinel interpreted code sees while the worker is still
/// running.
pub const NOT_READY: &str = "not-ready";

struct DelayShared {
    rx: Receiver<Value>,
    cell: Mutex<Option<Value>>,
}

/// A value being computed on a background thread. The worker starts
/// immediately; the handle memoizes the first received result. A failing
/// worker produces an Error value, it never propagates as a host error.
#[derive(Clone)]
pub struct DelayHandle {
    inner: Arc<DelayShared>,
}

impl DelayHandle {
    pub fn spawn<F>(job: F) -> Self
    where
        F: FnOnce() -> Result<Value, AniseError> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        thread::spawn(move || {
            let value = match job() {
                Ok(v) => v,
                Err(e) => Value::Error(Arc::new(ErrObj {
                    message: e.message().to_string(),
                    info: e.info_tag(),
                    trace: e.trace().to_vec(),
                })),
            };
            let _ = tx.send(value);
        });
        Self {
            inner: Arc::new(DelayShared {
                rx,
                cell: Mutex::new(None),
            }),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_realized(&self) -> bool {
        self.inner.cell.lock().unwrap().is_some()
    }

    fn store(&self, value: Value) -> Value {
        let mut cell = self.inner.cell.lock().unwrap();
        if cell.is_none() {
            *cell = Some(value);
        }
        cell.clone().unwrap_or(Value::Nothing)
    }

    fn worker_lost() -> Value {
        Value::Error(Arc::new(ErrObj {
            message: "delay worker terminated abnormally".to_string(),
            info: Value::symbol("runtime-error"),
            trace: Vec::new(),
        }))
    }

    /// Non-blocking check: the result if it arrived, `:not-ready` while
    /// the worker is still running.
    pub fn poll(&self) -> Value {
        if let Some(value) = self.inner.cell.lock().unwrap().clone() {
            return value;
        }
        match self.inner.rx.try_recv() {
            Ok(value) => self.store(value),
            Err(TryRecvError::Empty) => Value::keyword(NOT_READY),
            Err(TryRecvError::Disconnected) => self.store(Self::worker_lost()),
        }
    }

    /// Blocks until the worker finishes.
    pub fn wait(&self) -> Value {
        if let Some(value) = self.inner.cell.lock().unwrap().clone() {
            return value;
        }
        match self.inner.rx.recv() {
            Ok(value) => self.store(value),
            Err(_) => self.store(Self::worker_lost()),
        }
    }

    /// Blocks up to `millis`. On timeout the result is whatever the worker
    /// has produced so far, which is `Nothing` while it is still running.
    pub fn wait_timeout(&self, millis: u64) -> Value {
        if let Some(value) = self.inner.cell.lock().unwrap().clone() {
            return value;
        }
        match self.inner.rx.recv_timeout(Duration::from_millis(millis)) {
            Ok(value) => self.store(value),
            Err(RecvTimeoutError::Timeout) => Value::Nothing,
            Err(RecvTimeoutError::Disconnected) => self.store(Self::worker_lost()),
        }
    }
}
