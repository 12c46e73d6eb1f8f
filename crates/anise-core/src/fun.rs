use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::ast::{FnArity, Value};
use crate::env::{self, EnvRef};
use crate::error::AniseError;
use crate::eval::{Evaluator, Flow};
use crate::printer;
use crate::types::TypeRegistry;

pub type NativeImpl =
    Arc<dyn Fn(&Evaluator, &[Value], &EnvRef) -> Result<Value, AniseError> + Send + Sync>;

/// Host primitive. Never tail-call eligible.
pub struct NativeFn {
    pub name: String,
    pub arity: FnArity,
    pub pure: bool,
    f: NativeImpl,
}

/// Interpreted closure. Also the representation of macros, which differ
/// only in receiving their call forms unevaluated.
pub struct CompoundFn {
    pub name: String,
    pub params: Vec<String>,
    pub variadic: bool,
    pub body: Vec<Value>,
    pub env: EnvRef,
    pub arity: FnArity,
    pub is_macro: bool,
    /// `Some(n)` marks a hash-lambda whose body mentions placeholders up
    /// to `%n`.
    pub placeholder_max: Option<usize>,
}

pub struct PartialFn {
    pub inner: Func,
    pub bound: Vec<Value>,
}

/// Caches by the printed argument list. Unbounded, no eviction.
pub struct MemoizedFn {
    pub inner: Func,
    cache: Mutex<HashMap<String, Value>>,
}

/// Multiple dispatch on the runtime type of the anchor argument, with a
/// mandatory fallback.
pub struct GenericFn {
    pub name: String,
    pub anchor: usize,
    pub fallback: Func,
    pub arity: FnArity,
    table: RwLock<HashMap<u32, Func>>,
}

#[derive(Clone)]
pub enum Func {
    Native(Arc<NativeFn>),
    Compound(Arc<CompoundFn>),
    Partial(Arc<PartialFn>),
    Memoized(Arc<MemoizedFn>),
    Generic(Arc<GenericFn>),
}

fn name_is_impure(name: &str) -> bool {
    name.ends_with('!')
}

impl Func {
    pub fn native<F>(name: &str, arity: FnArity, f: F) -> Func
    where
        F: Fn(&Evaluator, &[Value], &EnvRef) -> Result<Value, AniseError>
            + Send
            + Sync
            + 'static,
    {
        Func::Native(Arc::new(NativeFn {
            name: name.to_string(),
            arity,
            pure: !name_is_impure(name),
            f: Arc::new(f),
        }))
    }

    pub fn compound(fun: CompoundFn) -> Func {
        Func::Compound(Arc::new(fun))
    }

    pub fn partial(inner: Func, bound: Vec<Value>) -> Func {
        Func::Partial(Arc::new(PartialFn { inner, bound }))
    }

    pub fn memoized(inner: Func) -> Func {
        Func::Memoized(Arc::new(MemoizedFn {
            inner,
            cache: Mutex::new(HashMap::new()),
        }))
    }

    pub fn generic(name: &str, anchor: usize, fallback: Func) -> Func {
        let arity = fallback.arity();
        Func::Generic(Arc::new(GenericFn {
            name: name.to_string(),
            anchor,
            fallback,
            arity,
            table: RwLock::new(HashMap::new()),
        }))
    }

    pub fn name(&self) -> String {
        match self {
            Func::Native(f) => f.name.clone(),
            Func::Compound(f) => f.name.clone(),
            Func::Partial(f) => format!("partial of {}", f.inner.name()),
            Func::Memoized(f) => f.inner.name(),
            Func::Generic(f) => f.name.clone(),
        }
    }

    pub fn arity(&self) -> FnArity {
        match self {
            Func::Native(f) => f.arity,
            Func::Compound(f) => f.arity,
            Func::Partial(f) => {
                let inner = f.inner.arity();
                let min = inner.min().saturating_sub(f.bound.len());
                let max = inner.max().map(|m| m.saturating_sub(f.bound.len()));
                FnArity::new(min, max)
            }
            Func::Memoized(f) => f.inner.arity(),
            Func::Generic(f) => f.arity,
        }
    }

    pub fn is_macro(&self) -> bool {
        matches!(self, Func::Compound(f) if f.is_macro)
    }

    /// Impure functions (named with a `!` suffix, or impure natives) force
    /// eager argument evaluation and are never elided by the optimizer.
    pub fn is_pure(&self) -> bool {
        match self {
            Func::Native(f) => f.pure,
            Func::Compound(f) => !name_is_impure(&f.name),
            Func::Partial(f) => f.inner.is_pure(),
            Func::Memoized(f) => f.inner.is_pure(),
            Func::Generic(f) => !name_is_impure(&f.name),
        }
    }

    /// Identity. This is what the trampoline compares when deciding
    /// whether a call in tail position loops instead of recursing.
    pub fn ptr_eq(&self, other: &Func) -> bool {
        match (self, other) {
            (Func::Native(a), Func::Native(b)) => Arc::ptr_eq(a, b),
            (Func::Compound(a), Func::Compound(b)) => Arc::ptr_eq(a, b),
            (Func::Partial(a), Func::Partial(b)) => Arc::ptr_eq(a, b),
            (Func::Memoized(a), Func::Memoized(b)) => Arc::ptr_eq(a, b),
            (Func::Generic(a), Func::Generic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn call(
        &self,
        evaluator: &Evaluator,
        args: &[Value],
        caller: &EnvRef,
    ) -> Result<Value, AniseError> {
        match self {
            Func::Native(f) => {
                f.arity.check(&f.name, args.len())?;
                (f.f)(evaluator, args, caller)
            }
            Func::Compound(f) => call_compound(f, evaluator, args, caller),
            Func::Partial(f) => {
                let mut full = f.bound.clone();
                full.extend_from_slice(args);
                f.inner.call(evaluator, &full, caller)
            }
            Func::Memoized(f) => {
                let key = printer::print_args(args);
                if let Some(hit) = f.cache.lock().unwrap().get(&key) {
                    return Ok(hit.clone());
                }
                let result = f.inner.call(evaluator, args, caller)?;
                f.cache
                    .lock()
                    .unwrap()
                    .insert(key, result.clone());
                Ok(result)
            }
            Func::Generic(f) => {
                f.arity.check(&f.name, args.len())?;
                let target = f.resolve(args);
                target.call(evaluator, args, caller)
            }
        }
    }
}

impl GenericFn {
    pub fn resolve(&self, args: &[Value]) -> Func {
        let anchor = args.get(self.anchor);
        let id = anchor.map(TypeRegistry::id_of);
        let table = self.table.read().unwrap();
        id.and_then(|id| table.get(&id).cloned())
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Registers an implementation for one type tag. Registering the same
    /// tag twice is an error.
    pub fn add_implementation(&self, type_id: u32, f: Func) -> Result<(), AniseError> {
        let mut table = self.table.write().unwrap();
        if table.contains_key(&type_id) {
            return Err(AniseError::reimplementation(format!(
                "{} already has an implementation for this type",
                self.name
            )));
        }
        table.insert(type_id, f);
        Ok(())
    }
}

/// The trampoline. A body that ends in a self-call yields
/// `Flow::TailCall` and this loop rebinds the parameters instead of
/// recursing, so iteration depth never grows the host stack.
fn call_compound(
    f: &Arc<CompoundFn>,
    evaluator: &Evaluator,
    args: &[Value],
    caller: &EnvRef,
) -> Result<Value, AniseError> {
    let mut current: Vec<Value> = args.to_vec();
    loop {
        f.arity.check(&f.name, current.len())?;
        let frame = match f.placeholder_max {
            Some(highest) => env::bind_placeholders(&f.env, caller, highest, &current)?,
            None => env::bind_parameters(&f.env, caller, &f.params, f.variadic, &current)?,
        };
        match evaluator.eval_body(&f.body, &frame)? {
            Flow::Value(v) => return Ok(v),
            Flow::TailCall(next) => current = next,
        }
    }
}
