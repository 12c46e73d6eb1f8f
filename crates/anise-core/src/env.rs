use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use crate::ast::Value;
use crate::error::AniseError;
use crate::seq::ListHandle;

pub type EnvRef = Arc<RwLock<Env>>;

/// Highest hash-lambda placeholder index (`%1` .. `%15`).
pub const MAX_PLACEHOLDER: usize = 15;

/// A binding frame. Lookup order is local, then `parent0` (definition
/// scope), then `parent1` (call-site scope), then the enclosing module
/// frame. Module frames carry their own name and keep `next_module`
/// pointing at themselves, which terminates the fallback chain.
pub struct Env {
    values: HashMap<String, Value>,
    parent0: Option<EnvRef>,
    parent1: Option<EnvRef>,
    next_module: Option<Weak<RwLock<Env>>>,
    pub module_name: Option<String>,
    pub exports: Vec<String>,
}

impl Env {
    fn new(parent0: Option<EnvRef>, parent1: Option<EnvRef>) -> Env {
        Env {
            values: HashMap::new(),
            parent0,
            parent1,
            next_module: None,
            module_name: None,
            exports: Vec::new(),
        }
    }

    /// The global frame. It is its own module frame, so the fallback chain
    /// always bottoms out here.
    pub fn new_global(name: &str) -> EnvRef {
        let env = Arc::new(RwLock::new(Env::new(None, None)));
        {
            let mut guard = env.write().unwrap();
            guard.module_name = Some(name.to_string());
            guard.next_module = Some(Arc::downgrade(&env));
        }
        env
    }

    /// A fresh module frame chained to the global frame.
    pub fn new_module(name: &str, global: &EnvRef) -> EnvRef {
        let env = Arc::new(RwLock::new(Env::new(Some(global.clone()), None)));
        {
            let mut guard = env.write().unwrap();
            guard.module_name = Some(name.to_string());
            guard.next_module = Some(Arc::downgrade(&env));
        }
        env
    }

    /// A lexical child frame. Inherits the parent's module link.
    pub fn child(parent: &EnvRef) -> EnvRef {
        let next_module = parent.read().unwrap().next_module.clone();
        let env = Arc::new(RwLock::new(Env::new(Some(parent.clone()), None)));
        env.write().unwrap().next_module = next_module;
        env
    }

    /// A call frame: `parent0` is the closure's definition scope,
    /// `parent1` the call site.
    pub fn call_frame(definition: &EnvRef, caller: &EnvRef) -> EnvRef {
        let next_module = definition.read().unwrap().next_module.clone();
        let env = Arc::new(RwLock::new(Env::new(
            Some(definition.clone()),
            Some(caller.clone()),
        )));
        env.write().unwrap().next_module = next_module;
        env
    }

    pub fn is_module_frame(&self) -> bool {
        self.module_name.is_some()
    }
}

pub fn lookup(env: &EnvRef, name: &str) -> Option<Value> {
    let (p0, p1, nm) = {
        let guard = env.read().unwrap();
        if let Some(v) = guard.values.get(name) {
            return Some(v.clone());
        }
        (
            guard.parent0.clone(),
            guard.parent1.clone(),
            guard.next_module.clone(),
        )
    };
    if let Some(p) = p0 {
        if let Some(v) = lookup(&p, name) {
            return Some(v);
        }
    }
    if let Some(p) = p1 {
        if let Some(v) = lookup(&p, name) {
            return Some(v);
        }
    }
    if let Some(weak) = nm {
        if let Some(module) = weak.upgrade() {
            if !Arc::ptr_eq(&module, env) {
                return lookup(&module, name);
            }
        }
    }
    None
}

/// Defines into the immediate frame. Redefinition in the same frame is an
/// error; shadowing in a child frame is not. `_` is silently discarded.
pub fn define(env: &EnvRef, name: &str, value: Value) -> Result<(), AniseError> {
    define_impl(env, name, value, true)
}

/// Definition path used by alias imports; skips the module export list.
pub fn define_no_export(env: &EnvRef, name: &str, value: Value) -> Result<(), AniseError> {
    define_impl(env, name, value, false)
}

fn define_impl(env: &EnvRef, name: &str, value: Value, export: bool) -> Result<(), AniseError> {
    if name == "_" {
        return Ok(());
    }
    let mut guard = env.write().unwrap();
    if guard.values.contains_key(name) {
        return Err(AniseError::already_defined(name));
    }
    if export && guard.is_module_frame() {
        guard.exports.push(name.to_string());
    }
    guard.values.insert(name.to_string(), value);
    Ok(())
}

/// `true` if the name is bound in this frame, ignoring parents.
pub fn bound_locally(env: &EnvRef, name: &str) -> bool {
    env.read().unwrap().values.contains_key(name)
}

/// The module frame enclosing `env`. `define` hoists there.
pub fn nearest_module(env: &EnvRef) -> EnvRef {
    let weak = env.read().unwrap().next_module.clone();
    weak.and_then(|w| w.upgrade()).unwrap_or_else(|| env.clone())
}

/// Binds a parameter list into a fresh call frame. With `variadic`, the
/// last parameter collects the remaining arguments as a list.
pub fn bind_parameters(
    definition: &EnvRef,
    caller: &EnvRef,
    params: &[String],
    variadic: bool,
    args: &[Value],
) -> Result<EnvRef, AniseError> {
    let frame = Env::call_frame(definition, caller);
    let fixed = if variadic { params.len() - 1 } else { params.len() };
    for (param, arg) in params.iter().take(fixed).zip(args.iter()) {
        define_no_export(&frame, param, arg.clone())?;
    }
    if variadic {
        let rest: Vec<Value> = args.iter().skip(fixed).cloned().collect();
        define_no_export(
            &frame,
            &params[fixed],
            Value::List(ListHandle::from_vec(rest)),
        )?;
    }
    Ok(frame)
}

/// Binds hash-lambda placeholders: `%1`..`%15` positionally (`Nothing`
/// when no argument was given), `%&` the arguments past the highest
/// placeholder the body mentions, `%*` the full argument list.
pub fn bind_placeholders(
    definition: &EnvRef,
    caller: &EnvRef,
    highest: usize,
    args: &[Value],
) -> Result<EnvRef, AniseError> {
    let frame = Env::call_frame(definition, caller);
    for i in 1..=MAX_PLACEHOLDER {
        let value = args.get(i - 1).cloned().unwrap_or(Value::Nothing);
        define_no_export(&frame, &format!("%{}", i), value)?;
    }
    // `%` is shorthand for `%1`
    define_no_export(
        &frame,
        "%",
        args.first().cloned().unwrap_or(Value::Nothing),
    )?;
    let rest: Vec<Value> = args.iter().skip(highest).cloned().collect();
    define_no_export(&frame, "%&", Value::List(ListHandle::from_vec(rest)))?;
    define_no_export(
        &frame,
        "%*",
        Value::List(ListHandle::from_vec(args.to_vec())),
    )?;
    Ok(frame)
}
