use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::ast::{ErrObj, FnArity, RecordValue, Value};
use crate::builtins;
use crate::concurrency::DelayHandle;
use crate::env::{self, Env, EnvRef};
use crate::error::AniseError;
use crate::fun::{CompoundFn, Func};
use crate::lazy::LazyHandle;
use crate::reader;
use crate::seq::ListHandle;
use crate::types::TypeRegistry;

/// The module the bootstrap populates; its exports are not namespaced.
pub const CORE_MODULE: &str = "anise.core";

/// Recursion budget for non-tail calls. Exceeding it is fatal.
const MAX_DEPTH: usize = 4096;

/// Result of evaluating an expression in tail position. A self-call in
/// tail position does not recurse; it surfaces here and the calling
/// trampoline rebinds. The strict entry point `eval` never returns
/// `TailCall`.
pub enum Flow {
    Value(Value),
    TailCall(Vec<Value>),
}

/// The interpreter. Owns all process-wide state: the global frame, the
/// module registry, the type registry and the gensym counter. Tests build
/// isolated instances; nothing lives in statics.
pub struct Evaluator {
    global: EnvRef,
    modules: Arc<RwLock<HashMap<String, EnvRef>>>,
    types: Arc<RwLock<TypeRegistry>>,
    gensym: Arc<AtomicU64>,
    recur: Func,
    call_stack: RefCell<Vec<Func>>,
    depth: Cell<usize>,
    macro_depth: Cell<usize>,
    aggressive: Cell<bool>,
}

const SPECIAL_FORMS: &[&str] = &[
    "if",
    "cond",
    "lambda",
    "hash-lambda",
    "define",
    "def-macro",
    "def-generic",
    "def-type",
    "let",
    "let*",
    "quote",
    "quasiquote",
    "unquote",
    "unquote-splicing",
    "module",
    "import",
    "try*",
    "catch",
    "lazy",
    "lazy-seq",
    "delay",
];

pub fn is_special_form(name: &str) -> bool {
    SPECIAL_FORMS.contains(&name)
}

struct StackGuard<'a> {
    stack: &'a RefCell<Vec<Func>>,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

impl Evaluator {
    pub fn new() -> Result<Evaluator, AniseError> {
        let global = Env::new_global(CORE_MODULE);
        let evaluator = Evaluator {
            global: global.clone(),
            modules: Arc::new(RwLock::new(HashMap::new())),
            types: Arc::new(RwLock::new(TypeRegistry::new())),
            gensym: Arc::new(AtomicU64::new(0)),
            recur: Func::native("recur", FnArity::at_least(0), |_, _, _| {
                Err(AniseError::syntax("recur outside of tail position"))
            }),
            call_stack: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            macro_depth: Cell::new(0),
            aggressive: Cell::new(false),
        };
        evaluator
            .modules
            .write()
            .unwrap()
            .insert(CORE_MODULE.to_string(), global);
        evaluator.install_reserved()?;
        builtins::install(&evaluator)?;
        Ok(evaluator)
    }

    /// A sibling evaluator for a background worker. Shares the global
    /// frame, modules, types and gensym counter; gets its own call stack
    /// and depth budget.
    pub fn worker_clone(&self) -> Evaluator {
        Evaluator {
            global: self.global.clone(),
            modules: self.modules.clone(),
            types: self.types.clone(),
            gensym: self.gensym.clone(),
            recur: self.recur.clone(),
            call_stack: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            macro_depth: Cell::new(0),
            aggressive: Cell::new(self.aggressive.get()),
        }
    }

    fn install_reserved(&self) -> Result<(), AniseError> {
        for name in SPECIAL_FORMS {
            let reserved = *name;
            let guard = Func::native(reserved, FnArity::at_least(0), move |_, _, _| {
                Err(AniseError::syntax(format!(
                    "{} is a reserved symbol and cannot be called as a function",
                    reserved
                )))
            });
            env::define(&self.global, name, Value::Function(guard))?;
        }
        env::define(&self.global, "recur", Value::Function(self.recur.clone()))?;
        Ok(())
    }

    pub fn global_env(&self) -> EnvRef {
        self.global.clone()
    }

    pub fn types(&self) -> Arc<RwLock<TypeRegistry>> {
        self.types.clone()
    }

    pub fn gensym_next(&self) -> Value {
        let n = self.gensym.fetch_add(1, Ordering::SeqCst);
        Value::symbol(format!("G__{}", n))
    }

    pub fn set_aggressive_optimization(&self, on: bool) {
        self.aggressive.set(on);
    }

    fn stack_snapshot(&self) -> Vec<String> {
        self.call_stack.borrow().iter().map(Func::name).collect()
    }

    fn push_call(&self, f: Func) -> StackGuard<'_> {
        self.call_stack.borrow_mut().push(f);
        StackGuard {
            stack: &self.call_stack,
        }
    }

    fn enter(&self) -> Result<DepthGuard<'_>, AniseError> {
        let d = self.depth.get();
        if d >= MAX_DEPTH {
            return Err(
                AniseError::stack_overflow("recursion budget exhausted")
                    .with_trace(self.stack_snapshot()),
            );
        }
        self.depth.set(d + 1);
        Ok(DepthGuard { depth: &self.depth })
    }

    /// Strict evaluation. Never observes the tail-call signal.
    pub fn eval(&self, expr: &Value, env: &EnvRef) -> Result<Value, AniseError> {
        match self.eval_flow(expr, env, false)? {
            Flow::Value(v) => Ok(v),
            Flow::TailCall(_) => Err(AniseError::syntax(
                "recur outside of tail position",
            )),
        }
    }

    /// Reads and evaluates every form in `source` against the global
    /// frame, returning the last result.
    pub fn eval_source(&self, source: &str) -> Result<Value, AniseError> {
        let forms = reader::read_source(source)?;
        let mut last = Value::Nothing;
        for form in &forms {
            last = self.eval(form, &self.global)?;
        }
        Ok(last)
    }

    /// Function-body evaluation: everything but the last form is strict,
    /// the last form is in tail position.
    pub fn eval_body(&self, body: &[Value], env: &EnvRef) -> Result<Flow, AniseError> {
        self.eval_do(body, env, true)
    }

    fn eval_do(&self, forms: &[Value], env: &EnvRef, tail: bool) -> Result<Flow, AniseError> {
        let Some((last, init)) = forms.split_last() else {
            return Ok(Flow::Value(Value::Nothing));
        };
        for form in init {
            if self.aggressive.get() && self.expr_is_pure(form, env) {
                continue;
            }
            self.eval(form, env)?;
        }
        self.eval_flow(last, env, tail)
    }

    /// A non-final body expression whose evaluation cannot be observed.
    /// Only consulted by the aggressive optimization path.
    fn expr_is_pure(&self, expr: &Value, env: &EnvRef) -> bool {
        match expr {
            Value::List(list) => {
                if list.is_definitely_empty() {
                    return true;
                }
                let Ok(head) = list.head() else { return false };
                let Some(name) = head.as_symbol() else { return false };
                if is_special_form(name) {
                    return name == "quote";
                }
                match env::lookup(env, name) {
                    Some(Value::Function(f)) if f.is_pure() && !f.is_macro() => list
                        .iter()
                        .skip(1)
                        .all(|item| matches!(item, Ok(v) if self.expr_is_pure(&v, env))),
                    _ => false,
                }
            }
            _ => true,
        }
    }

    fn eval_flow(&self, expr: &Value, env: &EnvRef, tail: bool) -> Result<Flow, AniseError> {
        let _depth = self.enter()?;
        match expr {
            Value::Symbol(s) => Ok(Flow::Value(self.eval_symbol(s, env)?)),
            Value::List(list) => {
                if list.is_definitely_empty() {
                    return Ok(Flow::Value(expr.clone()));
                }
                let head = list.head()?;
                if let Some(name) = head.as_symbol() {
                    if let Some(flow) = self.try_eval_special_form(name, list, env, tail)? {
                        return Ok(flow);
                    }
                }
                self.eval_application(list, env, tail)
            }
            Value::Vector(items) => {
                let evaluated: Result<im::Vector<Value>, AniseError> =
                    items.iter().map(|item| self.eval(item, env)).collect();
                Ok(Flow::Value(Value::Vector(evaluated?)))
            }
            Value::Map(entries) => {
                let mut out = entries.clone();
                for (key, value) in entries {
                    out.insert(key.clone(), self.eval(value, env)?);
                }
                Ok(Flow::Value(Value::Map(out)))
            }
            other => Ok(Flow::Value(other.clone())),
        }
    }

    fn eval_symbol(&self, name: &str, env: &EnvRef) -> Result<Value, AniseError> {
        if let Some(type_name) = name.strip_prefix("::") {
            return self
                .types
                .read()
                .unwrap()
                .by_name(type_name)
                .map(Value::TypeName)
                .ok_or_else(|| {
                    AniseError::unbound_symbol(name).with_trace(self.stack_snapshot())
                });
        }
        env::lookup(env, name)
            .ok_or_else(|| AniseError::unbound_symbol(name).with_trace(self.stack_snapshot()))
    }

    fn try_eval_special_form(
        &self,
        name: &str,
        list: &ListHandle,
        env: &EnvRef,
        tail: bool,
    ) -> Result<Option<Flow>, AniseError> {
        if !is_special_form(name) {
            return Ok(None);
        }
        let items = list.to_vec()?;
        let args = &items[1..];
        let flow = match name {
            "if" => self.eval_if(args, env, tail)?,
            "cond" => self.eval_cond(args, env, tail)?,
            "lambda" => Flow::Value(self.eval_lambda(args, env)?),
            "hash-lambda" => Flow::Value(self.eval_hash_lambda(args, env)?),
            "define" => Flow::Value(self.eval_define(args, env, false)?),
            "def-macro" => Flow::Value(self.eval_define(args, env, true)?),
            "def-generic" => Flow::Value(self.eval_def_generic(args, env)?),
            "def-type" => Flow::Value(self.eval_def_type(args, env)?),
            "let" => self.eval_let(args, env, tail, false)?,
            "let*" => self.eval_let(args, env, tail, true)?,
            "quote" => {
                let [form] = args else {
                    return Err(AniseError::syntax("quote takes exactly one form"));
                };
                Flow::Value(form.clone())
            }
            "quasiquote" => {
                let [form] = args else {
                    return Err(AniseError::syntax("quasiquote takes exactly one form"));
                };
                Flow::Value(self.quasiquote(form, env, 1)?)
            }
            "unquote" | "unquote-splicing" => {
                return Err(AniseError::syntax(format!(
                    "{} outside of quasiquote",
                    name
                )))
            }
            "module" => Flow::Value(self.eval_module(args, env)?),
            "import" => Flow::Value(self.eval_import(args, env)?),
            "try*" => Flow::Value(self.eval_try(args, env)?),
            "catch" => return Err(AniseError::syntax("catch outside of try*")),
            "lazy" => {
                let [form] = args else {
                    return Err(AniseError::syntax("lazy takes exactly one form"));
                };
                let worker = self.worker_clone();
                let (expr, scope) = (form.clone(), env.clone());
                Flow::Value(Value::Lazy(LazyHandle::new(Box::new(move || {
                    worker.eval(&expr, &scope)
                }))))
            }
            "lazy-seq" => {
                let [head_form, tail_form] = args else {
                    return Err(AniseError::syntax("lazy-seq takes a head and a tail form"));
                };
                let head = self.eval(head_form, env)?;
                let worker = self.worker_clone();
                let (expr, scope) = (tail_form.clone(), env.clone());
                Flow::Value(Value::List(ListHandle::lazy(
                    head,
                    Box::new(move || worker.eval(&expr, &scope)),
                )))
            }
            "delay" => {
                let [form] = args else {
                    return Err(AniseError::syntax("delay takes exactly one form"));
                };
                let worker = self.worker_clone();
                let (expr, scope) = (form.clone(), env.clone());
                Flow::Value(Value::Delay(DelayHandle::spawn(move || {
                    worker.eval(&expr, &scope)
                })))
            }
            _ => return Ok(None),
        };
        Ok(Some(flow))
    }

    fn eval_if(&self, args: &[Value], env: &EnvRef, tail: bool) -> Result<Flow, AniseError> {
        let [test, then, otherwise] = args else {
            return Err(AniseError::syntax(
                "if takes a condition and exactly two branches",
            ));
        };
        let picked = if crate::ast::truthy(&self.eval(test, env)?) {
            then
        } else {
            otherwise
        };
        self.eval_flow(picked, env, tail)
    }

    fn eval_cond(&self, args: &[Value], env: &EnvRef, tail: bool) -> Result<Flow, AniseError> {
        if args.len() % 2 != 0 {
            return Err(AniseError::syntax("cond takes test/result pairs"));
        }
        for pair in args.chunks(2) {
            if crate::ast::truthy(&self.eval(&pair[0], env)?) {
                return self.eval_flow(&pair[1], env, tail);
            }
        }
        Ok(Flow::Value(Value::Nothing))
    }

    fn parse_params(form: &Value) -> Result<(Vec<String>, bool), AniseError> {
        let names: Vec<String> = match form {
            Value::List(l) => l
                .to_vec()?
                .iter()
                .map(|v| {
                    v.as_symbol()
                        .map(str::to_string)
                        .ok_or_else(|| AniseError::syntax("parameters must be symbols"))
                })
                .collect::<Result<_, _>>()?,
            Value::Vector(v) => v
                .iter()
                .map(|v| {
                    v.as_symbol()
                        .map(str::to_string)
                        .ok_or_else(|| AniseError::syntax("parameters must be symbols"))
                })
                .collect::<Result<_, _>>()?,
            _ => return Err(AniseError::syntax("expected a parameter list")),
        };
        let variadic = names.len() >= 2 && names[names.len() - 2] == "&";
        let params: Vec<String> = if variadic {
            let mut p = names[..names.len() - 2].to_vec();
            p.push(names[names.len() - 1].clone());
            p
        } else {
            if names.iter().any(|n| n == "&") {
                return Err(AniseError::syntax(
                    "& must appear directly before the rest parameter",
                ));
            }
            names
        };
        let mut seen = HashSet::new();
        for p in &params {
            if p != "_" && !seen.insert(p.clone()) {
                return Err(AniseError::syntax(format!(
                    "duplicate parameter name {}",
                    p
                )));
            }
        }
        Ok((params, variadic))
    }

    fn make_compound(
        &self,
        name: &str,
        params_form: &Value,
        body: Vec<Value>,
        env: &EnvRef,
        is_macro: bool,
    ) -> Result<Func, AniseError> {
        let (params, variadic) = Self::parse_params(params_form)?;
        let arity = if variadic {
            FnArity::at_least(params.len() - 1)
        } else {
            FnArity::exact(params.len())
        };
        Ok(Func::compound(CompoundFn {
            name: name.to_string(),
            params,
            variadic,
            body,
            env: env.clone(),
            arity,
            is_macro,
            placeholder_max: None,
        }))
    }

    fn eval_lambda(&self, args: &[Value], env: &EnvRef) -> Result<Value, AniseError> {
        let Some((params, body)) = args.split_first() else {
            return Err(AniseError::syntax("lambda needs a parameter list"));
        };
        let f = self.make_compound("lambda", params, body.to_vec(), env, false)?;
        Ok(Value::Function(f))
    }

    fn eval_hash_lambda(&self, args: &[Value], env: &EnvRef) -> Result<Value, AniseError> {
        let [body] = args else {
            return Err(AniseError::syntax("malformed hash-lambda"));
        };
        let highest = scan_placeholders(body);
        Ok(Value::Function(Func::compound(CompoundFn {
            name: "hash-lambda".to_string(),
            params: Vec::new(),
            variadic: false,
            body: vec![body.clone()],
            env: env.clone(),
            arity: FnArity::at_least(0),
            is_macro: false,
            placeholder_max: Some(highest),
        })))
    }

    fn eval_define(
        &self,
        args: &[Value],
        env: &EnvRef,
        is_macro: bool,
    ) -> Result<Value, AniseError> {
        let Some((target, rest)) = args.split_first() else {
            return Err(AniseError::syntax("malformed define"));
        };
        let module = env::nearest_module(env);
        match target {
            // (define name expr)
            Value::Symbol(name) if !name.starts_with("::") => {
                if is_macro {
                    return Err(AniseError::syntax("def-macro needs a signature list"));
                }
                let [expr] = rest else {
                    return Err(AniseError::syntax("define takes a name and one form"));
                };
                let value = self.eval(expr, env)?;
                env::define(&module, name, value)?;
                Ok(Value::symbol(name))
            }
            // (define ::type name impl) registers a generic implementation
            Value::Symbol(tagged) => {
                let [name_form, impl_form] = rest else {
                    return Err(AniseError::syntax(
                        "generic implementation takes a type, a name and one form",
                    ));
                };
                let tag = match self.eval_symbol(tagged, env)? {
                    Value::TypeName(t) => t,
                    other => {
                        return Err(AniseError::type_error(format!(
                            "expected a type name, got {}",
                            other.type_name()
                        )))
                    }
                };
                let Some(generic_name) = name_form.as_symbol() else {
                    return Err(AniseError::syntax("generic name must be a symbol"));
                };
                let generic = match self.eval_symbol(generic_name, env)? {
                    Value::Function(Func::Generic(g)) => g,
                    _ => {
                        return Err(AniseError::reimplementation(format!(
                            "{} is not a generic function",
                            generic_name
                        )))
                    }
                };
                let implementation = match self.eval(impl_form, env)? {
                    Value::Function(f) => f,
                    other => {
                        return Err(AniseError::type_error(format!(
                            "generic implementation must be a function, got {}",
                            other.type_name()
                        )))
                    }
                };
                generic.add_implementation(tag.id, implementation)?;
                Ok(Value::Nothing)
            }
            // (define (name params...) body...)
            Value::List(signature) => {
                let sig = signature.to_vec()?;
                let Some((name_form, param_syms)) = sig.split_first() else {
                    return Err(AniseError::syntax("empty define signature"));
                };
                let Some(name) = name_form.as_symbol() else {
                    return Err(AniseError::syntax("function name must be a symbol"));
                };
                let params = Value::List(ListHandle::from_vec(param_syms.to_vec()));
                let f = self.make_compound(name, &params, rest.to_vec(), env, is_macro)?;
                env::define(&module, name, Value::Function(f))?;
                Ok(Value::symbol(name))
            }
            _ => Err(AniseError::syntax("malformed define")),
        }
    }

    fn eval_def_generic(&self, args: &[Value], env: &EnvRef) -> Result<Value, AniseError> {
        let [anchor_form, signature_form, fallback_form] = args else {
            return Err(AniseError::syntax(
                "def-generic takes an anchor, a signature and a fallback",
            ));
        };
        let Some(anchor) = anchor_form.as_symbol() else {
            return Err(AniseError::syntax("generic anchor must be a symbol"));
        };
        let Some(signature) = signature_form.as_list() else {
            return Err(AniseError::syntax("generic signature must be a list"));
        };
        let sig = signature.to_vec()?;
        let Some((name_form, params)) = sig.split_first() else {
            return Err(AniseError::syntax("empty generic signature"));
        };
        let Some(name) = name_form.as_symbol() else {
            return Err(AniseError::syntax("generic name must be a symbol"));
        };
        let anchor_index = params
            .iter()
            .position(|p| p.as_symbol() == Some(anchor))
            .ok_or_else(|| {
                AniseError::syntax(format!(
                    "anchor {} does not appear in the signature of {}",
                    anchor, name
                ))
            })?;
        let fallback = match self.eval(fallback_form, env)? {
            Value::Function(f) => f,
            other => {
                return Err(AniseError::type_error(format!(
                    "generic fallback must be a function, got {}",
                    other.type_name()
                )))
            }
        };
        let generic = Func::generic(name, anchor_index, fallback);
        env::define(&env::nearest_module(env), name, Value::Function(generic))?;
        Ok(Value::symbol(name))
    }

    fn eval_def_type(&self, args: &[Value], env: &EnvRef) -> Result<Value, AniseError> {
        let Some((name_form, attr_forms)) = args.split_first() else {
            return Err(AniseError::syntax("def-type needs a type name"));
        };
        let Some(name) = name_form.as_symbol() else {
            return Err(AniseError::syntax("type name must be a symbol"));
        };
        let attrs: Vec<String> = attr_forms
            .iter()
            .map(|a| {
                a.as_symbol()
                    .map(str::to_string)
                    .ok_or_else(|| AniseError::syntax("attribute names must be symbols"))
            })
            .collect::<Result<_, _>>()?;
        let tag = self.types.write().unwrap().register(name)?;
        let module = env::nearest_module(env);

        let (ctor_tag, ctor_arity) = (tag.clone(), attrs.len());
        let constructor = Func::native(
            &format!("make-{}", name),
            FnArity::exact(ctor_arity),
            move |_, args, _| {
                Ok(Value::Record(RecordValue {
                    type_id: ctor_tag.id,
                    type_name: ctor_tag.name.clone(),
                    attrs: args.iter().cloned().collect(),
                }))
            },
        );
        env::define(
            &module,
            &format!("make-{}", name),
            Value::Function(constructor),
        )?;

        let pred_id = tag.id;
        let predicate = Func::native(
            &format!("{}?", name),
            FnArity::exact(1),
            move |_, args, _| {
                Ok(Value::Bool(
                    matches!(&args[0], Value::Record(r) if r.type_id == pred_id),
                ))
            },
        );
        env::define(&module, &format!("{}?", name), Value::Function(predicate))?;

        for (index, attr) in attrs.iter().enumerate() {
            let accessor_name = format!("{}-{}", name, attr);
            let want = tag.id;
            let label = accessor_name.clone();
            let accessor =
                Func::native(&accessor_name, FnArity::exact(1), move |_, args, _| {
                    match &args[0] {
                        Value::Record(r) if r.type_id == want => Ok(r
                            .attrs
                            .get(index)
                            .cloned()
                            .unwrap_or(Value::Nothing)),
                        other => Err(AniseError::type_error(format!(
                            "{} applied to a {}",
                            label,
                            other.type_name()
                        ))),
                    }
                });
            env::define(&module, &accessor_name, Value::Function(accessor))?;
        }
        Ok(Value::TypeName(tag))
    }

    fn eval_let(
        &self,
        args: &[Value],
        env: &EnvRef,
        tail: bool,
        sequential: bool,
    ) -> Result<Flow, AniseError> {
        let Some((bindings_form, body)) = args.split_first() else {
            return Err(AniseError::syntax("let needs a binding list"));
        };
        let bindings: Vec<Value> = match bindings_form {
            Value::List(l) => l.to_vec()?,
            Value::Vector(v) => v.iter().cloned().collect(),
            _ => return Err(AniseError::syntax("let bindings must be a list")),
        };
        let frame = Env::child(env);
        for (name, value_form) in Self::let_pairs(&bindings)? {
            let value = if sequential {
                self.eval(&value_form, &frame)?
            } else {
                self.eval(&value_form, env)?
            };
            env::define_no_export(&frame, &name, value)?;
        }
        self.eval_do(body, &frame, tail)
    }

    /// Bindings come either as `(name value ...)` flat pairs or as
    /// `((name value) ...)` sublists; the shape of the first entry decides.
    fn let_pairs(bindings: &[Value]) -> Result<Vec<(String, Value)>, AniseError> {
        let paired = matches!(
            bindings.first(),
            Some(Value::List(_)) | Some(Value::Vector(_))
        );
        let mut out = Vec::with_capacity(bindings.len());
        if paired {
            for binding in bindings {
                let pair: Vec<Value> = match binding {
                    Value::List(l) => l.to_vec()?,
                    Value::Vector(v) => v.iter().cloned().collect(),
                    _ => {
                        return Err(AniseError::syntax(
                            "let bindings must be name/value pairs",
                        ))
                    }
                };
                let [name_form, value_form] = pair.as_slice() else {
                    return Err(AniseError::syntax(
                        "let binding pairs take a name and one form",
                    ));
                };
                let Some(name) = name_form.as_symbol() else {
                    return Err(AniseError::syntax("let binds symbols only"));
                };
                out.push((name.to_string(), value_form.clone()));
            }
        } else {
            if bindings.len() % 2 != 0 {
                return Err(AniseError::syntax("let takes name/value pairs"));
            }
            for pair in bindings.chunks(2) {
                let Some(name) = pair[0].as_symbol() else {
                    return Err(AniseError::syntax("let binds symbols only"));
                };
                out.push((name.to_string(), pair[1].clone()));
            }
        }
        Ok(out)
    }

    fn quasiquote(&self, form: &Value, env: &EnvRef, depth: usize) -> Result<Value, AniseError> {
        match form {
            Value::List(list) => {
                if list.is_definitely_empty() {
                    return Ok(form.clone());
                }
                let items = list.to_vec()?;
                let head = items[0].as_symbol();
                let next_depth = match head {
                    Some("quasiquote") => depth + 1,
                    Some("unquote") | Some("unquote-splicing") => {
                        if depth == 1 {
                            if head == Some("unquote") {
                                let [_, inner] = items.as_slice() else {
                                    return Err(AniseError::syntax(
                                        "unquote takes exactly one form",
                                    ));
                                };
                                return self.eval(inner, env);
                            }
                            return Err(AniseError::syntax(
                                "unquote-splicing must appear inside a sequence",
                            ));
                        }
                        depth - 1
                    }
                    _ => depth,
                };
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    if next_depth == depth && self.splice_into(item, env, depth, &mut out)? {
                        continue;
                    }
                    out.push(self.quasiquote(item, env, next_depth)?);
                }
                Ok(Value::List(ListHandle::from_vec(out)))
            }
            Value::Vector(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if self.splice_into(item, env, depth, &mut out)? {
                        continue;
                    }
                    out.push(self.quasiquote(item, env, depth)?);
                }
                Ok(Value::Vector(out.into_iter().collect()))
            }
            _ => Ok(form.clone()),
        }
    }

    fn splice_into(
        &self,
        item: &Value,
        env: &EnvRef,
        depth: usize,
        out: &mut Vec<Value>,
    ) -> Result<bool, AniseError> {
        if depth != 1 {
            return Ok(false);
        }
        let Some(list) = item.as_list() else {
            return Ok(false);
        };
        if list.is_definitely_empty() {
            return Ok(false);
        }
        let sub = list.to_vec()?;
        if sub[0].as_symbol() != Some("unquote-splicing") {
            return Ok(false);
        }
        let [_, inner] = sub.as_slice() else {
            return Err(AniseError::syntax("unquote-splicing takes exactly one form"));
        };
        match self.eval(inner, env)? {
            Value::List(spliced) => {
                for v in spliced.iter() {
                    out.push(v?);
                }
            }
            Value::Vector(spliced) => out.extend(spliced.iter().cloned()),
            other => {
                return Err(AniseError::type_error(format!(
                    "cannot splice a {}",
                    other.type_name()
                )))
            }
        }
        Ok(true)
    }

    /// `(module name forms...)`. Declaring an already-known module is a
    /// no-op; exports land in the global frame under `name/export`, or
    /// bare for the core module.
    fn eval_module(&self, args: &[Value], _env: &EnvRef) -> Result<Value, AniseError> {
        let Some((name_form, body)) = args.split_first() else {
            return Err(AniseError::syntax("module needs a name"));
        };
        let Some(name) = name_form.as_symbol() else {
            return Err(AniseError::syntax("module name must be a symbol"));
        };
        if self.modules.read().unwrap().contains_key(name) {
            return Ok(Value::symbol(name));
        }
        let frame = Env::new_module(name, &self.global);
        self.modules
            .write()
            .unwrap()
            .insert(name.to_string(), frame.clone());
        for form in body {
            self.eval(form, &frame)?;
        }
        let exports = frame.read().unwrap().exports.clone();
        for export in exports {
            let Some(value) = env::lookup(&frame, &export) else {
                continue;
            };
            let global_name = format!("{}/{}", name, export);
            if !env::bound_locally(&self.global, &global_name) {
                env::define_no_export(&self.global, &global_name, value)?;
            }
        }
        Ok(Value::symbol(name))
    }

    /// `(import name)` copies a module's exports into the current module
    /// frame under their own names; `(import name alias)` prefixes them
    /// `alias/name`. Re-importing skips names that are already bound.
    fn eval_import(&self, args: &[Value], env: &EnvRef) -> Result<Value, AniseError> {
        let (name_form, alias_form) = match args {
            [name] => (name, None),
            [name, alias] => (name, Some(alias)),
            _ => {
                return Err(AniseError::syntax(
                    "import takes a module name and an optional alias",
                ))
            }
        };
        let Some(name) = name_form.as_symbol() else {
            return Err(AniseError::syntax("module name must be a symbol"));
        };
        let alias = match alias_form {
            None => None,
            Some(Value::Symbol(a)) => Some(a.clone()),
            Some(other) => {
                return Err(AniseError::syntax(format!(
                    "import alias must be a symbol, got {}",
                    other.type_name()
                )))
            }
        };
        let module = self
            .modules
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| AniseError::unbound_symbol(name))?;
        let target = env::nearest_module(env);
        let exports = module.read().unwrap().exports.clone();
        for export in exports {
            let Some(value) = env::lookup(&module, &export) else {
                continue;
            };
            let local = match &alias {
                Some(prefix) => format!("{}/{}", prefix, export),
                None => export.clone(),
            };
            if !env::bound_locally(&target, &local) {
                env::define_no_export(&target, &local, value)?;
            }
        }
        Ok(Value::symbol(name))
    }

    /// `(try* expr (catch err body...))`, optionally
    /// `(catch validator-expr err body...)` where a falsy validator result
    /// re-raises. Fatal errors pass through.
    fn eval_try(&self, args: &[Value], env: &EnvRef) -> Result<Value, AniseError> {
        let [body_form, catch_form] = args else {
            return Err(AniseError::syntax("try* takes a body and a catch clause"));
        };
        let Some(clause_list) = catch_form.as_list() else {
            return Err(AniseError::syntax("malformed catch clause"));
        };
        let clause = clause_list.to_vec()?;
        if clause.first().and_then(Value::as_symbol) != Some("catch") {
            return Err(AniseError::syntax("try* expects a catch clause"));
        }
        let (validator_form, err_name, handler) = match (clause.get(1), clause.get(2)) {
            // `_` in the validator slot means "no validator"
            (Some(Value::Symbol(slot)), Some(Value::Symbol(err_name))) if slot == "_" => {
                (None, err_name.clone(), &clause[3..])
            }
            (Some(Value::Symbol(err_name)), _) => (None, err_name.clone(), &clause[2..]),
            (Some(expr), Some(Value::Symbol(err_name))) => {
                (Some(expr.clone()), err_name.clone(), &clause[3..])
            }
            (Some(_), _) => {
                return Err(AniseError::syntax(
                    "catch validator must be followed by an error name",
                ))
            }
            (None, _) => return Err(AniseError::syntax("catch needs an error name")),
        };

        let err = match self.eval(body_form, env) {
            Ok(v) => return Ok(v),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => e,
        };
        let err_value = error_value(&err);
        if let Some(vform) = validator_form {
            let verdict = match self.eval(&vform, env)? {
                Value::Function(f) => f.call(self, &[err_value.clone()], env)?,
                other => {
                    return Err(AniseError::type_error(format!(
                        "catch validator must be a function, got {}",
                        other.type_name()
                    )))
                }
            };
            if !crate::ast::truthy(&verdict) {
                return Err(err);
            }
        }
        let frame = Env::child(env);
        env::define_no_export(&frame, &err_name, err_value)?;
        match self.eval_do(handler, &frame, false)? {
            Flow::Value(v) => Ok(v),
            Flow::TailCall(_) => Err(AniseError::syntax("recur outside of tail position")),
        }
    }

    fn eval_application(
        &self,
        list: &ListHandle,
        env: &EnvRef,
        tail: bool,
    ) -> Result<Flow, AniseError> {
        let items = list.to_vec()?;
        let callee = self.eval(&items[0], env)?;
        let func = match callee {
            Value::Function(f) => f,
            other => {
                return Err(AniseError::application(format!(
                    "cannot call a {} as a function",
                    other.type_name()
                ))
                .with_trace(self.stack_snapshot()))
            }
        };
        if func.is_macro() {
            return self.expand_macro(&func, list, &items[1..], env, tail);
        }
        let mut args = Vec::with_capacity(items.len() - 1);
        for form in &items[1..] {
            args.push(self.eval(form, env)?);
        }
        if tail {
            let self_call = func.ptr_eq(&self.recur)
                || self
                    .call_stack
                    .borrow()
                    .last()
                    .map_or(false, |top| func.ptr_eq(top));
            if self_call {
                return Ok(Flow::TailCall(args));
            }
        }
        let _guard = self.push_call(func.clone());
        let result = func
            .call(self, &args, env)
            .map_err(|e| e.with_trace(self.stack_snapshot()))?;
        Ok(Flow::Value(result))
    }

    /// Expands a macro call and rewrites the call node in place to
    /// `(id <expansion>)`, so the next evaluation of the same node skips
    /// the macro entirely. The rewrite is suppressed while an enclosing
    /// expansion is running; a macro emitting a call to another macro must
    /// not freeze that inner call before it has ever been evaluated on its
    /// own.
    fn expand_macro(
        &self,
        func: &Func,
        node: &ListHandle,
        forms: &[Value],
        env: &EnvRef,
        tail: bool,
    ) -> Result<Flow, AniseError> {
        self.macro_depth.set(self.macro_depth.get() + 1);
        let expansion = {
            let _guard = self.push_call(func.clone());
            func.call(self, forms, env)
        };
        self.macro_depth.set(self.macro_depth.get() - 1);
        let expansion = expansion?;
        if self.macro_depth.get() == 0 {
            node.set_head(Value::symbol("id"));
            node.set_tail(ListHandle::from_vec(vec![expansion.clone()]));
        }
        self.eval_flow(&expansion, env, tail)
    }
}

/// Converts a host error into the error object `catch` binds.
pub fn error_value(err: &AniseError) -> Value {
    Value::Error(Arc::new(ErrObj {
        message: err.message().to_string(),
        info: err.info_tag(),
        trace: err.trace().to_vec(),
    }))
}

/// Highest `%N` placeholder mentioned anywhere in a hash-lambda body.
fn scan_placeholders(form: &Value) -> usize {
    match form {
        Value::Symbol(s) if s == "%" => 1,
        Value::Symbol(s) => s
            .strip_prefix('%')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| (1..=env::MAX_PLACEHOLDER).contains(n))
            .unwrap_or(0),
        Value::List(l) => l
            .iter()
            .filter_map(|item| item.ok())
            .map(|v| scan_placeholders(&v))
            .max()
            .unwrap_or(0),
        Value::Vector(v) => v.iter().map(scan_placeholders).max().unwrap_or(0),
        _ => 0,
    }
}
