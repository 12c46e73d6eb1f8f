use std::sync::{Arc, Mutex};

use crate::concurrency::DelayHandle;
use crate::error::AniseError;
use crate::fun::Func;
use crate::lazy::LazyHandle;
use crate::seq::ListHandle;
use im::{HashMap, HashSet, Vector};
use num_rational::Rational64;

/// Runtime values. A closed union: every consumption site matches
/// exhaustively so adding a variant is a compile-time event.
#[derive(Clone)]
pub enum Value {
    Nothing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Rational(Rational64),
    Char(char),
    Symbol(String),
    Keyword(String),
    String(String),
    List(ListHandle),
    Vector(Vector<Value>),
    Map(HashMap<Key, Value>),
    Set(HashSet<Key>),
    Box(BoxHandle),
    Record(RecordValue),
    Error(Arc<ErrObj>),
    Function(Func),
    TypeName(TypeTag),
    Lazy(LazyHandle),
    Delay(DelayHandle),
}

/// Map and set keys. Restricted to atomic, hashable values; anything else
/// raises a type error at construction time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Symbol(String),
    Keyword(String),
    String(String),
    Int(i64),
    Bool(bool),
    Char(char),
    Float(u64),
}

impl Key {
    pub fn from_value(value: &Value) -> Result<Key, AniseError> {
        match value {
            Value::Symbol(s) => Ok(Key::Symbol(s.clone())),
            Value::Keyword(s) => Ok(Key::Keyword(s.clone())),
            Value::String(s) => Ok(Key::String(s.clone())),
            Value::Int(n) => Ok(Key::Int(*n)),
            Value::Bool(b) => Ok(Key::Bool(*b)),
            Value::Char(c) => Ok(Key::Char(*c)),
            Value::Float(f) => Ok(Key::Float(f.to_bits())),
            other => Err(AniseError::type_error(format!(
                "{} cannot be used as a map or set key",
                other.type_name()
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Symbol(s) => Value::Symbol(s.clone()),
            Key::Keyword(s) => Value::Keyword(s.clone()),
            Key::String(s) => Value::String(s.clone()),
            Key::Int(n) => Value::Int(*n),
            Key::Bool(b) => Value::Bool(*b),
            Key::Char(c) => Value::Char(*c),
            Key::Float(bits) => Value::Float(f64::from_bits(*bits)),
        }
    }
}

/// A mutable single-cell reference. Deliberately unsynchronized with
/// respect to interpreted-code ordering: mutation from a `delay` worker
/// racing the main evaluator is undefined behavior by contract.
#[derive(Clone)]
pub struct BoxHandle {
    inner: Arc<Mutex<Value>>,
}

impl BoxHandle {
    pub fn new(value: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    pub fn get(&self) -> Value {
        self.inner.lock().unwrap().clone()
    }

    pub fn set(&self, value: Value) {
        *self.inner.lock().unwrap() = value;
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Instance of a user-defined record type: type tag plus the ordered
/// attribute vector.
#[derive(Clone)]
pub struct RecordValue {
    pub type_id: u32,
    pub type_name: Arc<str>,
    pub attrs: Vector<Value>,
}

/// A named, uniquely-identified type tag. Used for generic dispatch and
/// record typing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeTag {
    pub name: Arc<str>,
    pub id: u32,
}

/// The error object interpreted code sees in a `catch` clause.
pub struct ErrObj {
    pub message: String,
    pub info: Value,
    pub trace: Vec<String>,
}

/// Argument-count range of a function. `max = None` means unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FnArity {
    min: usize,
    max: Option<usize>,
}

impl FnArity {
    pub fn new(min: usize, max: Option<usize>) -> Self {
        if let Some(max_val) = max {
            assert!(min <= max_val, "min arity cannot exceed max arity");
        }
        Self { min, max }
    }

    pub fn exact(count: usize) -> Self {
        Self::new(count, Some(count))
    }

    pub fn at_least(min: usize) -> Self {
        Self::new(min, None)
    }

    pub fn range(min: usize, max: usize) -> Self {
        Self::new(min, Some(max))
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }

    pub fn check(&self, name: &str, given: usize) -> Result<(), AniseError> {
        if self.accepts(given) {
            return Ok(());
        }
        let expected = match self.max {
            Some(max) if max == self.min => format!("{}", self.min),
            Some(max) => format!("{}..{}", self.min, max),
            None => format!("at least {}", self.min),
        };
        Err(AniseError::arity(format!(
            "{}: expected {} argument(s), got {}",
            name, expected, given
        )))
    }
}

impl Value {
    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(name.into())
    }

    pub fn keyword(name: impl Into<String>) -> Self {
        Value::Keyword(name.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Rational(_) => "rational",
            Value::Char(_) => "char",
            Value::Symbol(_) => "symbol",
            Value::Keyword(_) => "keyword",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Box(_) => "box",
            Value::Record(_) => "record",
            Value::Error(_) => "error",
            Value::Function(_) => "function",
            Value::TypeName(_) => "type-name",
            Value::Lazy(_) => "lazy",
            Value::Delay(_) => "delay",
        }
    }

    /// Atoms are immutable-by-identity and compare structurally by value.
    pub fn is_atom(&self) -> bool {
        matches!(
            self,
            Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Rational(_)
                | Value::Char(_)
                | Value::Symbol(_)
                | Value::Keyword(_)
                | Value::String(_)
                | Value::Function(_)
        )
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Rational(_))
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListHandle> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Func> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }
}

/// Truthiness: everything except `#f`, Nothing and the empty list is true.
/// That includes 0, the empty string and the empty vector.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Nothing => false,
        Value::List(l) => !l.is_definitely_empty(),
        _ => true,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nothing, Value::Nothing) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Rational(a), Value::Rational(b)) => a == b,
            (Value::Int(a), Value::Rational(b)) | (Value::Rational(b), Value::Int(a)) => {
                *b == Rational64::from_integer(*a)
            }
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.structural_eq(b),
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Box(a), Value::Box(b)) => a.ptr_eq(b),
            (Value::Record(a), Value::Record(b)) => {
                a.type_id == b.type_id && a.attrs == b.attrs
            }
            (Value::Error(a), Value::Error(b)) => {
                a.message == b.message && a.info == b.info
            }
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::TypeName(a), Value::TypeName(b)) => a.id == b.id,
            (Value::Lazy(a), Value::Lazy(b)) => a.ptr_eq(b),
            (Value::Delay(a), Value::Delay(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}
