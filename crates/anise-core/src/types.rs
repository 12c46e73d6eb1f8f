use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{TypeTag, Value};
use crate::error::AniseError;

/// Registry of type tags. The built-in tags are fixed at construction;
/// `def-type` appends record tags. Each evaluator owns its own registry,
/// shared with its delay workers.
pub struct TypeRegistry {
    names: Vec<Arc<str>>,
    by_name: HashMap<String, u32>,
}

pub const TYPE_NOTHING: u32 = 0;
pub const TYPE_BOOL: u32 = 1;
pub const TYPE_INT: u32 = 2;
pub const TYPE_FLOAT: u32 = 3;
pub const TYPE_RATIONAL: u32 = 4;
pub const TYPE_CHAR: u32 = 5;
pub const TYPE_SYMBOL: u32 = 6;
pub const TYPE_KEYWORD: u32 = 7;
pub const TYPE_STRING: u32 = 8;
pub const TYPE_LIST: u32 = 9;
pub const TYPE_VECTOR: u32 = 10;
pub const TYPE_MAP: u32 = 11;
pub const TYPE_SET: u32 = 12;
pub const TYPE_BOX: u32 = 13;
pub const TYPE_ERROR: u32 = 14;
pub const TYPE_FUNCTION: u32 = 15;
pub const TYPE_TYPENAME: u32 = 16;
pub const TYPE_LAZY: u32 = 17;
pub const TYPE_DELAY: u32 = 18;

const BUILTIN_NAMES: &[&str] = &[
    "nothing", "bool", "int", "float", "rational", "char", "symbol", "keyword",
    "string", "list", "vector", "map", "set", "box", "error", "function",
    "type-name", "lazy", "delay",
];

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = TypeRegistry {
            names: Vec::new(),
            by_name: HashMap::new(),
        };
        for name in BUILTIN_NAMES {
            let id = registry.names.len() as u32;
            registry.names.push(Arc::from(*name));
            registry.by_name.insert((*name).to_string(), id);
        }
        registry
    }

    /// Registers a new record type. The name must be fresh.
    pub fn register(&mut self, name: &str) -> Result<TypeTag, AniseError> {
        if self.by_name.contains_key(name) {
            return Err(AniseError::already_defined(name));
        }
        let id = self.names.len() as u32;
        let shared: Arc<str> = Arc::from(name);
        self.names.push(shared.clone());
        self.by_name.insert(name.to_string(), id);
        Ok(TypeTag { name: shared, id })
    }

    pub fn by_name(&self, name: &str) -> Option<TypeTag> {
        self.by_name.get(name).map(|id| TypeTag {
            name: self.names[*id as usize].clone(),
            id: *id,
        })
    }

    pub fn name_of(&self, id: u32) -> Option<Arc<str>> {
        self.names.get(id as usize).cloned()
    }

    /// Runtime type tag id of a value; this is the generic dispatch key.
    pub fn id_of(value: &Value) -> u32 {
        match value {
            Value::Nothing => TYPE_NOTHING,
            Value::Bool(_) => TYPE_BOOL,
            Value::Int(_) => TYPE_INT,
            Value::Float(_) => TYPE_FLOAT,
            Value::Rational(_) => TYPE_RATIONAL,
            Value::Char(_) => TYPE_CHAR,
            Value::Symbol(_) => TYPE_SYMBOL,
            Value::Keyword(_) => TYPE_KEYWORD,
            Value::String(_) => TYPE_STRING,
            Value::List(_) => TYPE_LIST,
            Value::Vector(_) => TYPE_VECTOR,
            Value::Map(_) => TYPE_MAP,
            Value::Set(_) => TYPE_SET,
            Value::Box(_) => TYPE_BOX,
            Value::Error(_) => TYPE_ERROR,
            Value::Function(_) => TYPE_FUNCTION,
            Value::TypeName(_) => TYPE_TYPENAME,
            Value::Lazy(_) => TYPE_LAZY,
            Value::Delay(_) => TYPE_DELAY,
            Value::Record(r) => r.type_id,
        }
    }

    pub fn tag_of(&self, value: &Value) -> TypeTag {
        let id = Self::id_of(value);
        TypeTag {
            name: self
                .names
                .get(id as usize)
                .cloned()
                .unwrap_or_else(|| Arc::from("unknown")),
            id,
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
