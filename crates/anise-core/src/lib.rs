pub mod ast;
pub mod builtins;
pub mod concurrency;
pub mod env;
pub mod error;
pub mod eval;
pub mod fun;
pub mod lazy;
pub mod printer;
pub mod reader;
pub mod repl;
pub mod seq;
pub mod types;

pub use ast::Value;
pub use error::AniseError;
pub use eval::Evaluator;
