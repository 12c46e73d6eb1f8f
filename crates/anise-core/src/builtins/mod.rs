mod collections;
mod core;
mod io;

use crate::ast::{FnArity, Value};
use crate::env::{self, EnvRef};
use crate::error::AniseError;
use crate::eval::Evaluator;
use crate::fun::Func;

/// Installs every primitive into the evaluator's global frame. Called
/// once from `Evaluator::new`.
pub fn install(evaluator: &Evaluator) -> Result<(), AniseError> {
    core::install(evaluator)?;
    collections::install(evaluator)?;
    io::install(evaluator)?;
    Ok(())
}

pub(crate) fn define_native<F>(
    evaluator: &Evaluator,
    name: &str,
    arity: FnArity,
    f: F,
) -> Result<(), AniseError>
where
    F: Fn(&Evaluator, &[Value], &EnvRef) -> Result<Value, AniseError> + Send + Sync + 'static,
{
    env::define(
        &evaluator.global_env(),
        name,
        Value::Function(Func::native(name, arity, f)),
    )
}
