use std::io::{BufRead, Write};

use super::define_native;
use crate::ast::{FnArity, Value};
use crate::error::AniseError;
use crate::eval::Evaluator;
use crate::printer;
use crate::reader;

pub fn install(ev: &Evaluator) -> Result<(), AniseError> {
    define_native(ev, "print!", FnArity::at_least(0), |_, args, _| {
        let mut out = std::io::stdout().lock();
        for arg in args {
            write!(out, "{}", printer::print_value(arg))
                .map_err(|e| AniseError::application(e.to_string()))?;
        }
        out.flush().map_err(|e| AniseError::application(e.to_string()))?;
        Ok(Value::Nothing)
    })?;
    define_native(ev, "println!", FnArity::at_least(0), |_, args, _| {
        let rendered: Vec<String> = args.iter().map(printer::print_value).collect();
        println!("{}", rendered.join(" "));
        Ok(Value::Nothing)
    })?;
    define_native(ev, "readln!", FnArity::exact(0), |_, _, _| {
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) => Ok(Value::Nothing),
            Ok(_) => Ok(Value::string(line.trim_end_matches('\n'))),
            Err(e) => Err(AniseError::application(e.to_string())),
        }
    })?;

    define_native(ev, "slurp!", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::String(path) => std::fs::read_to_string(path)
            .map(Value::String)
            .map_err(|e| AniseError::application(format!("cannot read {}: {}", path, e))),
        other => Err(AniseError::type_error(format!(
            "slurp! expects a path string, got {}",
            other.type_name()
        ))),
    })?;
    define_native(ev, "spit!", FnArity::exact(2), |_, args, _| {
        match (&args[0], &args[1]) {
            (Value::String(path), Value::String(content)) => std::fs::write(path, content)
                .map(|_| Value::Nothing)
                .map_err(|e| AniseError::application(format!("cannot write {}: {}", path, e))),
            (Value::String(path), other) => {
                std::fs::write(path, printer::print_value(other))
                    .map(|_| Value::Nothing)
                    .map_err(|e| {
                        AniseError::application(format!("cannot write {}: {}", path, e))
                    })
            }
            (other, _) => Err(AniseError::type_error(format!(
                "spit! expects a path string, got {}",
                other.type_name()
            ))),
        }
    })?;

    define_native(ev, "spit-append!", FnArity::exact(2), |_, args, _| {
        let Value::String(path) = &args[0] else {
            return Err(AniseError::type_error(format!(
                "spit-append! expects a path string, got {}",
                args[0].type_name()
            )));
        };
        let content = match &args[1] {
            Value::String(s) => s.clone(),
            other => printer::print_value(other),
        };
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(content.as_bytes()))
            .map(|_| Value::Nothing)
            .map_err(|e| AniseError::application(format!("cannot append to {}: {}", path, e)))
    })?;

    define_native(ev, "exit!", FnArity::range(0, 1), |_, args, _| {
        let code = match args.first() {
            None => 0,
            Some(Value::Int(n)) => *n as i32,
            Some(other) => {
                return Err(AniseError::type_error(format!(
                    "exit! expects an integer status, got {}",
                    other.type_name()
                )))
            }
        };
        std::process::exit(code)
    })?;

    define_native(ev, "read-string", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::String(s) => reader::read_one(s),
        other => Err(AniseError::type_error(format!(
            "read-string applied to a {}",
            other.type_name()
        ))),
    })?;
    define_native(ev, "eval!", FnArity::exact(1), |ev, args, env| {
        ev.eval(&args[0], env)
    })?;
    define_native(ev, "load!", FnArity::exact(1), |ev, args, _| match &args[0] {
        Value::String(path) => {
            let source = std::fs::read_to_string(path)
                .map_err(|e| AniseError::application(format!("cannot read {}: {}", path, e)))?;
            ev.eval_source(&source)
        }
        other => Err(AniseError::type_error(format!(
            "load! expects a path string, got {}",
            other.type_name()
        ))),
    })?;

    Ok(())
}
