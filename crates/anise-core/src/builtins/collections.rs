use std::sync::Arc;

use super::define_native;
use crate::ast::{truthy, FnArity, Key, Value};
use crate::error::AniseError;
use crate::eval::Evaluator;
use crate::seq::{ListHandle, Sequence};

fn seq_error(name: &str, v: &Value) -> AniseError {
    AniseError::type_error(format!("{} applied to a {}", name, v.type_name()))
}

pub fn install(ev: &Evaluator) -> Result<(), AniseError> {
    define_native(ev, "cons", FnArity::exact(2), |_, args, _| match &args[1] {
        Value::List(l) => Ok(Value::List(ListHandle::cons(args[0].clone(), l.clone()))),
        Value::Nothing => Ok(Value::List(ListHandle::cons(
            args[0].clone(),
            ListHandle::empty(),
        ))),
        other => Err(seq_error("cons", other)),
    })?;

    define_native(ev, "first", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::List(l) => l.seq_first(),
        Value::Vector(v) => v.seq_first(),
        Value::Nothing => Ok(Value::Nothing),
        other => Err(seq_error("first", other)),
    })?;
    define_native(ev, "rest", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::List(l) => l.seq_rest(),
        Value::Vector(v) => v.seq_rest(),
        Value::Nothing => Ok(Value::List(ListHandle::empty())),
        other => Err(seq_error("rest", other)),
    })?;
    define_native(ev, "empty?", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::List(l) => Ok(Value::Bool(l.seq_is_empty()?)),
        Value::Vector(v) => Ok(Value::Bool(v.seq_is_empty()?)),
        Value::Map(m) => Ok(Value::Bool(m.is_empty())),
        Value::Set(s) => Ok(Value::Bool(s.is_empty())),
        Value::String(s) => Ok(Value::Bool(s.is_empty())),
        Value::Nothing => Ok(Value::Bool(true)),
        other => Err(seq_error("empty?", other)),
    })?;

    // Evaluated argument lists are already array-backed, so `list` is a
    // plain O(1) wrap.
    define_native(ev, "list", FnArity::at_least(0), |_, args, _| {
        Ok(Value::List(ListHandle::coded(Arc::new(args.to_vec()))))
    })?;
    define_native(ev, "vector", FnArity::at_least(0), |_, args, _| {
        Ok(Value::Vector(args.iter().cloned().collect()))
    })?;

    define_native(ev, "size", FnArity::exact(1), |_, args, _| {
        let n = match &args[0] {
            Value::List(l) => l.size()?,
            Value::Vector(v) => v.len(),
            Value::Map(m) => m.len(),
            Value::Set(s) => s.len(),
            Value::String(s) => s.chars().count(),
            Value::Nothing => 0,
            other => return Err(seq_error("size", other)),
        };
        Ok(Value::Int(n as i64))
    })?;

    define_native(ev, "append", FnArity::at_least(0), |_, args, _| {
        let mut out = ListHandle::empty();
        for arg in args {
            match arg {
                Value::List(l) => out = out.append(l),
                Value::Nothing => {}
                other => return Err(seq_error("append", other)),
            }
        }
        Ok(Value::List(out))
    })?;

    define_native(ev, "get", FnArity::exact(2), |_, args, _| {
        match (&args[0], &args[1]) {
            (Value::List(l), Value::Int(i)) if *i >= 0 => l.get(*i as usize),
            (Value::Vector(v), Value::Int(i)) if *i >= 0 => {
                Ok(v.get(*i as usize).cloned().unwrap_or(Value::Nothing))
            }
            (Value::String(s), Value::Int(i)) if *i >= 0 => Ok(s
                .chars()
                .nth(*i as usize)
                .map(Value::Char)
                .unwrap_or(Value::Nothing)),
            (Value::Map(m), key) => {
                Ok(m.get(&Key::from_value(key)?).cloned().unwrap_or(Value::Nothing))
            }
            (Value::List(_), _) | (Value::Vector(_), _) | (Value::String(_), _) => {
                Ok(Value::Nothing)
            }
            (other, _) => Err(seq_error("get", other)),
        }
    })?;

    define_native(ev, "map-of", FnArity::at_least(0), |_, args, _| {
        if args.len() % 2 != 0 {
            return Err(AniseError::arity(format!(
                "map-of: expected an even number of arguments, got {}",
                args.len()
            )));
        }
        let mut map = im::HashMap::new();
        for pair in args.chunks(2) {
            map.insert(Key::from_value(&pair[0])?, pair[1].clone());
        }
        Ok(Value::Map(map))
    })?;

    define_native(ev, "map-get", FnArity::exact(2), |_, args, _| match &args[0] {
        Value::Map(m) => Ok(m
            .get(&Key::from_value(&args[1])?)
            .cloned()
            .unwrap_or(Value::Nothing)),
        other => Err(seq_error("map-get", other)),
    })?;
    define_native(ev, "map-set", FnArity::exact(3), |_, args, _| match &args[0] {
        Value::Map(m) => {
            let mut next = m.clone();
            next.insert(Key::from_value(&args[1])?, args[2].clone());
            Ok(Value::Map(next))
        }
        other => Err(seq_error("map-set", other)),
    })?;
    define_native(ev, "map-remove", FnArity::exact(2), |_, args, _| match &args[0] {
        Value::Map(m) => {
            let mut next = m.clone();
            next.remove(&Key::from_value(&args[1])?);
            Ok(Value::Map(next))
        }
        other => Err(seq_error("map-remove", other)),
    })?;

    define_native(ev, "set-add", FnArity::exact(2), |_, args, _| match &args[0] {
        Value::Set(s) => {
            let mut next = s.clone();
            next.insert(Key::from_value(&args[1])?);
            Ok(Value::Set(next))
        }
        other => Err(seq_error("set-add", other)),
    })?;
    define_native(ev, "contains?", FnArity::exact(2), |_, args, _| match &args[0] {
        Value::Map(m) => Ok(Value::Bool(m.contains_key(&Key::from_value(&args[1])?))),
        Value::Set(s) => Ok(Value::Bool(s.contains(&Key::from_value(&args[1])?))),
        Value::Vector(v) => Ok(Value::Bool(v.iter().any(|x| x == &args[1]))),
        Value::List(l) => {
            for item in l.iter() {
                if item? == args[1] {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        other => Err(seq_error("contains?", other)),
    })?;

    define_native(ev, "range", FnArity::range(1, 2), |_, args, _| {
        let (from, to) = match (&args[0], args.get(1)) {
            (Value::Int(to), None) => (0, *to),
            (Value::Int(from), Some(Value::Int(to))) => (*from, *to),
            _ => return Err(AniseError::type_error("range expects integer bounds")),
        };
        let items: Vec<Value> = (from..to).map(Value::Int).collect();
        Ok(Value::List(ListHandle::coded(Arc::new(items))))
    })?;

    define_native(ev, "map", FnArity::exact(2), |ev, args, env| {
        let Value::Function(f) = &args[0] else {
            return Err(seq_error("map", &args[0]));
        };
        match &args[1] {
            Value::List(l) => {
                let mut out = Vec::new();
                for item in l.iter() {
                    out.push(f.call(ev, &[item?], env)?);
                }
                Ok(Value::List(ListHandle::coded(Arc::new(out))))
            }
            Value::Vector(v) => {
                let mut out = im::Vector::new();
                for item in v {
                    out.push_back(f.call(ev, &[item.clone()], env)?);
                }
                Ok(Value::Vector(out))
            }
            other => Err(seq_error("map", other)),
        }
    })?;
    define_native(ev, "filter", FnArity::exact(2), |ev, args, env| {
        let Value::Function(f) = &args[0] else {
            return Err(seq_error("filter", &args[0]));
        };
        match &args[1] {
            Value::List(l) => {
                let mut out = Vec::new();
                for item in l.iter() {
                    let item = item?;
                    if truthy(&f.call(ev, &[item.clone()], env)?) {
                        out.push(item);
                    }
                }
                Ok(Value::List(ListHandle::coded(Arc::new(out))))
            }
            Value::Vector(v) => {
                let mut out = im::Vector::new();
                for item in v {
                    if truthy(&f.call(ev, &[item.clone()], env)?) {
                        out.push_back(item.clone());
                    }
                }
                Ok(Value::Vector(out))
            }
            other => Err(seq_error("filter", other)),
        }
    })?;
    define_native(ev, "foldl", FnArity::exact(3), |ev, args, env| {
        let Value::Function(f) = &args[0] else {
            return Err(seq_error("foldl", &args[0]));
        };
        let mut acc = args[1].clone();
        match &args[2] {
            Value::List(l) => {
                for item in l.iter() {
                    acc = f.call(ev, &[acc, item?], env)?;
                }
            }
            Value::Vector(v) => {
                for item in v {
                    acc = f.call(ev, &[acc, item.clone()], env)?;
                }
            }
            other => return Err(seq_error("foldl", other)),
        }
        Ok(acc)
    })?;

    Ok(())
}
