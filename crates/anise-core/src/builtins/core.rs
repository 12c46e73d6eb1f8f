use num_rational::Rational64;

use super::define_native;
use crate::ast::{truthy, BoxHandle, FnArity, Value};
use crate::error::AniseError;
use crate::eval::Evaluator;
use crate::fun::Func;
use crate::printer;

/// Uniform view for the numeric tower: int, rational, float, with the
/// usual contagion rules.
enum Num {
    I(i64),
    R(Rational64),
    F(f64),
}

fn num_of(v: &Value) -> Result<Num, AniseError> {
    match v {
        Value::Int(n) => Ok(Num::I(*n)),
        Value::Rational(r) => Ok(Num::R(*r)),
        Value::Float(f) => Ok(Num::F(*f)),
        other => Err(AniseError::type_error(format!(
            "expected a number, got {}",
            other.type_name()
        ))),
    }
}

fn num_value(n: Num) -> Value {
    match n {
        Num::I(i) => Value::Int(i),
        Num::R(r) if *r.denom() == 1 => Value::Int(*r.numer()),
        Num::R(r) => Value::Rational(r),
        Num::F(f) => Value::Float(f),
    }
}

fn as_f64(n: &Num) -> f64 {
    match n {
        Num::I(i) => *i as f64,
        Num::R(r) => *r.numer() as f64 / *r.denom() as f64,
        Num::F(f) => *f,
    }
}

fn as_rational(n: &Num) -> Rational64 {
    match n {
        Num::I(i) => Rational64::from_integer(*i),
        Num::R(r) => *r,
        Num::F(_) => unreachable!("float operands take the float path"),
    }
}

fn binary(
    a: Num,
    b: Num,
    ints: impl Fn(i64, i64) -> Option<i64>,
    rats: impl Fn(Rational64, Rational64) -> Rational64,
    floats: impl Fn(f64, f64) -> f64,
) -> Result<Num, AniseError> {
    match (&a, &b) {
        (Num::F(_), _) | (_, Num::F(_)) => Ok(Num::F(floats(as_f64(&a), as_f64(&b)))),
        (Num::I(x), Num::I(y)) => ints(*x, *y)
            .map(Num::I)
            .ok_or_else(|| AniseError::application("integer overflow")),
        _ => Ok(Num::R(rats(as_rational(&a), as_rational(&b)))),
    }
}

fn fold_arith(
    args: &[Value],
    unit: Num,
    ints: impl Fn(i64, i64) -> Option<i64> + Copy,
    rats: impl Fn(Rational64, Rational64) -> Rational64 + Copy,
    floats: impl Fn(f64, f64) -> f64 + Copy,
) -> Result<Value, AniseError> {
    let mut acc = match args.first() {
        Some(first) if args.len() > 1 => num_of(first)?,
        Some(first) => return Ok(num_value(binary(unit, num_of(first)?, ints, rats, floats)?)),
        None => return Ok(num_value(unit)),
    };
    for arg in &args[1..] {
        acc = binary(acc, num_of(arg)?, ints, rats, floats)?;
    }
    Ok(num_value(acc))
}

fn divide(a: Num, b: Num) -> Result<Num, AniseError> {
    let zero = match &b {
        Num::I(0) => true,
        Num::R(r) => *r.numer() == 0,
        Num::F(f) => *f == 0.0,
        _ => false,
    };
    if let (Num::F(_), _) | (_, Num::F(_)) = (&a, &b) {
        return Ok(Num::F(as_f64(&a) / as_f64(&b)));
    }
    if zero {
        return Err(AniseError::application("division by zero"));
    }
    Ok(Num::R(as_rational(&a) / as_rational(&b)))
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, AniseError> {
    let (x, y) = (num_of(a)?, num_of(b)?);
    match (&x, &y) {
        (Num::F(_), _) | (_, Num::F(_)) => as_f64(&x)
            .partial_cmp(&as_f64(&y))
            .ok_or_else(|| AniseError::type_error("cannot order NaN")),
        _ => Ok(as_rational(&x).cmp(&as_rational(&y))),
    }
}

fn ordered(
    args: &[Value],
    keep: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, AniseError> {
    for pair in args.windows(2) {
        if !keep(compare(&pair[0], &pair[1])?) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

pub fn install(ev: &Evaluator) -> Result<(), AniseError> {
    define_native(ev, "id", FnArity::exact(1), |_, args, _| Ok(args[0].clone()))?;

    define_native(ev, "+", FnArity::at_least(0), |_, args, _| {
        fold_arith(args, Num::I(0), |a, b| a.checked_add(b), |a, b| a + b, |a, b| a + b)
    })?;
    define_native(ev, "*", FnArity::at_least(0), |_, args, _| {
        fold_arith(args, Num::I(1), |a, b| a.checked_mul(b), |a, b| a * b, |a, b| a * b)
    })?;
    define_native(ev, "-", FnArity::at_least(1), |_, args, _| {
        fold_arith(args, Num::I(0), |a, b| a.checked_sub(b), |a, b| a - b, |a, b| a - b)
    })?;
    define_native(ev, "/", FnArity::at_least(1), |_, args, _| {
        if args.len() == 1 {
            return Ok(num_value(divide(Num::I(1), num_of(&args[0])?)?));
        }
        let mut acc = num_of(&args[0])?;
        for arg in &args[1..] {
            acc = divide(acc, num_of(arg)?)?;
        }
        Ok(num_value(acc))
    })?;
    define_native(ev, "rem", FnArity::exact(2), |_, args, _| {
        match (&args[0], &args[1]) {
            (Value::Int(_), Value::Int(0)) => Err(AniseError::application("division by zero")),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a % b)),
            (a, b) => Err(AniseError::type_error(format!(
                "rem expects integers, got {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        }
    })?;

    define_native(ev, "=", FnArity::at_least(2), |_, args, _| {
        Ok(Value::Bool(args.windows(2).all(|p| p[0] == p[1])))
    })?;
    define_native(ev, "/=", FnArity::at_least(2), |_, args, _| {
        Ok(Value::Bool(!args.windows(2).all(|p| p[0] == p[1])))
    })?;
    define_native(ev, "<", FnArity::at_least(2), |_, args, _| {
        ordered(args, std::cmp::Ordering::is_lt)
    })?;
    define_native(ev, ">", FnArity::at_least(2), |_, args, _| {
        ordered(args, std::cmp::Ordering::is_gt)
    })?;
    define_native(ev, "<=", FnArity::at_least(2), |_, args, _| {
        ordered(args, std::cmp::Ordering::is_le)
    })?;
    define_native(ev, ">=", FnArity::at_least(2), |_, args, _| {
        ordered(args, std::cmp::Ordering::is_ge)
    })?;

    define_native(ev, "not", FnArity::exact(1), |_, args, _| {
        Ok(Value::Bool(!truthy(&args[0])))
    })?;
    define_native(ev, "eq?", FnArity::exact(2), |_, args, _| {
        Ok(Value::Bool(args[0] == args[1]))
    })?;
    define_native(ev, "atom?", FnArity::exact(1), |_, args, _| {
        Ok(Value::Bool(args[0].is_atom()))
    })?;
    define_native(ev, "nothing?", FnArity::exact(1), |_, args, _| {
        Ok(Value::Bool(matches!(args[0], Value::Nothing)))
    })?;
    define_native(ev, "type-of", FnArity::exact(1), |ev, args, _| {
        Ok(Value::TypeName(ev.types().read().unwrap().tag_of(&args[0])))
    })?;

    install_predicates(ev)?;

    define_native(ev, "error!", FnArity::range(1, 2), |_, args, _| {
        let message = match &args[0] {
            Value::String(s) => s.clone(),
            other => printer::print_value(other),
        };
        let info = args.get(1).cloned().unwrap_or_else(|| Value::symbol("error"));
        Err(AniseError::custom(message, info))
    })?;
    define_native(ev, "error-msg", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::Error(e) => Ok(Value::string(e.message.clone())),
        other => Err(AniseError::type_error(format!(
            "error-msg applied to a {}",
            other.type_name()
        ))),
    })?;
    define_native(ev, "error-info", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::Error(e) => Ok(e.info.clone()),
        other => Err(AniseError::type_error(format!(
            "error-info applied to a {}",
            other.type_name()
        ))),
    })?;
    define_native(ev, "error-trace", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::Error(e) => Ok(Value::List(crate::seq::ListHandle::from_vec(
            e.trace.iter().map(|s| Value::string(s.clone())).collect(),
        ))),
        other => Err(AniseError::type_error(format!(
            "error-trace applied to a {}",
            other.type_name()
        ))),
    })?;

    define_native(ev, "box", FnArity::exact(1), |_, args, _| {
        Ok(Value::Box(BoxHandle::new(args[0].clone())))
    })?;
    define_native(ev, "box-set!", FnArity::exact(2), |_, args, _| match &args[0] {
        Value::Box(b) => {
            b.set(args[1].clone());
            Ok(args[1].clone())
        }
        other => Err(AniseError::type_error(format!(
            "box-set! applied to a {}",
            other.type_name()
        ))),
    })?;
    define_native(ev, "unbox", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::Box(b) => Ok(b.get()),
        Value::Delay(d) => Ok(d.poll()),
        other => Err(AniseError::type_error(format!(
            "unbox applied to a {}",
            other.type_name()
        ))),
    })?;
    define_native(ev, "eager", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::Lazy(l) => l.force(),
        other => Ok(other.clone()),
    })?;
    define_native(ev, "evaluate", FnArity::range(1, 2), |_, args, _| match &args[0] {
        Value::Delay(d) => match args.get(1) {
            None => Ok(d.wait()),
            Some(Value::Int(ms)) if *ms >= 0 => Ok(d.wait_timeout(*ms as u64)),
            Some(other) => Err(AniseError::type_error(format!(
                "evaluate timeout must be a non-negative int, got {}",
                printer::print_value(other)
            ))),
        },
        Value::Lazy(l) => l.force(),
        other => Ok(other.clone()),
    })?;

    define_native(ev, "gensym", FnArity::exact(0), |ev, _, _| Ok(ev.gensym_next()))?;

    define_native(ev, "string", FnArity::at_least(0), |_, args, _| {
        let mut out = String::new();
        for arg in args {
            out.push_str(&printer::print_value(arg));
        }
        Ok(Value::String(out))
    })?;
    define_native(ev, "symbol->string", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::Symbol(s) => Ok(Value::string(s.clone())),
        other => Err(AniseError::type_error(format!(
            "symbol->string applied to a {}",
            other.type_name()
        ))),
    })?;
    define_native(ev, "string->symbol", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::String(s) => Ok(Value::symbol(s.clone())),
        other => Err(AniseError::type_error(format!(
            "string->symbol applied to a {}",
            other.type_name()
        ))),
    })?;

    define_native(ev, "memoize", FnArity::exact(1), |_, args, _| match &args[0] {
        Value::Function(f) => Ok(Value::Function(Func::memoized(f.clone()))),
        other => Err(AniseError::type_error(format!(
            "memoize applied to a {}",
            other.type_name()
        ))),
    })?;
    define_native(ev, "partial", FnArity::at_least(1), |_, args, _| match &args[0] {
        Value::Function(f) => Ok(Value::Function(Func::partial(
            f.clone(),
            args[1..].to_vec(),
        ))),
        other => Err(AniseError::type_error(format!(
            "partial applied to a {}",
            other.type_name()
        ))),
    })?;
    define_native(ev, "apply", FnArity::at_least(2), |ev, args, env| {
        let Value::Function(f) = &args[0] else {
            return Err(AniseError::type_error(format!(
                "apply applied to a {}",
                args[0].type_name()
            )));
        };
        let mut full: Vec<Value> = args[1..args.len() - 1].to_vec();
        match &args[args.len() - 1] {
            Value::List(l) => {
                for item in l.iter() {
                    full.push(item?);
                }
            }
            Value::Vector(v) => full.extend(v.iter().cloned()),
            other => {
                return Err(AniseError::type_error(format!(
                    "apply needs a sequence of arguments, got {}",
                    other.type_name()
                )))
            }
        }
        f.call(ev, &full, env)
    })?;

    Ok(())
}

fn install_predicates(ev: &Evaluator) -> Result<(), AniseError> {
    macro_rules! predicate {
        ($name:literal, $pattern:pat) => {
            define_native(ev, $name, FnArity::exact(1), |_, args, _| {
                Ok(Value::Bool(matches!(&args[0], $pattern)))
            })?;
        };
    }
    predicate!("int?", Value::Int(_));
    predicate!("float?", Value::Float(_));
    predicate!("rational?", Value::Rational(_));
    predicate!("number?", Value::Int(_) | Value::Float(_) | Value::Rational(_));
    predicate!("string?", Value::String(_));
    predicate!("symbol?", Value::Symbol(_));
    predicate!("keyword?", Value::Keyword(_));
    predicate!("char?", Value::Char(_));
    predicate!("bool?", Value::Bool(_));
    predicate!("list?", Value::List(_));
    predicate!("vector?", Value::Vector(_));
    predicate!("map?", Value::Map(_));
    predicate!("set?", Value::Set(_));
    predicate!("fn?", Value::Function(_));
    predicate!("box?", Value::Box(_));
    predicate!("error?", Value::Error(_));
    predicate!("lazy?", Value::Lazy(_));
    predicate!("delay?", Value::Delay(_));
    Ok(())
}
