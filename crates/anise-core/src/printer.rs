use std::fmt;

use crate::ast::Value;

/// User-facing rendering: strings and chars print raw.
pub fn print_value(value: &Value) -> String {
    render(value, false)
}

/// Read-syntax rendering: strings quoted and escaped, chars in `\x` form.
/// Also the memoization cache key.
pub fn print_readable(value: &Value) -> String {
    render(value, true)
}

pub fn print_args(args: &[Value]) -> String {
    let parts: Vec<String> = args.iter().map(print_readable).collect();
    parts.join(" ")
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn render_char(c: char) -> String {
    match c {
        '\n' => "\\newline".to_string(),
        ' ' => "\\space".to_string(),
        '\t' => "\\tab".to_string(),
        _ => format!("\\{}", c),
    }
}

fn render(value: &Value, readable: bool) -> String {
    match value {
        Value::Nothing => "Nothing".to_string(),
        Value::Bool(true) => "#t".to_string(),
        Value::Bool(false) => "#f".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => {
            if f.fract() == 0.0 && f.is_finite() {
                format!("{:.1}", f)
            } else {
                f.to_string()
            }
        }
        Value::Rational(r) => format!("{}/{}", r.numer(), r.denom()),
        Value::Char(c) => {
            if readable {
                render_char(*c)
            } else {
                c.to_string()
            }
        }
        Value::Symbol(s) => s.clone(),
        Value::Keyword(k) => format!(":{}", k),
        Value::String(s) => {
            if readable {
                escape_string(s)
            } else {
                s.clone()
            }
        }
        Value::List(list) => {
            let mut parts = Vec::new();
            for item in list.iter() {
                match item {
                    Ok(v) => parts.push(render(&v, readable)),
                    Err(_) => {
                        parts.push("...".to_string());
                        break;
                    }
                }
            }
            format!("({})", parts.join(" "))
        }
        Value::Vector(items) => {
            let parts: Vec<String> = items.iter().map(|v| render(v, readable)).collect();
            format!("[{}]", parts.join(" "))
        }
        Value::Map(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| {
                    format!("{} {}", render(&k.to_value(), readable), render(v, readable))
                })
                .collect();
            format!("{{{}}}", parts.join(" "))
        }
        Value::Set(set) => {
            let parts: Vec<String> = set
                .iter()
                .map(|k| render(&k.to_value(), readable))
                .collect();
            format!("#{{{}}}", parts.join(" "))
        }
        Value::Box(b) => format!("(box {})", render(&b.get(), readable)),
        Value::Record(r) => {
            let parts: Vec<String> = r.attrs.iter().map(|v| render(v, readable)).collect();
            format!("#<{} {}>", r.type_name, parts.join(" "))
        }
        Value::Error(e) => format!("#<error: {}>", e.message),
        Value::Function(f) => format!("#<function {}>", f.name()),
        Value::TypeName(t) => format!("::{}", t.name),
        Value::Lazy(l) => {
            if l.is_realized() {
                "#<lazy (realized)>".to_string()
            } else {
                "#<lazy>".to_string()
            }
        }
        Value::Delay(d) => {
            if d.is_realized() {
                "#<delay (realized)>".to_string()
            } else {
                "#<delay>".to_string()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_value(self))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_readable(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::ListHandle;

    #[test]
    fn readable_round_trips_strings() {
        let v = Value::string("a\"b\nc");
        assert_eq!(print_readable(&v), "\"a\\\"b\\nc\"");
        assert_eq!(print_value(&v), "a\"b\nc");
    }

    #[test]
    fn lists_print_in_read_syntax() {
        let list = ListHandle::from_vec(vec![
            Value::symbol("+"),
            Value::Int(1),
            Value::Rational(num_rational::Rational64::new(1, 2)),
        ]);
        assert_eq!(print_readable(&Value::List(list)), "(+ 1 1/2)");
    }

    #[test]
    fn floats_keep_a_decimal_point() {
        assert_eq!(print_value(&Value::Float(2.0)), "2.0");
        assert_eq!(print_value(&Value::Float(2.5)), "2.5");
    }
}
