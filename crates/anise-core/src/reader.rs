use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{Key, Value};
use crate::error::AniseError;
use crate::seq::ListHandle;

/// One pass over the source splits it into tokens. Commas count as
/// whitespace, `;` comments run to end of line.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ;[^\n]*                    # comment
        | "(?:\\.|[^\\"])*"?       # string (possibly unterminated)
        | ~@ | \#\{ | \#\(        # two-char tokens
        | [\[\]{}()'`~@]           # one-char tokens
        | [^\s\[\]{}()'"`,;]+      # atom
        "#,
    )
    .unwrap()
});

pub fn tokenize(source: &str) -> Result<Vec<String>, AniseError> {
    let mut tokens = Vec::new();
    for m in TOKEN_RE.find_iter(source) {
        let tok = m.as_str();
        if tok.starts_with(';') {
            continue;
        }
        if tok.starts_with('"') && !is_terminated_string(tok) {
            return Err(AniseError::parse("unterminated string literal"));
        }
        tokens.push(tok.to_string());
    }
    Ok(tokens)
}

fn is_terminated_string(tok: &str) -> bool {
    let mut chars = tok.chars().skip(1);
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if chars.next().is_none() {
                    return false;
                }
            }
            '"' => return true,
            _ => {}
        }
    }
    false
}

/// Reads every form in the source.
pub fn read_source(source: &str) -> Result<Vec<Value>, AniseError> {
    let tokens = tokenize(source)?;
    let mut forms = Vec::new();
    let mut pos = 0;
    while pos < tokens.len() {
        forms.push(parse_form(&tokens, &mut pos)?);
    }
    Ok(forms)
}

fn parse_form(tokens: &[String], pos: &mut usize) -> Result<Value, AniseError> {
    let tok = tokens
        .get(*pos)
        .ok_or_else(|| AniseError::parse("unexpected end of input"))?
        .clone();
    *pos += 1;
    match tok.as_str() {
        "(" => Ok(Value::List(ListHandle::from_vec(parse_until(
            tokens, pos, ")",
        )?))),
        "[" => {
            let items = parse_until(tokens, pos, "]")?;
            Ok(Value::Vector(items.into_iter().collect()))
        }
        "{" => {
            let items = parse_until(tokens, pos, "}")?;
            if items.len() % 2 != 0 {
                return Err(AniseError::parse("map literal needs an even number of forms"));
            }
            let mut map = im::HashMap::new();
            let mut iter = items.into_iter();
            while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                map.insert(Key::from_value(&k)?, v);
            }
            Ok(Value::Map(map))
        }
        "#{" => {
            let items = parse_until(tokens, pos, "}")?;
            let mut set = im::HashSet::new();
            for item in items {
                set.insert(Key::from_value(&item)?);
            }
            Ok(Value::Set(set))
        }
        "#(" => {
            let items = parse_until(tokens, pos, ")")?;
            let body = Value::List(ListHandle::from_vec(items));
            Ok(Value::List(ListHandle::from_vec(vec![
                Value::symbol("hash-lambda"),
                body,
            ])))
        }
        "'" => wrap("quote", parse_form(tokens, pos)?),
        "`" => wrap("quasiquote", parse_form(tokens, pos)?),
        "~" => wrap("unquote", parse_form(tokens, pos)?),
        "~@" => wrap("unquote-splicing", parse_form(tokens, pos)?),
        "@" => wrap("unbox", parse_form(tokens, pos)?),
        ")" | "]" | "}" => Err(AniseError::parse(format!("unexpected {}", tok))),
        _ => parse_atom(&tok),
    }
}

fn parse_until(
    tokens: &[String],
    pos: &mut usize,
    closer: &str,
) -> Result<Vec<Value>, AniseError> {
    let mut items = Vec::new();
    loop {
        match tokens.get(*pos) {
            None => {
                return Err(AniseError::parse(format!(
                    "unexpected end of input, expected {}",
                    closer
                )))
            }
            Some(t) if t == closer => {
                *pos += 1;
                return Ok(items);
            }
            Some(_) => items.push(parse_form(tokens, pos)?),
        }
    }
}

fn wrap(head: &str, form: Value) -> Result<Value, AniseError> {
    Ok(Value::List(ListHandle::from_vec(vec![
        Value::symbol(head),
        form,
    ])))
}

fn parse_atom(tok: &str) -> Result<Value, AniseError> {
    match tok {
        "#t" | "true" => return Ok(Value::Bool(true)),
        "#f" | "false" => return Ok(Value::Bool(false)),
        "Nothing" => return Ok(Value::Nothing),
        _ => {}
    }
    if let Some(string) = tok.strip_prefix('"') {
        let raw = string.strip_suffix('"').unwrap_or(string);
        return Ok(Value::String(unescape(raw)?));
    }
    if let Some(c) = tok.strip_prefix('\\') {
        return parse_char(c);
    }
    if tok.starts_with("::") {
        // Type names resolve against the registry at evaluation time.
        return Ok(Value::symbol(tok));
    }
    if let Some(k) = tok.strip_prefix(':') {
        if k.is_empty() {
            return Err(AniseError::parse("empty keyword"));
        }
        return Ok(Value::keyword(k));
    }
    if let Some(n) = parse_number(tok) {
        return Ok(n);
    }
    Ok(Value::symbol(tok))
}

fn parse_number(tok: &str) -> Option<Value> {
    let (sign, digits) = match tok.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, tok.strip_prefix('+').unwrap_or(tok)),
    };
    if digits.is_empty() {
        return None;
    }
    if let Some(hex) = digits.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).ok().map(|n| Value::Int(sign * n));
    }
    if let Some(bin) = digits.strip_prefix("0b") {
        return i64::from_str_radix(bin, 2).ok().map(|n| Value::Int(sign * n));
    }
    if let Some((numer, denom)) = digits.split_once('/') {
        let n: i64 = numer.parse().ok()?;
        let d: i64 = denom.parse().ok()?;
        if d == 0 {
            return None;
        }
        return Some(Value::Rational(num_rational::Rational64::new(sign * n, d)));
    }
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if let Ok(n) = digits.parse::<i64>() {
        return Some(Value::Int(sign * n));
    }
    digits
        .parse::<f64>()
        .ok()
        .map(|f| Value::Float(sign as f64 * f))
}

fn parse_char(body: &str) -> Result<Value, AniseError> {
    match body {
        "newline" => return Ok(Value::Char('\n')),
        "space" => return Ok(Value::Char(' ')),
        "tab" => return Ok(Value::Char('\t')),
        _ => {}
    }
    if let Some(hex) = body.strip_prefix('u') {
        let code = u32::from_str_radix(hex, 16)
            .map_err(|_| AniseError::parse(format!("bad character escape \\{}", body)))?;
        return char::from_u32(code)
            .map(Value::Char)
            .ok_or_else(|| AniseError::parse(format!("bad character escape \\{}", body)));
    }
    let mut chars = body.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Char(c)),
        _ => Err(AniseError::parse(format!("bad character literal \\{}", body))),
    }
}

fn unescape(raw: &str) -> Result<String, AniseError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| AniseError::parse("bad \\u escape in string"))?;
                out.push(
                    char::from_u32(code)
                        .ok_or_else(|| AniseError::parse("bad \\u escape in string"))?,
                );
            }
            Some(other) => {
                return Err(AniseError::parse(format!(
                    "unknown string escape \\{}",
                    other
                )))
            }
            None => return Err(AniseError::parse("dangling escape in string")),
        }
    }
    Ok(out)
}

/// Convenience for natives that read code at runtime.
pub fn read_one(source: &str) -> Result<Value, AniseError> {
    let mut forms = read_source(source)?;
    match forms.len() {
        1 => Ok(forms.pop().unwrap_or(Value::Nothing)),
        0 => Ok(Value::Nothing),
        _ => Ok(Value::List(ListHandle::coded(Arc::new(forms)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_numbers() {
        assert_eq!(read_one("42").unwrap(), Value::Int(42));
        assert_eq!(read_one("-0x10").unwrap(), Value::Int(-16));
        assert_eq!(read_one("0b101").unwrap(), Value::Int(5));
        assert_eq!(read_one("2.5").unwrap(), Value::Float(2.5));
        assert_eq!(
            read_one("3/6").unwrap(),
            Value::Rational(num_rational::Rational64::new(1, 2))
        );
    }

    #[test]
    fn arithmetic_symbols_are_not_numbers() {
        assert_eq!(read_one("+").unwrap(), Value::symbol("+"));
        assert_eq!(read_one("-").unwrap(), Value::symbol("-"));
        assert_eq!(read_one("/").unwrap(), Value::symbol("/"));
    }

    #[test]
    fn reads_quote_sugar() {
        let form = read_one("'x").unwrap();
        let list = form.as_list().unwrap();
        assert_eq!(list.head().unwrap(), Value::symbol("quote"));
        assert_eq!(list.get(1).unwrap(), Value::symbol("x"));
    }

    #[test]
    fn reads_collections() {
        let form = read_one("{:a 1 :b 2}").unwrap();
        match form {
            Value::Map(m) => {
                assert_eq!(m.get(&Key::Keyword("a".into())), Some(&Value::Int(1)));
                assert_eq!(m.len(), 2);
            }
            other => panic!("expected a map, got {}", other.type_name()),
        }
        assert!(matches!(read_one("#{1 2 3}").unwrap(), Value::Set(_)));
        assert!(matches!(read_one("[1 2]").unwrap(), Value::Vector(_)));
    }

    #[test]
    fn comments_and_commas_are_skipped() {
        let forms = read_source("(1, 2) ; trailing\n3").unwrap();
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[1], Value::Int(3));
    }

    #[test]
    fn rejects_unbalanced_input() {
        assert!(read_source("(1 2").is_err());
        assert!(read_source("\"abc").is_err());
        assert!(read_source("{:a}").is_err());
    }

    #[test]
    fn hash_lambda_desugars() {
        let form = read_one("#(+ %1 1)").unwrap();
        let list = form.as_list().unwrap();
        assert_eq!(list.head().unwrap(), Value::symbol("hash-lambda"));
    }

    #[test]
    fn reads_chars_and_strings() {
        assert_eq!(read_one("\\a").unwrap(), Value::Char('a'));
        assert_eq!(read_one("\\newline").unwrap(), Value::Char('\n'));
        assert_eq!(read_one("\\u0041").unwrap(), Value::Char('A'));
        assert_eq!(
            read_one("\"a\\nb\"").unwrap(),
            Value::string("a\nb")
        );
    }
}
