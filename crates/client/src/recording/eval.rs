// TTD - Time-Travel Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! A small expression evaluator over recorded scopes.
//!
//! Supported: number, string, `true`/`false`/`null` literals; identifiers looked
//! up through the scope chain; member access (`a.b`, `a[0]`, `xs.length`);
//! `!`; comparisons (`==`, `!=`, `<`, `<=`, `>`, `>=`); `&&` and `||` with
//! short-circuiting; parentheses.
//!
//! An operand skipped by short-circuiting is still parsed, so syntax errors are
//! reported, but lookups and comparisons inside it cannot fail.

use std::cmp::Ordering;

use eyre::{bail, eyre, Result};
use serde_json::{Number, Value};
use ttd_common::ScopeArena;

use crate::breakpoints::is_truthy;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

const OPERATORS: [&str; 16] =
    ["==", "!=", "<=", ">=", "&&", "||", "===", "!==", "<", ">", "!", "(", ")", ".", "[", "]"];

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n = text.parse::<f64>().map_err(|e| eyre!("Invalid number '{text}': {e}"))?;
            tokens.push(Token::Num(n));
        } else if c == '"' || c == '\'' {
            let start = i + 1;
            i = start;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            if i == chars.len() {
                bail!("Unterminated string in '{input}'");
            }
            tokens.push(Token::Str(chars[start..i].iter().collect()));
            i += 1;
        } else if is_ident_char(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            // Longest operator first so `===` wins over `==`.
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            let op = OPERATORS
                .iter()
                .filter(|op| rest.starts_with(**op))
                .max_by_key(|op| op.len())
                .ok_or_else(|| eyre!("Unexpected character '{c}' in '{input}'"))?;
            tokens.push(Token::Op(*op));
            i += op.len();
        }
    }
    Ok(tokens)
}

/// Deepest nesting of `!`, parentheses and index brackets
const MAX_NESTING: usize = 64;

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    scopes: &'a ScopeArena,
    /// Number of enclosing operands skipped by short-circuiting
    skipping: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn eat(&mut self, op: &str) -> bool {
        if self.peek_op() == Some(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, op: &str) -> Result<()> {
        if self.eat(op) {
            Ok(())
        } else {
            bail!("Expected '{op}'")
        }
    }

    /// Runtime failures inside a skipped operand evaluate to `null`
    fn lenient(&self, result: Result<Value>) -> Result<Value> {
        match result {
            Err(_) if self.skipping > 0 => Ok(Value::Null),
            other => other,
        }
    }

    fn operand(
        &mut self,
        skip: bool,
        parse: impl FnOnce(&mut Self) -> Result<Value>,
    ) -> Result<Value> {
        if !skip {
            return parse(self);
        }
        self.skipping += 1;
        let result = parse(self);
        self.skipping -= 1;
        result
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            bail!("Expression nested deeper than {MAX_NESTING} levels");
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn or(&mut self) -> Result<Value> {
        let mut left = self.and()?;
        while self.eat("||") {
            let decided = is_truthy(&left);
            let right = self.operand(decided, Self::and)?;
            if !decided {
                left = right;
            }
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value> {
        let mut left = self.comparison()?;
        while self.eat("&&") {
            let decided = !is_truthy(&left);
            let right = self.operand(decided, Self::comparison)?;
            if !decided {
                left = right;
            }
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Value> {
        let left = self.unary()?;
        let Some(op) = self.peek_op() else {
            return Ok(left);
        };
        if !matches!(op, "==" | "!=" | "===" | "!==" | "<" | "<=" | ">" | ">=") {
            return Ok(left);
        }
        self.pos += 1;
        let right = self.unary()?;

        let result = match op {
            "==" | "===" => loosely_equal(&left, &right),
            "!=" | "!==" => !loosely_equal(&left, &right),
            _ => match compare(&left, &right) {
                Ok(ordering) => match op {
                    "<" => ordering == Ordering::Less,
                    "<=" => ordering != Ordering::Greater,
                    ">" => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
                Err(_) if self.skipping > 0 => false,
                Err(e) => return Err(e),
            },
        };
        Ok(Value::Bool(result))
    }

    fn unary(&mut self) -> Result<Value> {
        if self.eat("!") {
            let value = self.nested(Self::unary)?;
            return Ok(Value::Bool(!is_truthy(&value)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Value> {
        let mut value = self.primary()?;
        loop {
            if self.eat(".") {
                let Some(Token::Ident(name)) = self.tokens.get(self.pos).cloned() else {
                    bail!("Expected a property name after '.'");
                };
                self.pos += 1;
                value = self.lenient(member(&value, &name))?;
            } else if self.eat("[") {
                let index = self.nested(Self::or)?;
                self.expect("]")?;
                let indexed = match (&value, &index) {
                    (Value::Array(items), Value::Number(n)) => Ok(n
                        .as_u64()
                        .and_then(|i| items.get(i as usize).cloned())
                        .unwrap_or(Value::Null)),
                    (_, Value::String(key)) => member(&value, key),
                    _ => Err(eyre!("Cannot index {value} with {index}")),
                };
                value = self.lenient(indexed)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn primary(&mut self) -> Result<Value> {
        let token = self.tokens.get(self.pos).cloned().ok_or_else(|| eyre!("Unexpected end"))?;
        self.pos += 1;
        match token {
            Token::Num(n) => Ok(number(n)),
            Token::Str(s) => Ok(Value::String(s)),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "null" | "undefined" => Ok(Value::Null),
                _ => {
                    let found = self.scopes.lookup(&name).cloned();
                    self.lenient(found.ok_or_else(|| eyre!("{name} is not defined")))
                }
            },
            Token::Op("(") => {
                let value = self.nested(Self::or)?;
                self.expect(")")?;
                Ok(value)
            }
            Token::Op(op) => bail!("Unexpected '{op}'"),
        }
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn member(value: &Value, name: &str) -> Result<Value> {
    match (value, name) {
        (Value::Array(items), "length") => Ok(Value::from(items.len())),
        (Value::String(s), "length") => Ok(Value::from(s.chars().count())),
        (Value::Object(fields), _) => Ok(fields.get(name).cloned().unwrap_or(Value::Null)),
        (Value::Null, _) => bail!("Cannot read property '{name}' of null"),
        _ => Ok(Value::Null),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            let (l, r) = (left.as_f64().unwrap_or(f64::NAN), right.as_f64().unwrap_or(f64::NAN));
            l.partial_cmp(&r).ok_or_else(|| eyre!("Cannot compare {l} and {r}"))
        }
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        _ => bail!("Cannot compare {left} and {right}"),
    }
}

/// Evaluate `expression` against a scope chain
pub fn evaluate(expression: &str, scopes: &ScopeArena) -> Result<Value> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        bail!("Empty expression");
    }
    let mut parser = Parser { tokens, pos: 0, scopes, skipping: 0, depth: 0 };
    let value = parser.or()?;
    if parser.pos != parser.tokens.len() {
        bail!("Unexpected trailing input in '{expression}'");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use ttd_common::{Binding, ScopeData, ScopeKind};

    use super::*;

    fn scopes() -> ScopeArena {
        ScopeArena::from_chain(vec![
            ScopeData {
                kind: ScopeKind::Function,
                bindings: vec![
                    Binding { name: "a".into(), value: json!(3) },
                    Binding { name: "name".into(), value: json!("ttd") },
                    Binding { name: "point".into(), value: json!({ "x": 1, "tags": ["p"] }) },
                ],
            },
            ScopeData {
                kind: ScopeKind::Global,
                bindings: vec![
                    Binding { name: "a".into(), value: json!(100) },
                    Binding { name: "limit".into(), value: json!(5) },
                ],
            },
        ])
    }

    #[test]
    fn test_literals_and_lookup() {
        let scopes = scopes();
        assert_eq!(evaluate("a", &scopes).unwrap(), json!(3));
        assert_eq!(evaluate("limit", &scopes).unwrap(), json!(5));
        assert_eq!(evaluate("'hi'", &scopes).unwrap(), json!("hi"));
        assert_eq!(evaluate("2.5", &scopes).unwrap(), json!(2.5));
        assert_eq!(evaluate("null", &scopes).unwrap(), Value::Null);
    }

    #[test]
    fn test_comparisons() {
        let scopes = scopes();
        assert_eq!(evaluate("a == 3", &scopes).unwrap(), json!(true));
        assert_eq!(evaluate("a === 3.0", &scopes).unwrap(), json!(true));
        assert_eq!(evaluate("a != 3", &scopes).unwrap(), json!(false));
        assert_eq!(evaluate("a < limit", &scopes).unwrap(), json!(true));
        assert_eq!(evaluate("a >= limit", &scopes).unwrap(), json!(false));
        assert_eq!(evaluate("name == \"ttd\"", &scopes).unwrap(), json!(true));
    }

    #[test]
    fn test_logical_and_member_access() {
        let scopes = scopes();
        assert_eq!(evaluate("a > 1 && point.x == 1", &scopes).unwrap(), json!(true));
        assert_eq!(evaluate("!(a > 1) || limit", &scopes).unwrap(), json!(5));
        assert_eq!(evaluate("point.tags[0]", &scopes).unwrap(), json!("p"));
        assert_eq!(evaluate("point.tags.length", &scopes).unwrap(), json!(1));
        assert_eq!(evaluate("point.missing", &scopes).unwrap(), Value::Null);
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        let scopes = scopes();
        assert_eq!(evaluate("false && missing", &scopes).unwrap(), json!(false));
        assert_eq!(evaluate("null == null || missing.x", &scopes).unwrap(), json!(true));
        assert_eq!(evaluate("a > 5 && name < 3", &scopes).unwrap(), json!(false));
        assert_eq!(evaluate("a == 3 || (missing[0] && nope)", &scopes).unwrap(), json!(true));

        // A guard that does not decide the result still evaluates the other side.
        assert!(evaluate("true && missing", &scopes).is_err());
        assert!(evaluate("false || missing.x", &scopes).is_err());
        // Skipped operands are still parsed.
        assert!(evaluate("false && (a ==", &scopes).is_err());
    }

    #[test]
    fn test_nesting_is_bounded() {
        let scopes = scopes();
        let shallow = format!("{}a{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(evaluate(&shallow, &scopes).unwrap(), json!(3));
        assert_eq!(evaluate(&format!("{}a", "!".repeat(10)), &scopes).unwrap(), json!(true));

        let parens = format!("{}a{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(evaluate(&parens, &scopes).is_err());
        assert!(evaluate(&format!("{}a", "!".repeat(10_000)), &scopes).is_err());
        let brackets = format!("{}0{}", "point.tags[".repeat(10_000), "]".repeat(10_000));
        assert!(evaluate(&brackets, &scopes).is_err());
    }

    #[test]
    fn test_errors() {
        let scopes = scopes();
        assert!(evaluate("missing", &scopes).is_err());
        assert!(evaluate("a <", &scopes).is_err());
        assert!(evaluate("a b", &scopes).is_err());
        assert!(evaluate("'open", &scopes).is_err());
        assert!(evaluate("", &scopes).is_err());
        assert!(evaluate("name < 3", &scopes).is_err());
    }
}
