// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Recursive-descent parser and evaluator for transformer conditions
//!. Deliberately a real grammar with precedence and
//! short-circuit evaluation, not a single `field == value` special case.
//!
//! Grammar (lowest to highest precedence):
//!   or_expr    := and_expr ( ("or" | "||") and_expr )*
//!   and_expr   := not_expr ( ("and" | "&&") not_expr )*
//!   not_expr   := ("not" | "!") not_expr | comparison
//!   comparison := additive ( cmp_op additive )?
//!   cmp_op     := "==" | "!=" | "<=" | ">=" | "<" | ">" | "in" | "not in"
//!   additive   := multiplicative ( ("+" | "-") multiplicative )*
//!   multiplicative := unary ( ("*" | "/") unary )*
//!   unary      := "-" unary | primary
//!   primary    := number | string | "true" | "false" | "null"
//!                | path | call | "(" or_expr ")"

use serde_json::Value;
use thiserror::Error;

use super::functions::{self, FunctionError};

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("unexpected end of condition")]
    UnexpectedEof,
    #[error("unexpected token {0:?} at position {1}")]
    UnexpectedToken(String, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("trailing input after a complete expression: {0:?}")]
    TrailingInput(String),
    #[error(transparent)]
    Function(#[from] FunctionError),
    #[error("cannot compare values of incompatible types")]
    Incomparable,
    #[error("unknown function {0:?} in condition")]
    UnknownFunction(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Ident(String),
    Symbol(&'static str),
    And,
    Or,
    Not,
    In,
    True,
    False,
    Null,
}

fn lex(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::Symbol("("));
                i += 1;
            }
            ')' => {
                tokens.push(Token::Symbol(")"));
                i += 1;
            }
            ',' => {
                tokens.push(Token::Symbol(","));
                i += 1;
            }
            '.' => {
                tokens.push(Token::Symbol("."));
                i += 1;
            }
            '+' => {
                tokens.push(Token::Symbol("+"));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Symbol("-"));
                i += 1;
            }
            '*' => {
                tokens.push(Token::Symbol("*"));
                i += 1;
            }
            '/' => {
                tokens.push(Token::Symbol("/"));
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Symbol("=="));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Symbol("!="));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Symbol("<="));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Symbol("<"));
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Symbol(">="));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Symbol(">"));
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ConditionError::UnterminatedString);
                }
                tokens.push(Token::String(chars[start..i].iter().collect()));
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text.parse().map_err(|_| ConditionError::UnexpectedToken(text, start))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == ':') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(ConditionError::UnexpectedToken(other.to_string(), i)),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_symbol(&mut self, sym: &'static str) -> Result<(), ConditionError> {
        match self.advance() {
            Some(Token::Symbol(s)) if s == sym => Ok(()),
            Some(other) => Err(ConditionError::UnexpectedToken(format!("{other:?}"), self.pos)),
            None => Err(ConditionError::UnexpectedEof),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_not()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Symbol("==")) => Some(CmpOp::Eq),
            Some(Token::Symbol("!=")) => Some(CmpOp::Ne),
            Some(Token::Symbol("<=")) => Some(CmpOp::Le),
            Some(Token::Symbol(">=")) => Some(CmpOp::Ge),
            Some(Token::Symbol("<")) => Some(CmpOp::Lt),
            Some(Token::Symbol(">")) => Some(CmpOp::Gt),
            Some(Token::In) => Some(CmpOp::In),
            Some(Token::Not) if matches!(self.tokens.get(self.pos + 1), Some(Token::In)) => Some(CmpOp::NotIn),
            _ => None,
        };
        let Some(op) = op else { return Ok(lhs) };
        match op {
            CmpOp::NotIn => {
                self.advance();
                self.advance();
            }
            _ => {
                self.advance();
            }
        }
        let rhs = self.parse_additive()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol("+")) => ArithOp::Add,
                Some(Token::Symbol("-")) => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol("*")) => ArithOp::Mul,
                Some(Token::Symbol("/")) => ArithOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if matches!(self.peek(), Some(Token::Symbol("-"))) {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(serde_json::json!(n))),
            Some(Token::String(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Symbol("(")) => {
                let inner = self.parse_or()?;
                self.expect_symbol(")")?;
                Ok(inner)
            }
            Some(Token::Ident(first)) => {
                if matches!(self.peek(), Some(Token::Symbol("("))) {
                    self.advance();
                    if !functions::is_known(&first) {
                        return Err(ConditionError::UnknownFunction(first));
                    }
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Token::Symbol(")"))) {
                        args.push(self.parse_or()?);
                        while matches!(self.peek(), Some(Token::Symbol(","))) {
                            self.advance();
                            args.push(self.parse_or()?);
                        }
                    }
                    self.expect_symbol(")")?;
                    return Ok(Expr::Call(first, args));
                }
                let mut segments = vec![first];
                while matches!(self.peek(), Some(Token::Symbol("."))) {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(seg)) => segments.push(seg),
                        other => return Err(ConditionError::UnexpectedToken(format!("{other:?}"), self.pos)),
                    }
                }
                Ok(Expr::Path(segments))
            }
            Some(other) => Err(ConditionError::UnexpectedToken(format!("{other:?}"), self.pos)),
            None => Err(ConditionError::UnexpectedEof),
        }
    }
}

pub fn parse(input: &str) -> Result<Expr, ConditionError> {
    let tokens = lex(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        let remaining = format!("{:?}", &parser.tokens[parser.pos..]);
        return Err(ConditionError::TrailingInput(remaining));
    }
    Ok(expr)
}

/// Data available to a condition: the triggering event's `data` payload
/// and its `_ksi_context`, both addressed by dotted path.
pub struct EvalEnv<'a> {
    pub data: &'a Value,
    pub context: &'a Value,
    pub now_epoch_ms: u64,
}

fn resolve_path<'a>(env: &EvalEnv<'a>, segments: &[String]) -> Value {
    let mut cursor = match segments.first().map(String::as_str) {
        Some("_ksi_context") => env.context,
        Some("data") => env.data,
        _ => env.data,
    };
    let rest: &[String] = match segments.first().map(String::as_str) {
        Some("_ksi_context") | Some("data") => &segments[1..],
        _ => segments,
    };
    for seg in rest {
        cursor = match cursor.get(seg) {
            Some(v) => v,
            None => return Value::Null,
        };
    }
    cursor.clone()
}

pub fn evaluate(expr: &Expr, env: &EvalEnv) -> Result<Value, ConditionError> {
    Ok(match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Path(segments) => resolve_path(env, segments),
        Expr::Call(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(evaluate(a, env)?);
            }
            functions::call(name, &values, env.now_epoch_ms)?
        }
        Expr::Not(inner) => Value::Bool(!truthy(&evaluate(inner, env)?)),
        Expr::Neg(inner) => {
            let v = evaluate(inner, env)?;
            Value::from(-v.as_f64().unwrap_or(0.0))
        }
        Expr::And(a, b) => Value::Bool(truthy(&evaluate(a, env)?) && truthy(&evaluate(b, env)?)),
        Expr::Or(a, b) => Value::Bool(truthy(&evaluate(a, env)?) || truthy(&evaluate(b, env)?)),
        Expr::Cmp(op, a, b) => Value::Bool(eval_cmp(*op, &evaluate(a, env)?, &evaluate(b, env)?)?),
        Expr::Arith(op, a, b) => eval_arith(*op, &evaluate(a, env)?, &evaluate(b, env)?),
    })
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn eval_cmp(op: CmpOp, a: &Value, b: &Value) -> Result<bool, ConditionError> {
    match op {
        CmpOp::Eq => Ok(a == b),
        CmpOp::Ne => Ok(a != b),
        CmpOp::In => Ok(member_of(a, b)),
        CmpOp::NotIn => Ok(!member_of(a, b)),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let (x, y) = match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x, y),
                _ => match (a.as_str(), b.as_str()) {
                    (Some(x), Some(y)) => {
                        return Ok(match op {
                            CmpOp::Lt => x < y,
                            CmpOp::Le => x <= y,
                            CmpOp::Gt => x > y,
                            CmpOp::Ge => x >= y,
                            _ => unreachable!(),
                        })
                    }
                    _ => return Err(ConditionError::Incomparable),
                },
            };
            Ok(match op {
                CmpOp::Lt => x < y,
                CmpOp::Le => x <= y,
                CmpOp::Gt => x > y,
                CmpOp::Ge => x >= y,
                _ => unreachable!(),
            })
        }
    }
}

fn member_of(needle: &Value, haystack: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.contains(needle),
        Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        Value::Object(map) => needle.as_str().map(|n| map.contains_key(n)).unwrap_or(false),
        _ => false,
    }
}

fn eval_arith(op: ArithOp, a: &Value, b: &Value) -> Value {
    let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
    let result = match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
    };
    serde_json::json!(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_str(src: &str, data: &Value) -> Value {
        let expr = parse(src).unwrap();
        let env = EvalEnv { data, context: &Value::Null, now_epoch_ms: 0 };
        evaluate(&expr, &env).unwrap()
    }

    #[test]
    fn equality_and_short_circuit_and() {
        let data = serde_json::json!({"status": "ok", "count": 3});
        assert_eq!(eval_str("status == \"ok\" and count > 2", &data), Value::Bool(true));
    }

    #[test]
    fn or_short_circuits_true() {
        let data = serde_json::json!({"status": "error"});
        assert_eq!(eval_str("status == \"ok\" or status == \"error\"", &data), Value::Bool(true));
    }

    #[test]
    fn not_and_parentheses_change_precedence() {
        let data = serde_json::json!({"a": true, "b": false});
        assert_eq!(eval_str("not (a and b)", &data), Value::Bool(true));
    }

    #[test]
    fn in_operator_checks_array_membership() {
        let data = serde_json::json!({"tag": "urgent", "tags": ["urgent", "bug"]});
        assert_eq!(eval_str("tag in tags", &data), Value::Bool(true));
        assert_eq!(eval_str("\"missing\" not in tags", &data), Value::Bool(true));
    }

    #[test]
    fn arithmetic_respects_precedence() {
        let data = serde_json::json!({"a": 2, "b": 3, "c": 4});
        assert_eq!(eval_str("a + b * c", &data), serde_json::json!(14.0));
    }

    #[test]
    fn function_call_in_condition() {
        let data = serde_json::json!({"items": [1, 2, 3]});
        assert_eq!(eval_str("len(items) == 3", &data), Value::Bool(true));
    }

    #[test]
    fn missing_path_resolves_to_null_not_error() {
        let data = serde_json::json!({});
        assert_eq!(eval_str("missing == null", &data), Value::Bool(true));
    }

    #[test]
    fn unknown_function_is_rejected_at_parse_time() {
        assert!(matches!(parse("eval(1)"), Err(ConditionError::UnknownFunction(name)) if name == "eval"));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn empty_env() -> EvalEnv<'static> {
        EvalEnv { data: &Value::Null, context: &Value::Null, now_epoch_ms: 0 }
    }

    proptest! {
        /// Any integer literal parses and evaluates back to itself.
        #[test]
        fn integer_literals_round_trip(n in -100_000i64..100_000) {
            let expr = parse(&n.to_string())?;
            let result = evaluate(&expr, &empty_env())?;
            prop_assert_eq!(result.as_f64(), Some(n as f64));
        }

        /// `true`/`false` parse to their own boolean value.
        #[test]
        fn boolean_literals_round_trip(b in any::<bool>()) {
            let expr = parse(if b { "true" } else { "false" })?;
            prop_assert_eq!(evaluate(&expr, &empty_env())?, Value::Bool(b));
        }

        /// `n == n` is true for every integer literal, and the negated form
        /// is false — exercises comparison and `not` together.
        #[test]
        fn a_literal_equals_itself_and_not_equal_is_false(n in -100_000i64..100_000) {
            let eq = parse(&format!("{n} == {n}"))?;
            let not_eq = parse(&format!("not ({n} == {n})"))?;
            prop_assert!(truthy(&evaluate(&eq, &empty_env())?));
            prop_assert!(!truthy(&evaluate(&not_eq, &empty_env())?));
        }

        /// Plain alphanumeric strings round-trip through the quoted string
        /// literal grammar unchanged.
        #[test]
        fn quoted_string_literals_round_trip(s in "[a-zA-Z0-9 ]{0,24}") {
            let src = format!("\"{s}\"");
            let expr = parse(&src)?;
            prop_assert_eq!(evaluate(&expr, &empty_env())?, Value::String(s));
        }
    }
}
