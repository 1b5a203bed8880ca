//! Restricted path-expression capability.
//!
//! Search parameter expressions and subscription trigger criteria are
//! compiled once at registration time and evaluated against resource trees.
//! The grammar is deliberately small: dotted member paths rooted at the
//! context resource or a bound variable (`%current`, `%previous`), equality
//! comparisons, `and`/`or`, the postfix functions `exists()`, `empty()` and
//! `not()`, and string/number/boolean literals.
//!
//! Evaluation uses collection semantics: a path selects a flattened list of
//! values, an unbound variable is an empty collection (never a null), and a
//! comparison with an empty operand is itself empty, which reads as false.

use crate::error::{CoreError, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Bound variables for trigger evaluation.
#[derive(Debug, Default, Clone)]
pub struct EvalContext {
    vars: HashMap<String, Vec<Value>>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable. `None` binds the empty collection, which is how an
    /// absent `%previous` (create) or absent `%current` (delete) is exposed.
    pub fn with_var(mut self, name: impl Into<String>, value: Option<&Value>) -> Self {
        let collection = match value {
            Some(v) => vec![v.clone()],
            None => Vec::new(),
        };
        self.vars.insert(name.into(), collection);
        self
    }

    fn get(&self, name: &str) -> Vec<Value> {
        self.vars.get(name).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Func {
    Exists,
    Empty,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Context(String),
    Var(String),
    Member(Box<Expr>, String),
    Call(Box<Expr>, Func),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// A compiled path expression.
#[derive(Debug, Clone)]
pub struct CompiledPath {
    source: String,
    expr: Expr,
}

impl CompiledPath {
    /// Compile an expression. Syntax errors are reported with the offending
    /// source; nothing is ever evaluated lazily.
    pub fn compile(source: &str) -> Result<Self> {
        let tokens = tokenize(source)
            .map_err(|message| CoreError::expression(source, message))?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser
            .expression()
            .map_err(|message| CoreError::expression(source, message))?;
        if parser.pos != parser.tokens.len() {
            return Err(CoreError::expression(source, "trailing input"));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Select values against a root tree without bound variables. This is
    /// the value-extraction entry point used by search parameters.
    pub fn select(&self, root: &Value) -> Vec<Value> {
        eval(&self.expr, root, &EvalContext::default())
    }

    /// Evaluate with bound variables, returning the raw collection.
    pub fn evaluate(&self, root: &Value, ctx: &EvalContext) -> Vec<Value> {
        eval(&self.expr, root, ctx)
    }

    /// Evaluate as a boolean criteria: true only for a result that is
    /// boolean true (an empty or non-boolean result reads as false).
    pub fn evaluate_bool(&self, root: &Value, ctx: &EvalContext) -> bool {
        match eval(&self.expr, root, ctx).first() {
            Some(Value::Bool(b)) => *b,
            _ => false,
        }
    }
}

fn eval(expr: &Expr, root: &Value, ctx: &EvalContext) -> Vec<Value> {
    match expr {
        Expr::Literal(v) => vec![v.clone()],
        Expr::Var(name) => ctx.get(name),
        Expr::Context(name) => {
            // A leading segment naming the resource type selects the root
            // itself; otherwise it is an ordinary member access.
            if root.get("resourceType").and_then(Value::as_str) == Some(name.as_str()) {
                vec![root.clone()]
            } else {
                select_member(std::slice::from_ref(root), name)
            }
        }
        Expr::Member(inner, field) => {
            let values = eval(inner, root, ctx);
            select_member(&values, field)
        }
        Expr::Call(inner, func) => {
            let values = eval(inner, root, ctx);
            let result = match func {
                Func::Exists => !values.is_empty(),
                Func::Empty => values.is_empty(),
                Func::Not => !collection_as_bool(&values),
            };
            vec![Value::Bool(result)]
        }
        Expr::Eq(lhs, rhs) => compare(lhs, rhs, root, ctx, false),
        Expr::Ne(lhs, rhs) => compare(lhs, rhs, root, ctx, true),
        Expr::And(lhs, rhs) => {
            let l = collection_as_bool(&eval(lhs, root, ctx));
            let r = collection_as_bool(&eval(rhs, root, ctx));
            vec![Value::Bool(l && r)]
        }
        Expr::Or(lhs, rhs) => {
            let l = collection_as_bool(&eval(lhs, root, ctx));
            let r = collection_as_bool(&eval(rhs, root, ctx));
            vec![Value::Bool(l || r)]
        }
    }
}

fn compare(lhs: &Expr, rhs: &Expr, root: &Value, ctx: &EvalContext, negate: bool) -> Vec<Value> {
    let l = eval(lhs, root, ctx);
    let r = eval(rhs, root, ctx);
    // Empty operand propagates emptiness, which downstream reads as false.
    if l.is_empty() || r.is_empty() {
        return Vec::new();
    }
    let equal = values_equal(&l[0], &r[0]);
    vec![Value::Bool(if negate { !equal } else { equal })]
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn collection_as_bool(values: &[Value]) -> bool {
    match values {
        [] => false,
        [Value::Bool(b)] => *b,
        _ => true,
    }
}

fn select_member(values: &[Value], field: &str) -> Vec<Value> {
    let mut out = Vec::new();
    for value in values {
        match value {
            Value::Object(map) => {
                if let Some(v) = map.get(field) {
                    flatten_into(v, &mut out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(map) = item
                        && let Some(v) = map.get(field)
                    {
                        flatten_into(v, &mut out);
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn flatten_into(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => out.extend(items.iter().cloned()),
        other => out.push(other.clone()),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Var(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    Dot,
    Eq,
    Ne,
}

fn tokenize(source: &str) -> std::result::Result<Vec<Tok>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            '.' => {
                tokens.push(Tok::Dot);
                i += 1;
            }
            '=' => {
                tokens.push(Tok::Eq);
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Ne);
                    i += 2;
                } else {
                    return Err("expected '=' after '!'".to_string());
                }
            }
            '%' => {
                i += 1;
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                if start == i {
                    return Err("expected variable name after '%'".to_string());
                }
                tokens.push(Tok::Var(chars[start..i].iter().collect()));
            }
            '\'' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
                if i == chars.len() {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Tok::Str(chars[start..i].iter().collect()));
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i < chars.len()
                    && chars[i] == '.'
                    && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
                {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Tok::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, tok: &Tok) -> std::result::Result<(), String> {
        match self.next() {
            Some(t) if &t == tok => Ok(()),
            other => Err(format!("expected {tok:?}, found {other:?}")),
        }
    }

    fn expression(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.and_expr()?;
        while matches!(self.peek(), Some(Tok::Ident(kw)) if kw == "or") {
            self.next();
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.equality()?;
        while matches!(self.peek(), Some(Tok::Ident(kw)) if kw == "and") {
            self.next();
            let rhs = self.equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> std::result::Result<Expr, String> {
        let lhs = self.postfix()?;
        match self.peek() {
            Some(Tok::Eq) => {
                self.next();
                let rhs = self.postfix()?;
                Ok(Expr::Eq(Box::new(lhs), Box::new(rhs)))
            }
            Some(Tok::Ne) => {
                self.next();
                let rhs = self.postfix()?;
                Ok(Expr::Ne(Box::new(lhs), Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn postfix(&mut self) -> std::result::Result<Expr, String> {
        let mut expr = self.primary()?;
        while matches!(self.peek(), Some(Tok::Dot)) {
            self.next();
            let name = match self.next() {
                Some(Tok::Ident(name)) => name,
                other => return Err(format!("expected member name after '.', found {other:?}")),
            };
            if matches!(self.peek(), Some(Tok::LParen)) {
                self.next();
                self.expect(&Tok::RParen)?;
                let func = match name.as_str() {
                    "exists" => Func::Exists,
                    "empty" => Func::Empty,
                    "not" => Func::Not,
                    other => return Err(format!("unknown function '{other}'")),
                };
                expr = Expr::Call(Box::new(expr), func);
            } else {
                expr = Expr::Member(Box::new(expr), name);
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> std::result::Result<Expr, String> {
        match self.next() {
            Some(Tok::LParen) => {
                let inner = self.expression()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Tok::Num(n)) => {
                let num = serde_json::Number::from_f64(n)
                    .ok_or_else(|| format!("invalid numeric literal {n}"))?;
                Ok(Expr::Literal(Value::Number(num)))
            }
            Some(Tok::Var(name)) => Ok(Expr::Var(name)),
            Some(Tok::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                _ => Ok(Expr::Context(name)),
            },
            other => Err(format!("expected expression, found {other:?}")),
        }
    }
}
