//! Arithmetic expression handler: `+ - * /` and parentheses over f64,
//! evaluated by a small recursive-descent parser.

use crate::handlers::query_text;
use crate::registry::{Handler, HandlerOutput};
use serde_json::{Value, json};
use std::pin::Pin;

pub struct CalcHandler;

impl Handler for CalcHandler {
    fn name(&self) -> &str {
        "calc"
    }

    fn description(&self) -> &str {
        "Evaluates basic arithmetic expressions (+ - * / and parentheses)."
    }

    fn trigger_keywords(&self) -> &[&str] {
        &["+", "*", "/", "(", "calculate", "compute", "evaluate"]
    }

    fn invoke(
        &self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = HandlerOutput> + Send + '_>> {
        let output = match query_text(&input) {
            Some(query) => match extract_expression(query) {
                Some(expr) => match evaluate(&expr) {
                    Ok(value) => HandlerOutput::success(number_value(value)),
                    Err(e) => HandlerOutput::error(e),
                },
                None => HandlerOutput::error("no arithmetic expression found in query"),
            },
            None => HandlerOutput::error("input is missing a `query` string"),
        };
        Box::pin(async move { output })
    }
}

fn number_value(value: f64) -> Value {
    if value.fract().abs() < 1e-9 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

/// Longest substring made of expression characters that contains at least
/// one digit. Lets the handler work on prose like "please calculate
/// 12*(3+4)/2 for me".
fn extract_expression(query: &str) -> Option<String> {
    let mut best: Option<String> = None;
    let mut current = String::new();

    for ch in query.chars().chain(std::iter::once('\u{0}')) {
        if ch.is_ascii_digit() || "+-*/(). ".contains(ch) {
            current.push(ch);
        } else {
            let candidate = current.trim();
            if candidate.chars().any(|c| c.is_ascii_digit())
                && best.as_ref().is_none_or(|b| candidate.len() > b.len())
            {
                best = Some(candidate.to_string());
            }
            current.clear();
        }
    }

    best
}

fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens: Vec<char> = expr.chars().filter(|c| !c.is_whitespace()).collect();
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected trailing input in `{}`", expr));
    }
    Ok(value)
}

struct Parser {
    tokens: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            if op == '+' {
                value += rhs;
            } else {
                value -= rhs;
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err("division by zero".to_string());
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(')') {
                    return Err("missing closing parenthesis".to_string());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            other => Err(format!("unexpected token: {:?}", other)),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.tokens[start..self.pos].iter().collect();
        text.parse().map_err(|_| format!("invalid number `{}`", text))
    }
}
