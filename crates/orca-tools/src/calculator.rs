//! Calculator tool
//!
//! Evaluates arithmetic with a small recursive-descent parser:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := '-' unary | '+' unary | power
//! power   := primary ('^' unary)?
//! primary := number | constant | function '(' expr ')' | '(' expr ')'
//! ```

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Nesting limit for parentheses, signs and exponents
const MAX_DEPTH: usize = 256;

#[derive(Debug, Error, PartialEq)]
pub enum CalcError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
    #[error("Result is not a finite number")]
    NotFinite,
    #[error("Expression nested too deeply (limit {})", MAX_DEPTH)]
    TooDeep,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Op(op) => write!(f, "{}", op),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, CalcError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == '_' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = literal
                    .replace('_', "")
                    .parse()
                    .map_err(|_| CalcError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() {
                        name.push(d.to_ascii_lowercase());
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            other => return Err(CalcError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> std::result::Result<(), CalcError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> std::result::Result<f64, CalcError> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> std::result::Result<f64, CalcError> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err(CalcError::DivisionByZero),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    // Every recursive cycle of the grammar passes through here.
    fn unary(&mut self) -> std::result::Result<f64, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> std::result::Result<f64, CalcError> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // right-associative: 2^3^2 = 2^9
    fn power(&mut self) -> std::result::Result<f64, CalcError> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> std::result::Result<f64, CalcError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "pi" => Ok(std::f64::consts::PI),
                "e" => Ok(std::f64::consts::E),
                _ => {
                    let function = function(&name).ok_or_else(|| CalcError::UnknownIdentifier(name.clone()))?;
                    self.expect(Token::LParen)?;
                    let argument = self.expr()?;
                    self.expect(Token::RParen)?;
                    Ok(function(argument))
                }
            },
            Some(token) => Err(CalcError::UnexpectedToken(token.to_string())),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

fn function(name: &str) -> Option<fn(f64) -> f64> {
    Some(match name {
        "sqrt" => f64::sqrt,
        "abs" => f64::abs,
        "sin" => f64::sin,
        "cos" => f64::cos,
        "tan" => f64::tan,
        "ln" => f64::ln,
        "log" => f64::log10,
        "exp" => f64::exp,
        _ => return None,
    })
}

/// Evaluate an arithmetic expression
pub fn evaluate(expression: &str) -> std::result::Result<f64, CalcError> {
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(token) = parser.next() {
        return Err(CalcError::UnexpectedToken(token.to_string()));
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

/// Integers print without a fractional part
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[derive(Debug, Default)]
pub struct CalculatorTool;

#[derive(Debug, Deserialize)]
struct Input {
    expression: String,
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform arithmetic calculations. Supports + - * / % ^, parentheses, the functions \
sqrt, abs, sin, cos, tan, ln, log, exp and the constants pi and e."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .string(
                "expression",
                "Mathematical expression to evaluate (e.g., '2 + 2', 'sqrt(16) * 3', '2 ^ 10')",
                true,
            )
            .build()
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let input: Input = parse_input(input)?;
        match evaluate(&input.expression) {
            Ok(value) => Ok(ToolResult::success(format!(
                "Result: {} = {}",
                input.expression.trim(),
                format_number(value)
            ))),
            Err(e) => Ok(ToolResult::error(format!("Error: {}", e))),
        }
    }
}
