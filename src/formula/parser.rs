use std::collections::BTreeMap;

use super::lexer::{tokenize, Spanned, Token};
use super::FormulaError;

/// Parenthesis/unary nesting limit; keeps recursion bounded on hostile input.
const MAX_DEPTH: usize = 64;

/// Operator chains build a tree as deep as the chain is long, so the token
/// count bounds recursion in `eval` and `check_identifiers`.
const MAX_TOKENS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Ident(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

/// Named constants available to every formula.
pub fn constant(name: &str) -> Option<f64> {
    match name {
        "PI" => Some(std::f64::consts::PI),
        "E" => Some(std::f64::consts::E),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, n: usize) -> bool {
        match self {
            Self::Exactly(k) => n == k,
            Self::AtLeast(k) => n >= k,
        }
    }

    fn describe(self) -> String {
        match self {
            Self::Exactly(k) => k.to_string(),
            Self::AtLeast(k) => format!("at least {k}"),
        }
    }
}

fn function_arity(name: &str) -> Option<Arity> {
    let arity = match name {
        "abs" | "sqrt" | "cbrt" | "ln" | "log" | "log10" | "log2" | "exp" | "floor" | "ceil"
        | "round" | "trunc" => Arity::Exactly(1),
        "pow" => Arity::Exactly(2),
        "min" | "max" => Arity::AtLeast(1),
        _ => return None,
    };
    Some(arity)
}

pub fn is_function(name: &str) -> bool {
    function_arity(name).is_some()
}

/// Parse a formula into an expression tree.
pub fn parse(input: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }
    if let Some(over) = tokens.get(MAX_TOKENS) {
        return Err(FormulaError::Syntax {
            offset: over.offset,
            message: format!("formula is longer than {MAX_TOKENS} tokens"),
        });
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        len: input.len(),
    };
    let expr = parser.additive()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(FormulaError::Syntax {
            offset: extra.offset,
            message: format!("unexpected {}", describe(&extra.token)),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|s| s.offset).unwrap_or(self.len)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, want: Token) -> Result<(), FormulaError> {
        match self.peek() {
            Some(t) if *t == want => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(FormulaError::Syntax {
                offset: self.offset(),
                message: format!("expected {}, found {}", describe(&want), describe(t)),
            }),
            None => Err(FormulaError::Syntax {
                offset: self.len,
                message: format!("expected {}, found end of formula", describe(&want)),
            }),
        }
    }

    fn enter(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::Syntax {
                offset: self.offset(),
                message: "formula is nested too deeply".into(),
            });
        }
        Ok(())
    }

    fn additive(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
    }

    // Unary minus binds looser than `^`: `-2^2` is `-(2^2)`.
    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.enter()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.enter()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => self.power(),
        }
    }

    // Right-associative: `2^3^2` is `2^(3^2)`.
    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.pos += 1;
            self.enter()?;
            let exponent = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    self.enter()?;
                    let args = self.arguments()?;
                    self.depth -= 1;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.additive()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(other) => Err(FormulaError::Syntax {
                offset,
                message: format!("unexpected {}", describe(&other)),
            }),
            None => Err(FormulaError::Syntax {
                offset: self.len,
                message: "unexpected end of formula".into(),
            }),
        }
    }

    // Opening parenthesis already consumed.
    fn arguments(&mut self) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.additive()?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                _ => {
                    self.expect(Token::RParen)?;
                    return Ok(args);
                }
            }
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {n}"),
        Token::Ident(name) => format!("identifier '{name}'"),
        Token::Plus => "'+'".into(),
        Token::Minus => "'-'".into(),
        Token::Star => "'*'".into(),
        Token::Slash => "'/'".into(),
        Token::Percent => "'%'".into(),
        Token::Caret => "'^'".into(),
        Token::LParen => "'('".into(),
        Token::RParen => "')'".into(),
        Token::Comma => "','".into(),
    }
}

/// Check every identifier and call in the tree against the declared variables.
pub fn check_identifiers(expr: &Expr, declared: &[String]) -> Result<(), FormulaError> {
    match expr {
        Expr::Number(_) => Ok(()),
        Expr::Ident(name) => {
            if declared.iter().any(|d| d == name) || constant(name).is_some() {
                Ok(())
            } else {
                Err(FormulaError::UnknownIdentifier(name.clone()))
            }
        }
        Expr::Neg(inner) => check_identifiers(inner, declared),
        Expr::Binary { lhs, rhs, .. } => {
            check_identifiers(lhs, declared)?;
            check_identifiers(rhs, declared)
        }
        Expr::Call { name, args } => {
            check_call(name, args.len())?;
            args.iter().try_for_each(|a| check_identifiers(a, declared))
        }
    }
}

fn check_call(name: &str, argc: usize) -> Result<(), FormulaError> {
    let arity = function_arity(name).ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;
    if !arity.accepts(argc) {
        return Err(FormulaError::Arity {
            function: name.to_string(),
            expected: arity.describe(),
            found: argc,
        });
    }
    Ok(())
}

/// Evaluate a parsed tree. Variables shadow the named constants.
pub fn eval(expr: &Expr, vars: &BTreeMap<String, f64>) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Ident(name) => vars
            .get(name)
            .copied()
            .or_else(|| constant(name))
            .ok_or_else(|| FormulaError::UnknownIdentifier(name.clone())),
        Expr::Neg(inner) => Ok(-eval(inner, vars)?),
        Expr::Binary { op, lhs, rhs } => {
            let a = eval(lhs, vars)?;
            let b = eval(rhs, vars)?;
            match op {
                BinaryOp::Add => Ok(a + b),
                BinaryOp::Sub => Ok(a - b),
                BinaryOp::Mul => Ok(a * b),
                BinaryOp::Div if b == 0.0 => Err(FormulaError::DivisionByZero),
                BinaryOp::Div => Ok(a / b),
                BinaryOp::Rem if b == 0.0 => Err(FormulaError::DivisionByZero),
                BinaryOp::Rem => Ok(a % b),
                BinaryOp::Pow => Ok(a.powf(b)),
            }
        }
        Expr::Call { name, args } => {
            check_call(name, args.len())?;
            let values = args
                .iter()
                .map(|a| eval(a, vars))
                .collect::<Result<Vec<f64>, FormulaError>>()?;
            Ok(apply(name, &values))
        }
    }
}

// Arity is checked by the caller.
fn apply(name: &str, v: &[f64]) -> f64 {
    match name {
        "abs" => v[0].abs(),
        "sqrt" => v[0].sqrt(),
        "cbrt" => v[0].cbrt(),
        "ln" | "log" => v[0].ln(),
        "log10" => v[0].log10(),
        "log2" => v[0].log2(),
        "exp" => v[0].exp(),
        "floor" => v[0].floor(),
        "ceil" => v[0].ceil(),
        "round" => v[0].round(),
        "trunc" => v[0].trunc(),
        "pow" => v[0].powf(v[1]),
        "min" => v.iter().copied().fold(f64::INFINITY, f64::min),
        "max" => v.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        _ => f64::NAN,
    }
}
