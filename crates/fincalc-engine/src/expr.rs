//! Restricted arithmetic expression evaluation.
//!
//! The explain capability accepts ad-hoc user formulas over named facts. The
//! grammar is an allowlist by construction: a dedicated tokenizer and
//! recursive-descent parser accept identifiers, numeric literals, and
//! `+ - * / ( )` and nothing else. Function calls, attribute access, string
//! literals, and every other construct fail at the first offending token.
//! There is no general-purpose evaluator behind this module to escape into.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := NUMBER | IDENT | '-' factor | '(' expr ')'
//! ```

use std::collections::{BTreeSet, HashMap};

use fincalc_core::{EngineError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Ident(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

fn unsafe_token(token: impl Into<String>) -> EngineError {
    EngineError::UnsafeExpression {
        token: token.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '0'..='9' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == '_' {
                        if d != '_' {
                            literal.push(d);
                        }
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = literal.parse().map_err(|_| unsafe_token(literal.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&a) = chars.peek() {
                    if a.is_ascii_alphanumeric() || a == '_' {
                        ident.push(a);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            // Quotes, dots, brackets, and anything exotic stop here.
            other => return Err(unsafe_token(other.to_string())),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn describe(token: &Token) -> String {
        match token {
            Token::Number(n) => n.to_string(),
            Token::Ident(s) => s.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinOp::Add),
            Some(Token::Minus) => Some(BinOp::Sub),
            _ => None,
        } {
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.factor()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinOp::Mul),
            Some(Token::Slash) => Some(BinOp::Div),
            _ => None,
        } {
            self.advance();
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                // An identifier followed by '(' would be a call; reject it.
                if self.peek() == Some(&Token::LParen) {
                    return Err(unsafe_token("("));
                }
                Ok(Expr::Ident(name))
            }
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(unsafe_token(Self::describe(&other))),
                    None => Err(unsafe_token(")")),
                }
            }
            Some(other) => Err(unsafe_token(Self::describe(&other))),
            None => Err(unsafe_token("<end of expression>")),
        }
    }
}

/// A parsed, validated arithmetic expression over named facts.
#[derive(Debug, Clone)]
pub struct ParsedExpression {
    ast: Expr,
    source: String,
}

impl ParsedExpression {
    /// Tokenizes and parses an expression, rejecting anything outside the
    /// arithmetic grammar with [`UnsafeExpression`] and the offending token.
    ///
    /// [`UnsafeExpression`]: EngineError::UnsafeExpression
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(unsafe_token("<empty expression>"));
        }
        let mut parser = Parser {
            tokens,
            position: 0,
        };
        let ast = parser.expr()?;
        if let Some(trailing) = parser.peek() {
            return Err(unsafe_token(Parser::describe(trailing)));
        }
        Ok(Self {
            ast,
            source: source.to_string(),
        })
    }

    /// The original expression text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every identifier the expression references, sorted and deduplicated.
    #[must_use]
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect_identifiers(&self.ast, &mut names);
        names
    }

    /// Evaluates the expression over bound fact values.
    ///
    /// Every referenced identifier must be bound; a missing one fails with
    /// [`UnboundIdentifier`] naming it so the caller can fetch it and retry.
    ///
    /// [`UnboundIdentifier`]: EngineError::UnboundIdentifier
    pub fn evaluate(&self, bindings: &HashMap<String, f64>) -> Result<f64> {
        eval(&self.ast, bindings)
    }
}

fn collect_identifiers(expr: &Expr, names: &mut BTreeSet<String>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Ident(name) => {
            names.insert(name.clone());
        }
        Expr::Neg(inner) => collect_identifiers(inner, names),
        Expr::Binary { lhs, rhs, .. } => {
            collect_identifiers(lhs, names);
            collect_identifiers(rhs, names);
        }
    }
}

fn eval(expr: &Expr, bindings: &HashMap<String, f64>) -> Result<f64> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Ident(name) => {
            bindings
                .get(name)
                .copied()
                .ok_or_else(|| EngineError::UnboundIdentifier { name: name.clone() })
        }
        Expr::Neg(inner) => Ok(-eval(inner, bindings)?),
        Expr::Binary { op, lhs, rhs } => {
            let l = eval(lhs, bindings)?;
            let r = eval(rhs, bindings)?;
            match op {
                BinOp::Add => Ok(l + r),
                BinOp::Sub => Ok(l - r),
                BinOp::Mul => Ok(l * r),
                BinOp::Div => {
                    if r == 0.0 {
                        Err(EngineError::InvalidCalculation(
                            "division by zero denominator".to_string(),
                        ))
                    } else {
                        Ok(l / r)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        let expr = ParsedExpression::parse("revenue - costOfRevenue * 2").unwrap();
        let value = expr
            .evaluate(&bindings(&[("revenue", 1000.0), ("costOfRevenue", 100.0)]))
            .unwrap();
        assert_eq!(value, 800.0);
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = ParsedExpression::parse("(revenue - costOfRevenue) * 2").unwrap();
        let value = expr
            .evaluate(&bindings(&[("revenue", 1000.0), ("costOfRevenue", 100.0)]))
            .unwrap();
        assert_eq!(value, 1800.0);
    }

    #[test]
    fn unary_minus_and_literals() {
        let expr = ParsedExpression::parse("-3.5 + revenue / 2").unwrap();
        let value = expr.evaluate(&bindings(&[("revenue", 10.0)])).unwrap();
        assert_eq!(value, 1.5);
    }

    #[test]
    fn collects_identifiers() {
        let expr = ParsedExpression::parse("revenue - costOfRevenue * revenue").unwrap();
        let names: Vec<String> = expr.identifiers().into_iter().collect();
        assert_eq!(names, vec!["costOfRevenue".to_string(), "revenue".to_string()]);
    }

    #[test]
    fn unbound_identifier_names_the_missing_fact() {
        let expr = ParsedExpression::parse("revenue - costOfRevenue").unwrap();
        let err = expr.evaluate(&bindings(&[("revenue", 1000.0)])).unwrap_err();
        assert_eq!(
            err,
            EngineError::UnboundIdentifier {
                name: "costOfRevenue".to_string(),
            }
        );
    }

    #[test]
    fn rejects_injection_attempts() {
        let malicious = [
            "__import__('os').system('ls')",
            "revenue.{}",
            "open(\"/etc/passwd\")",
            "revenue; costOfRevenue",
            "revenue[0]",
            "exec(payload)",
            "lambda: 1",
            "\"string\"",
            "revenue ** 2",
        ];
        for source in malicious {
            let err = ParsedExpression::parse(source).unwrap_err();
            assert!(
                matches!(err, EngineError::UnsafeExpression { .. }),
                "{source} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_function_call_syntax_on_idents() {
        // The tokenizer kills the argument separator before the parser ever
        // sees the call shape.
        let err = ParsedExpression::parse("max(revenue, 0)").unwrap_err();
        assert_eq!(err, unsafe_token(","));
        // Comma-free call syntax reaches the parser's ident-then-paren check.
        let err = ParsedExpression::parse("max(revenue)").unwrap_err();
        assert_eq!(err, unsafe_token("("));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(ParsedExpression::parse("revenue revenue").is_err());
        assert!(ParsedExpression::parse("1 + ").is_err());
        assert!(ParsedExpression::parse("(revenue").is_err());
        assert!(ParsedExpression::parse("").is_err());
    }

    #[test]
    fn division_by_zero_is_a_hard_error() {
        let expr = ParsedExpression::parse("revenue / 0").unwrap();
        let err = expr.evaluate(&bindings(&[("revenue", 1.0)])).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCalculation(_)));
    }
}
