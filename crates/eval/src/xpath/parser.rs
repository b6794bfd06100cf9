//! Recursive-descent parser for the supported XPath subset.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr        := single ("," single)*
//! single      := "if" "(" expr ")" "then" single "else" single | or
//! or          := and ("or" and)*
//! and         := comparison ("and" comparison)*
//! comparison  := additive (compop additive)?
//! additive    := multiplicative (("+" | "-") multiplicative)*
//! multiplicative := unary (("*" | "div" | "idiv" | "mod") unary)*
//! unary       := ("-" | "+")* primary
//! primary     := literal | $var | "." | "(" expr? ")" | name "(" args ")"
//! ```

use xbrl_core::TypedValue;

use super::lexer::{Spanned, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// General comparisons (`=`, `<`) are existential over sequences; value
/// comparisons (`eq`, `lt`) require singletons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompKind {
    General,
    Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(TypedValue),
    Var(String),
    ContextItem,
    /// Comma operator and `()`.
    Sequence(Vec<Expr>),
    Neg(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Compare(CompKind, CompOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Call {
        prefix: Option<String>,
        local: String,
        args: Vec<Expr>,
    },
    If(Box<Expr>, Box<Expr>, Box<Expr>),
}

pub struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Spanned]) -> Self {
        Parser { tokens, pos: 0 }
    }

    /// Parse a complete expression; trailing tokens are an error.
    pub fn parse(mut self) -> Result<Expr, String> {
        let expr = self.parse_expr()?;
        if self.peek() != &Token::Eof {
            return Err(self.err(format!("unexpected {:?}", self.peek())));
        }
        Ok(expr)
    }

    // -- Token helpers -------------------------------------------

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        self.tokens
            .get(self.pos + ahead)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn is_name(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Name(w) if w == word)
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        if self.peek() == &token {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected {:?}, got {:?}", token, self.peek())))
        }
    }

    fn expect_name(&mut self, word: &str) -> Result<(), String> {
        if self.is_name(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', got {:?}", word, self.peek())))
        }
    }

    fn err(&self, message: String) -> String {
        let offset = self.tokens.get(self.pos).map(|s| s.offset).unwrap_or(0);
        format!("{} at offset {}", message, offset)
    }

    // -- Expressions ---------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let first = self.parse_single()?;
        if self.peek() != &Token::Comma {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.peek() == &Token::Comma {
            self.advance();
            items.push(self.parse_single()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn parse_single(&mut self) -> Result<Expr, String> {
        if self.is_name("if") && self.peek_at(1) == &Token::LParen {
            self.advance();
            self.expect(Token::LParen)?;
            let cond = self.parse_expr()?;
            self.expect(Token::RParen)?;
            self.expect_name("then")?;
            let then = self.parse_single()?;
            self.expect_name("else")?;
            let otherwise = self.parse_single()?;
            return Ok(Expr::If(Box::new(cond), Box::new(then), Box::new(otherwise)));
        }
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.is_name("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_comparison()?;
        while self.is_name("and") {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison_operator(&self) -> Option<(CompKind, CompOp)> {
        use CompKind::*;
        let op = match self.peek() {
            Token::Eq => (General, CompOp::Eq),
            Token::Neq => (General, CompOp::Ne),
            Token::Lt => (General, CompOp::Lt),
            Token::Lte => (General, CompOp::Le),
            Token::Gt => (General, CompOp::Gt),
            Token::Gte => (General, CompOp::Ge),
            Token::Name(w) => match w.as_str() {
                "eq" => (Value, CompOp::Eq),
                "ne" => (Value, CompOp::Ne),
                "lt" => (Value, CompOp::Lt),
                "le" => (Value, CompOp::Le),
                "gt" => (Value, CompOp::Gt),
                "ge" => (Value, CompOp::Ge),
                _ => return None,
            },
            _ => return None,
        };
        Some(op)
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let left = self.parse_additive()?;
        if let Some((kind, op)) = self.comparison_operator() {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::Compare(kind, op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Name(w) if w == "div" => ArithOp::Div,
                Token::Name(w) if w == "idiv" => ArithOp::IDiv,
                Token::Name(w) if w == "mod" => ArithOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Token::Minus => {
                self.advance();
                let inner = self.parse_unary()?;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Token::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.peek().clone() {
            Token::Int(n) => {
                self.advance();
                Ok(Expr::Literal(TypedValue::Integer(n)))
            }
            Token::Decimal(text) => {
                self.advance();
                let value = xbrl_core::parse_decimal(&text)
                    .ok_or_else(|| self.err(format!("invalid decimal literal '{}'", text)))?;
                Ok(Expr::Literal(TypedValue::Decimal(value)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(TypedValue::String(s)))
            }
            Token::Var(name) => {
                self.advance();
                Ok(Expr::Var(name))
            }
            Token::Dot => {
                self.advance();
                Ok(Expr::ContextItem)
            }
            Token::LParen => {
                self.advance();
                if self.peek() == &Token::RParen {
                    self.advance();
                    return Ok(Expr::Sequence(Vec::new()));
                }
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Name(name) if self.peek_at(1) == &Token::LParen => {
                self.advance();
                self.advance();
                let mut args = Vec::new();
                if self.peek() != &Token::RParen {
                    args.push(self.parse_single()?);
                    while self.peek() == &Token::Comma {
                        self.advance();
                        args.push(self.parse_single()?);
                    }
                }
                self.expect(Token::RParen)?;
                let (prefix, local) = match name.split_once(':') {
                    Some((p, l)) => (Some(p.to_string()), l.to_string()),
                    None => (None, name),
                };
                Ok(Expr::Call {
                    prefix,
                    local,
                    args,
                })
            }
            Token::Name(name) => Err(self.err(format!(
                "path expressions are not supported (found name '{}')",
                name
            ))),
            other => Err(self.err(format!("unexpected {:?}", other))),
        }
    }
}
