//! Tokenizer and parser for the equation evaluator.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr     := additive ("to" ident)*
//! additive := multiplicative (("+" | "-") multiplicative)*
//! multiplicative := unary (("*" | "/" | "%") unary)*
//! unary    := ("-" | "+") unary | power
//! power    := postfix ("^" unary)?            -- right associative
//! postfix  := primary [unit-ident | "i"]      -- juxtaposition: 12.7 cm, 2i
//! primary  := number | ident | ident "(" args ")" | "(" expr ")" | matrix
//! matrix   := "[" row (";" row)* "]"  with  row := expr ("," expr)*
//! ```

use crate::error::CalcError;

use super::units;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    To,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Ident(String),
    Call(String, Vec<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Matrix(Vec<Vec<Expr>>),
    /// A value with a juxtaposed unit, e.g. `12.7 cm`.
    WithUnit(Box<Expr>, String),
    /// Unit conversion, e.g. `12.7 cm to inch`.
    Convert(Box<Expr>, String),
}

pub fn parse(input: &str) -> Result<Expr, CalcError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(CalcError::Parse("empty expression".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(CalcError::Parse(format!("unexpected trailing {}", describe(tok)))),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut pos = 0;

    while pos < chars.len() {
        let ch = chars[pos];
        match ch {
            c if c.is_whitespace() => pos += 1,
            '+' => {
                tokens.push(Token::Plus);
                pos += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                pos += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                pos += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                pos += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                pos += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                pos += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                pos += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                pos += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                pos += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                pos += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                    pos += 1;
                }
                // Exponent, only when followed by digits (so `2e` stays
                // a number plus the constant `e`).
                if pos < chars.len() && (chars[pos] == 'e' || chars[pos] == 'E') {
                    let mut look = pos + 1;
                    if look < chars.len() && (chars[look] == '+' || chars[look] == '-') {
                        look += 1;
                    }
                    if look < chars.len() && chars[look].is_ascii_digit() {
                        pos = look;
                        while pos < chars.len() && chars[pos].is_ascii_digit() {
                            pos += 1;
                        }
                    }
                }
                let text: String = chars[start..pos].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| CalcError::Parse(format!("invalid number `{text}`")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                let word: String = chars[start..pos].iter().collect();
                if word == "to" {
                    tokens.push(Token::To);
                } else {
                    tokens.push(Token::Ident(word));
                }
            }
            other => {
                return Err(CalcError::Parse(format!("unexpected character `{other}`")));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), CalcError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(CalcError::Parse(match self.peek() {
                Some(tok) => format!("expected {}, found {}", describe(&expected), describe(tok)),
                None => format!("expected {}, found end of input", describe(&expected)),
            }))
        }
    }

    fn expr(&mut self) -> Result<Expr, CalcError> {
        let mut left = self.additive()?;
        while self.eat(&Token::To) {
            let unit = match self.next() {
                Some(Token::Ident(name)) => name,
                Some(tok) => {
                    return Err(CalcError::Parse(format!(
                        "expected a unit after `to`, found {}",
                        describe(&tok)
                    )))
                }
                None => {
                    return Err(CalcError::Parse("expected a unit after `to`".into()));
                }
            };
            left = Expr::Convert(Box::new(left), unit);
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, CalcError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, CalcError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, CalcError> {
        let base = self.postfix()?;
        if self.eat(&Token::Caret) {
            let exponent = self.unary()?;
            Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)))
        } else {
            Ok(base)
        }
    }

    fn postfix(&mut self) -> Result<Expr, CalcError> {
        let value = self.primary()?;
        if let Some(Token::Ident(name)) = self.peek() {
            if name == "i" {
                let name = name.clone();
                self.pos += 1;
                return Ok(Expr::Binary(
                    BinOp::Mul,
                    Box::new(value),
                    Box::new(Expr::Ident(name)),
                ));
            }
            if units::lookup(name).is_some() {
                let name = name.clone();
                self.pos += 1;
                return Ok(Expr::WithUnit(Box::new(value), name));
            }
        }
        Ok(value)
    }

    fn primary(&mut self) -> Result<Expr, CalcError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if self.eat(&Token::Comma) {
                                continue;
                            }
                            self.expect(Token::RParen)?;
                            break;
                        }
                    }
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => self.matrix(),
            Some(tok) => Err(CalcError::Parse(format!("unexpected {}", describe(&tok)))),
            None => Err(CalcError::Parse("unexpected end of input".into())),
        }
    }

    fn matrix(&mut self) -> Result<Expr, CalcError> {
        let mut rows = Vec::new();
        let mut row = Vec::new();
        loop {
            row.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::Semicolon) => {
                    rows.push(std::mem::take(&mut row));
                    continue;
                }
                Some(Token::RBracket) => {
                    rows.push(row);
                    break;
                }
                Some(tok) => {
                    return Err(CalcError::Parse(format!(
                        "unexpected {} in matrix literal",
                        describe(&tok)
                    )))
                }
                None => {
                    return Err(CalcError::Parse("unterminated matrix literal".into()));
                }
            }
        }
        Ok(Expr::Matrix(rows))
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(value) => format!("number `{value}`"),
        Token::Ident(name) => format!("`{name}`"),
        Token::To => "`to`".into(),
        Token::Plus => "`+`".into(),
        Token::Minus => "`-`".into(),
        Token::Star => "`*`".into(),
        Token::Slash => "`/`".into(),
        Token::Percent => "`%`".into(),
        Token::Caret => "`^`".into(),
        Token::LParen => "`(`".into(),
        Token::RParen => "`)`".into(),
        Token::LBracket => "`[`".into(),
        Token::RBracket => "`]`".into(),
        Token::Comma => "`,`".into(),
        Token::Semicolon => "`;`".into(),
    }
}
