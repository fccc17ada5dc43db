//! Tokenizer and recursive-descent parser for the expression grammar.
//!
//! ```text
//! Expression       := SimpleExpression { Op1 SimpleExpression }
//! SimpleExpression := Element { Op2 Element }
//! Element          := '(' Expression ')' | 'delta' '(' Unit ')' | Unit
//! Unit             := NUMBER | IDENTIFIER
//! Op1              := '+' | '-' | '<' | '>' | '&' | '|'
//! Op2              := '*' | '/'
//! ```
//!
//! Chains of equal precedence nest to the left: `a-b-c` is `(a-b)-c`.

use super::{Expr, Operator, Unit};
use thiserror::Error;

/// Reasons an expression text was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected '{found}' at position {pos}")]
    Unexpected { found: String, pos: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unbalanced parentheses")]
    Unbalanced,

    #[error("delta() must wrap a single counter or constant")]
    DeltaNotUnit,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Unit(Unit),
    Delta,
    Open,
    Close,
    Op(Operator),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Unit(unit) => unit.to_string(),
            Token::Delta => "delta".to_string(),
            Token::Open => "(".to_string(),
            Token::Close => ")".to_string(),
            Token::Op(op) => op.symbol().to_string(),
        }
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, '(' | ')') || Operator::from_symbol(c).is_some()
}

fn classify_word(word: &str) -> Result<Unit, ParseError> {
    let invalid = || ParseError::InvalidNumber(word.to_string());

    if let Some(hex) = word
        .strip_prefix("0x")
        .or_else(|| word.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map(Unit::Integer)
            .map_err(|_| invalid());
    }

    let starts_numeric = word
        .chars()
        .next()
        .map(|c| c.is_ascii_digit() || c == '.')
        .unwrap_or(false);
    if !starts_numeric {
        return Ok(Unit::Ref {
            name: word.to_string(),
            delta: false,
        });
    }

    let dots = word.chars().filter(|&c| c == '.').count();
    let digits_only = word.chars().all(|c| c.is_ascii_digit() || c == '.');
    if !digits_only || dots > 1 || word == "." {
        return Err(invalid());
    }

    if dots == 0 {
        if let Ok(v) = word.parse::<u64>() {
            return Ok(Unit::Integer(v));
        }
    }
    // integers wider than 64 bits degrade to floating point
    word.parse::<f64>().map(Unit::Float).map_err(|_| invalid())
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    // positions stay char offsets into `text`
    let chars: Vec<(usize, char)> = text
        .chars()
        .enumerate()
        .filter(|(_, c)| !c.is_whitespace())
        .collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (at, c) = chars[i];
        if c == '(' {
            tokens.push((Token::Open, at));
            i += 1;
            continue;
        }
        if c == ')' {
            tokens.push((Token::Close, at));
            i += 1;
            continue;
        }
        if let Some(op) = Operator::from_symbol(c) {
            tokens.push((Token::Op(op), at));
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && !is_separator(chars[i].1) {
            i += 1;
        }
        let word: String = chars[start..i].iter().map(|(_, c)| *c).collect();
        if word == "delta" && chars.get(i).map(|(_, c)| *c) == Some('(') {
            tokens.push((Token::Delta, at));
        } else {
            tokens.push((Token::Unit(classify_word(&word)?), at));
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn unexpected(tok: &Token, pos: usize) -> ParseError {
        ParseError::Unexpected {
            found: tok.describe(),
            pos,
        }
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.simple_expression()?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if op.is_high_precedence() {
                break;
            }
            self.pos += 1;
            let rhs = self.simple_expression()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn simple_expression(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.element()?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if !op.is_high_precedence() {
                break;
            }
            self.pos += 1;
            let rhs = self.element()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn element(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some((Token::Open, _)) => {
                let inner = self.expression()?;
                match self.next() {
                    Some((Token::Close, _)) => Ok(inner),
                    Some((tok, pos)) => Err(Self::unexpected(&tok, pos)),
                    None => Err(ParseError::Unbalanced),
                }
            }
            Some((Token::Delta, _)) => self.delta(),
            Some((Token::Unit(unit), _)) => Ok(Expr::Unit(unit)),
            Some((tok, pos)) => Err(Self::unexpected(&tok, pos)),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    // The tokenizer only emits Delta when an opening parenthesis follows.
    fn delta(&mut self) -> Result<Expr, ParseError> {
        self.next();
        let unit = match self.next() {
            Some((Token::Unit(Unit::Ref { name, .. }), _)) => Unit::Ref { name, delta: true },
            Some((Token::Unit(constant), _)) => constant,
            Some(_) => return Err(ParseError::DeltaNotUnit),
            None => return Err(ParseError::Unbalanced),
        };
        match self.next() {
            Some((Token::Close, _)) => Ok(Expr::Unit(unit)),
            Some(_) => Err(ParseError::DeltaNotUnit),
            None => Err(ParseError::Unbalanced),
        }
    }
}

/// Parses an expression. Whitespace anywhere in `text` is ignored.
pub fn parse_expression(text: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression()?;
    match parser.next() {
        None => Ok(expr),
        Some((Token::Close, _)) => Err(ParseError::Unbalanced),
        Some((tok, pos)) => Err(Parser::unexpected(&tok, pos)),
    }
}
