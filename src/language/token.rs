use crate::language::span::Span;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Whether whitespace separates this token from the previous one.
    pub spaced: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    UnaryOperator(String),
    BinaryOperator(String),

    Val,

    NewLine,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    At,
    Colon,
    Dollar,
    Equals,

    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Name(name) => format!("name `{name}`"),
            TokenKind::Int(value) => format!("integer `{value}`"),
            TokenKind::Float(value) => format!("float `{value}`"),
            TokenKind::String(_) => "string literal".into(),
            TokenKind::Bool(value) => format!("`{value}`"),
            TokenKind::UnaryOperator(op) | TokenKind::BinaryOperator(op) => format!("`{op}`"),
            TokenKind::Eof => "end of input".into(),
            TokenKind::NewLine => "end of line".into(),
            other => format!("`{other}`"),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Name(name) => name.as_str(),
            TokenKind::Int(value) => return write!(f, "{value}"),
            TokenKind::Float(value) => return write!(f, "{value}"),
            TokenKind::String(value) => return write!(f, "{value:?}"),
            TokenKind::Bool(value) => return write!(f, "{value}"),
            TokenKind::UnaryOperator(op) | TokenKind::BinaryOperator(op) => op.as_str(),
            TokenKind::Val => "val",
            TokenKind::NewLine => "\\n",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::At => "@",
            TokenKind::Colon => ":",
            TokenKind::Dollar => "$",
            TokenKind::Equals => "=",
            TokenKind::Eof => "<eof>",
        };
        f.write_str(text)
    }
}
