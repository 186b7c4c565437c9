use crate::language::{
    span::Span,
    token::{Token, TokenKind},
};
use nom::{
    character::complete::{char, digit1},
    combinator::{opt, recognize},
    sequence::pair,
    IResult,
};

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let lexer = Lexer::new(source);
    lexer.run()
}

fn number_literal(input: &str) -> IResult<&str, &str> {
    recognize(pair(digit1, opt(pair(char('.'), digit1))))(input)
}

struct Lexer<'a> {
    src: &'a str,
    chars: std::str::Chars<'a>,
    current: Option<char>,
    offset: usize,
    spaced: bool,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        let mut chars = src.chars();
        let current = chars.next();
        Self {
            src,
            chars,
            current,
            offset: 0,
            spaced: true,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, Vec<LexError>> {
        while let Some(ch) = self.current {
            match ch {
                '#' => self.eat_comment(),
                '\n' | ';' => {
                    let start = self.offset;
                    self.bump();
                    self.push_token(TokenKind::NewLine, start, self.offset);
                    self.spaced = true;
                }
                ch if ch.is_whitespace() => {
                    self.bump();
                    self.spaced = true;
                }
                ch if ch.is_alphabetic() || ch == '_' => self.lex_name(),
                ch if ch.is_ascii_digit() => self.lex_number(),
                '"' => self.lex_string(),
                '\'' => self.lex_raw_string(),
                _ => self.lex_symbol(),
            }
        }
        self.push_token(TokenKind::Eof, self.offset, self.offset);

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    fn bump(&mut self) -> Option<char> {
        if let Some(ch) = self.current {
            self.offset += ch.len_utf8();
        }
        self.current = self.chars.next();
        self.current
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn push_token(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, end),
            spaced: self.spaced,
        });
        self.spaced = false;
    }

    fn error(&mut self, start: usize, end: usize, message: impl Into<String>) {
        self.errors.push(LexError {
            message: message.into(),
            span: Span::new(start, end),
        });
    }

    fn eat_comment(&mut self) {
        while let Some(ch) = self.current {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
        self.spaced = true;
    }

    fn lex_name(&mut self) {
        let start = self.offset;
        while let Some(ch) = self.current {
            if ch.is_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }

        let end = self.offset;
        let kind = match &self.src[start..end] {
            "val" => TokenKind::Val,
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            "and" | "or" => TokenKind::BinaryOperator(self.src[start..end].to_string()),
            name => TokenKind::Name(name.to_string()),
        };
        self.push_token(kind, start, end);
    }

    fn lex_number(&mut self) {
        let start = self.offset;
        let literal = match number_literal(&self.src[start..]) {
            Ok((_, literal)) => literal,
            Err(_) => {
                self.bump();
                self.error(start, self.offset, "Invalid number literal");
                return;
            }
        };
        for _ in literal.chars() {
            self.bump();
        }

        let kind = if literal.contains('.') {
            match literal.parse::<f64>() {
                Ok(value) => TokenKind::Float(value),
                Err(_) => {
                    self.error(start, self.offset, "Invalid float literal");
                    return;
                }
            }
        } else {
            match literal.parse::<i64>() {
                Ok(value) => TokenKind::Int(value),
                Err(_) => {
                    self.error(start, self.offset, "Integer literal is too large");
                    return;
                }
            }
        };
        self.push_token(kind, start, self.offset);
    }

    fn lex_string(&mut self) {
        let start = self.offset;
        self.bump();
        let mut value = String::new();

        loop {
            match self.current {
                None => {
                    self.error(start, self.offset, "Unterminated string literal");
                    return;
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    let escape_start = self.offset;
                    match self.bump() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('"') => value.push('"'),
                        Some('\\') => value.push('\\'),
                        Some(other) => {
                            self.error(
                                escape_start,
                                self.offset + other.len_utf8(),
                                format!("Unknown escape sequence `\\{other}`"),
                            );
                        }
                        None => continue,
                    }
                    self.bump();
                }
                Some(ch) => {
                    value.push(ch);
                    self.bump();
                }
            }
        }

        self.push_token(TokenKind::String(value), start, self.offset);
    }

    fn lex_raw_string(&mut self) {
        let start = self.offset;
        self.bump();
        let content_start = self.offset;

        while let Some(ch) = self.current {
            if ch == '\'' {
                let value = self.src[content_start..self.offset].to_string();
                self.bump();
                self.push_token(TokenKind::String(value), start, self.offset);
                return;
            }
            self.bump();
        }
        self.error(start, self.offset, "Unterminated string literal");
    }

    fn lex_symbol(&mut self) {
        let start = self.offset;
        let Some(ch) = self.current else {
            return;
        };
        let next = self.peek();
        self.bump();

        let kind = match (ch, next) {
            ('=', Some('=')) | ('!', Some('=')) | ('<', Some('=')) | ('>', Some('=')) => {
                self.bump();
                TokenKind::BinaryOperator(self.src[start..self.offset].to_string())
            }
            ('+' | '-' | '*' | '/' | '<' | '>', _) => TokenKind::BinaryOperator(ch.to_string()),
            ('!', _) => TokenKind::UnaryOperator("!".into()),
            ('=', _) => TokenKind::Equals,
            ('(', _) => TokenKind::LParen,
            (')', _) => TokenKind::RParen,
            ('{', _) => TokenKind::LBrace,
            ('}', _) => TokenKind::RBrace,
            ('[', _) => TokenKind::LBracket,
            (']', _) => TokenKind::RBracket,
            (',', _) => TokenKind::Comma,
            ('.', _) => TokenKind::Dot,
            ('@', _) => TokenKind::At,
            (':', _) => TokenKind::Colon,
            ('$', _) => TokenKind::Dollar,
            (other, _) => {
                self.error(start, self.offset, format!("Unexpected character `{other}`"));
                return;
            }
        };
        self.push_token(kind, start, self.offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lexing failed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_literals_and_operators() {
        assert_eq!(
            kinds("41 + 1.5 == \"a\\n\" and !true"),
            vec![
                TokenKind::Int(41),
                TokenKind::BinaryOperator("+".into()),
                TokenKind::Float(1.5),
                TokenKind::BinaryOperator("==".into()),
                TokenKind::String("a\n".into()),
                TokenKind::BinaryOperator("and".into()),
                TokenKind::UnaryOperator("!".into()),
                TokenKind::Bool(true),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn semicolons_and_comments_separate_statements() {
        assert_eq!(
            kinds("val a = 1; a # trailing\n'raw\\n'"),
            vec![
                TokenKind::Val,
                TokenKind::Name("a".into()),
                TokenKind::Equals,
                TokenKind::Int(1),
                TokenKind::NewLine,
                TokenKind::Name("a".into()),
                TokenKind::NewLine,
                TokenKind::String("raw\\n".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn records_whitespace_before_tokens() {
        let tokens = lex("f(1) f (1)").expect("lexing failed");
        let spaced: Vec<bool> = tokens.iter().map(|token| token.spaced).collect();
        assert_eq!(spaced, vec![true, false, false, false, true, true, false, false, false]);
    }

    #[test]
    fn method_call_on_integer_is_not_a_float() {
        assert_eq!(
            kinds("1.toFloat"),
            vec![
                TokenKind::Int(1),
                TokenKind::Dot,
                TokenKind::Name("toFloat".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reports_unterminated_strings() {
        let errors = lex("\"abc").expect_err("expected a lexing error");
        assert_eq!(errors[0].message, "Unterminated string literal");
    }
}
