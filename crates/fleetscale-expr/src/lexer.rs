//! Tokenizer for scaling expressions.

use crate::error::{ExprError, ExprResult};

/// Inputs longer than this are rejected before tokenizing.
pub const MAX_SOURCE_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    True,
    False,
    /// Dotted variable path, e.g. `tasknodes.average.cpu`.
    Path(String),
    If,
    Else,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    LParen,
    RParen,
}

/// A token with the byte offset it started at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub fn tokenize(source: &str) -> ExprResult<Vec<Spanned>> {
    if source.len() > MAX_SOURCE_LEN {
        return Err(ExprError::TooLong {
            len: source.len(),
            limit: MAX_SOURCE_LEN,
        });
    }

    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                pos += 1;
            }
            let text = &source[start..pos];
            let token = if text.contains('.') {
                text.parse::<f64>()
                    .map(Token::Float)
                    .map_err(|_| ExprError::InvalidNumber(text.to_string()))?
            } else {
                text.parse::<i64>()
                    .map(Token::Int)
                    .map_err(|_| ExprError::InvalidNumber(text.to_string()))?
            };
            tokens.push(Spanned { token, offset: start });
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while pos < bytes.len()
                && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'.')
            {
                pos += 1;
            }
            let word = &source[start..pos];
            if word.ends_with('.') || word.contains("..") {
                return Err(ExprError::Syntax {
                    offset: start,
                    message: format!("malformed variable name '{word}'"),
                });
            }
            let token = match word {
                "if" => Token::If,
                "else" => Token::Else,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "True" | "true" => Token::True,
                "False" | "false" => Token::False,
                _ => Token::Path(word.to_string()),
            };
            tokens.push(Spanned { token, offset: start });
            continue;
        }

        let next = bytes.get(pos + 1).copied();
        let (token, width) = match (c, next) {
            (b'<', Some(b'=')) => (Token::Le, 2),
            (b'>', Some(b'=')) => (Token::Ge, 2),
            (b'=', Some(b'=')) => (Token::EqEq, 2),
            (b'!', Some(b'=')) => (Token::NotEq, 2),
            (b'<', _) => (Token::Lt, 1),
            (b'>', _) => (Token::Gt, 1),
            (b'+', _) => (Token::Plus, 1),
            (b'-', _) => (Token::Minus, 1),
            (b'*', _) => (Token::Star, 1),
            (b'/', _) => (Token::Slash, 1),
            (b'%', _) => (Token::Percent, 1),
            (b'(', _) => (Token::LParen, 1),
            (b')', _) => (Token::RParen, 1),
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(ExprError::UnexpectedChar { ch, offset: start });
            }
        };
        tokens.push(Spanned { token, offset: start });
        pos += width;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn numbers_and_paths() {
        assert_eq!(
            kinds("3 if tasknodes.average.cpu >= 0.7 else .5"),
            vec![
                Token::Int(3),
                Token::If,
                Token::Path("tasknodes.average.cpu".into()),
                Token::Ge,
                Token::Float(0.7),
                Token::Else,
                Token::Float(0.5),
            ]
        );
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            kinds("a<=b != c==d"),
            vec![
                Token::Path("a".into()),
                Token::Le,
                Token::Path("b".into()),
                Token::NotEq,
                Token::Path("c".into()),
                Token::EqEq,
                Token::Path("d".into()),
            ]
        );
    }

    #[test]
    fn rejects_foreign_characters() {
        assert_eq!(
            tokenize("__import__('os')").unwrap_err(),
            ExprError::UnexpectedChar { ch: '\'', offset: 11 }
        );
        assert!(matches!(tokenize("a; b"), Err(ExprError::UnexpectedChar { ch: ';', .. })));
    }

    #[test]
    fn rejects_malformed_numbers_and_paths() {
        assert!(matches!(tokenize("1.2.3"), Err(ExprError::InvalidNumber(_))));
        assert!(matches!(tokenize("tasknodes..cpu"), Err(ExprError::Syntax { .. })));
        assert!(matches!(tokenize("tasknodes."), Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn rejects_oversized_input() {
        let source = "1 + ".repeat(MAX_SOURCE_LEN);
        assert!(matches!(tokenize(&source), Err(ExprError::TooLong { .. })));
    }
}
