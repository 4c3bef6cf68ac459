use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::bytecode::opcode::lookup_by_name;
use crate::frontend::token::Token;

/// Position of a token's first character: 1-based line, 0-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexerError {
    #[error("source is not valid UTF-8 (first bad byte at offset {offset})")]
    BadUtf8 { offset: usize },

    #[error("{line}:{col}: {message}")]
    Syntax {
        message: String,
        line: usize,
        col: usize,
    },

    #[error("{line}:{col}: float literal {literal} is out of range")]
    Overflow {
        literal: String,
        line: usize,
        col: usize,
    },
}

impl LexerError {
    fn syntax(message: impl Into<String>, span: Span) -> Self {
        LexerError::Syntax {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            LexerError::BadUtf8 { .. } => None,
            LexerError::Syntax { line, .. } | LexerError::Overflow { line, .. } => Some(*line),
        }
    }

    pub fn col(&self) -> Option<usize> {
        match self {
            LexerError::BadUtf8 { .. } => None,
            LexerError::Syntax { col, .. } | LexerError::Overflow { col, .. } => Some(*col),
        }
    }
}

/// Validates `source` as UTF-8 and tokenizes it.
pub fn lex(source: &[u8]) -> Result<Vec<Spanned>, LexerError> {
    let text = std::str::from_utf8(source).map_err(|e| LexerError::BadUtf8 {
        offset: e.valid_up_to(),
    })?;
    let tokens = Lexer::new(text).tokenize()?;
    debug!(bytes = source.len(), tokens = tokens.len(), "lexed source");
    Ok(tokens)
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 0;
        } else if ch.is_some() {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    /// Skips whitespace and `;` comments.
    fn skip_trivia(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == ';' {
                while let Some(c) = self.current() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_quoted(&mut self, quote: char) -> Result<std::string::String, LexerError> {
        self.advance();

        let mut text = std::string::String::new();
        loop {
            match self.current() {
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(text);
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some(c @ ('\\' | '\'' | '"')) => {
                            text.push(c);
                            self.advance();
                        }
                        // Unknown escape: keep the backslash, lex the next char as usual
                        _ => text.push('\\'),
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
                None => {
                    let what = if quote == '"' { "string" } else { "atom" };
                    return Err(LexerError::syntax(
                        format!("unterminated {} literal", what),
                        self.span(),
                    ));
                }
            }
        }
    }

    fn read_binary(&mut self, start: Span) -> Result<Token, LexerError> {
        self.advance();

        let mut digits = std::string::String::new();
        loop {
            match self.current() {
                Some(':') => {
                    self.advance();
                    return Ok(Token::Binary(digits));
                }
                Some(c @ ('0' | '1')) => {
                    digits.push(c);
                    self.advance();
                }
                Some(c) => {
                    return Err(LexerError::syntax(
                        format!("unexpected character '{}' in binary literal", c),
                        start,
                    ));
                }
                None => {
                    return Err(LexerError::syntax(
                        "unterminated binary literal",
                        self.span(),
                    ));
                }
            }
        }
    }

    fn read_alphabetic(&mut self, allow_dot: bool) -> std::string::String {
        let mut word = std::string::String::new();
        while let Some(c) = self.current() {
            if c.is_alphabetic() || (allow_dot && c == '.') {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    fn read_directive(&mut self, start: Span) -> Result<Token, LexerError> {
        self.advance();
        let word = self.read_alphabetic(false);
        Token::directive(&word)
            .ok_or_else(|| LexerError::syntax(format!("unknown directive '.{}'", word), start))
    }

    fn read_opcode(&mut self, start: Span) -> Result<Token, LexerError> {
        let word = self.read_alphabetic(true);
        lookup_by_name(&word)
            .map(Token::Opcode)
            .ok_or_else(|| LexerError::syntax(format!("unknown opcode '{}'", word), start))
    }

    fn read_digits(&mut self, into: &mut std::string::String) {
        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                into.push(c);
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self, start: Span) -> Result<Token, LexerError> {
        let mut text = std::string::String::new();
        self.read_digits(&mut text);

        let is_float = self.current() == Some('.')
            && self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false);
        if !is_float {
            return Ok(Token::Integer(text));
        }

        text.push('.');
        self.advance();
        self.read_digits(&mut text);

        if let Some(e @ ('e' | 'E')) = self.current() {
            text.push(e);
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.current() {
                text.push(sign);
                self.advance();
            }
            let before = text.len();
            self.read_digits(&mut text);
            if text.len() == before {
                return Err(LexerError::syntax(
                    format!("expected exponent digits in float literal {}", text),
                    start,
                ));
            }
        }

        let value: f64 = text.parse().map_err(|_| {
            LexerError::syntax(format!("malformed float literal {}", text), start)
        })?;
        if !value.is_finite() {
            return Err(LexerError::Overflow {
                literal: text,
                line: start.line,
                col: start.col,
            });
        }

        Ok(Token::Float(text))
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia();
            let span = self.span();

            let token = match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('"') => Token::String(self.read_quoted('"')?),
                Some('\'') => Token::Atom(self.read_quoted('\'')?),
                Some(':') => self.read_binary(span)?,
                Some(c @ ('(' | ')' | '[' | ']')) => {
                    self.advance();
                    match c {
                        '(' => Token::ParenOpen,
                        ')' => Token::ParenClose,
                        '[' => Token::BracketOpen,
                        _ => Token::BracketClose,
                    }
                }
                Some('.') => self.read_directive(span)?,
                Some(c) if c.is_ascii_digit() => self.read_number(span)?,
                Some(c) if c.is_alphabetic() => self.read_opcode(span)?,
                Some(c) => {
                    return Err(LexerError::syntax(
                        format!("unexpected character '{}'", c),
                        span,
                    ));
                }
            };

            tokens.push(Spanned { token, span });
        }

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .filter(|t| !matches!(t, Token::Eof))
            .collect()
    }

    fn op(name: &str) -> Token {
        Token::Opcode(lookup_by_name(name).unwrap())
    }

    #[test]
    fn test_directives_and_strings() {
        let t = tokens(r#".fun "main" .arg "x" .reg "r" .blk "entry" .unw "h" "r""#);
        assert_eq!(
            t,
            vec![
                Token::Fun,
                Token::String("main".into()),
                Token::Arg,
                Token::String("x".into()),
                Token::Reg,
                Token::String("r".into()),
                Token::Blk,
                Token::String("entry".into()),
                Token::Unw,
                Token::String("h".into()),
                Token::String("r".into()),
            ]
        );
    }

    #[test]
    fn test_instruction_with_operands() {
        let t = tokens(r#"load.int "r" (42) jump.cond "r" ("yes" "no")"#);
        assert_eq!(
            t,
            vec![
                op("load.int"),
                Token::String("r".into()),
                Token::ParenOpen,
                Token::Integer("42".into()),
                Token::ParenClose,
                op("jump.cond"),
                Token::String("r".into()),
                Token::ParenOpen,
                Token::String("yes".into()),
                Token::String("no".into()),
                Token::ParenClose,
            ]
        );
    }

    #[test]
    fn test_brackets_atoms_and_binaries() {
        let t = tokens("tup.make [ ] load.atom 'ok' load.bin :0110: ::");
        assert_eq!(
            t,
            vec![
                op("tup.make"),
                Token::BracketOpen,
                Token::BracketClose,
                op("load.atom"),
                Token::Atom("ok".into()),
                op("load.bin"),
                Token::Binary("0110".into()),
                Token::Binary("".into()),
            ]
        );
    }

    #[test]
    fn test_escapes() {
        let t = tokens(r#""a\"b\\c" 'it\'s' "keep\n""#);
        assert_eq!(
            t,
            vec![
                Token::String("a\"b\\c".into()),
                Token::Atom("it's".into()),
                Token::String("keep\\n".into()),
            ]
        );
    }

    #[test]
    fn test_floats() {
        let t = tokens("1.5 2.0e10 3.25E-2 7");
        assert_eq!(
            t,
            vec![
                Token::Float("1.5".into()),
                Token::Float("2.0e10".into()),
                Token::Float("3.25E-2".into()),
                Token::Integer("7".into()),
            ]
        );
    }

    #[test]
    fn test_number_is_one_token() {
        assert_eq!(tokens("42"), vec![Token::Integer("42".into())]);
        assert_eq!(tokens("42.5e+1"), vec![Token::Float("42.5e+1".into())]);

        let spanned = Lexer::new("42.5e+1").tokenize().unwrap();
        assert_eq!(spanned.len(), 2);
        assert_eq!(spanned[1].token, Token::Eof);
        assert_eq!((spanned[1].span.line, spanned[1].span.col), (1, 7));
    }

    #[test]
    fn test_float_overflow() {
        let err = Lexer::new("load.flt \"r\" (1.0e999)").tokenize().unwrap_err();
        assert!(matches!(err, LexerError::Overflow { line: 1, col: 14, .. }));
    }

    #[test]
    fn test_missing_exponent_digits() {
        let err = Lexer::new("1.0e+").tokenize().unwrap_err();
        assert!(matches!(err, LexerError::Syntax { col: 0, .. }));
    }

    #[test]
    fn test_comments_and_spans() {
        let spanned = Lexer::new("; header\n  .fun \"f\" ; trailing\nnoop")
            .tokenize()
            .unwrap();
        let spans: Vec<_> = spanned.iter().map(|s| (s.span.line, s.span.col)).collect();
        assert_eq!(spans, vec![(2, 2), (2, 7), (3, 0), (3, 4)]);
        assert_eq!(spanned.last().unwrap().token, Token::Eof);
    }

    #[test]
    fn test_empty_input_is_just_eof() {
        let spanned = lex(b"").unwrap();
        assert_eq!(spanned.len(), 1);
        assert_eq!(spanned[0].token, Token::Eof);
        assert_eq!(spanned[0].span, Span { line: 1, col: 0 });
    }

    #[test]
    fn test_unterminated_string_reports_end_of_input() {
        let err = lex(b"noop\n\"abc").unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert_eq!(err.col(), Some(4));
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn test_unterminated_atom() {
        let err = lex(b"'abc").unwrap_err();
        assert!(err.to_string().contains("unterminated atom"));
    }

    #[test]
    fn test_bad_binary_digit() {
        let err = lex(b"  :012:").unwrap_err();
        assert_eq!(err.col(), Some(2));
    }

    #[test]
    fn test_unknown_directive_and_opcode() {
        assert!(lex(b".func \"f\"").unwrap_err().to_string().contains(".func"));
        assert!(lex(b"mov").unwrap_err().to_string().contains("unknown opcode 'mov'"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = lex(b"noop\n  #").unwrap_err();
        assert_eq!(
            err,
            LexerError::Syntax {
                message: "unexpected character '#'".into(),
                line: 2,
                col: 2,
            }
        );
    }

    #[test]
    fn test_bad_utf8_fails_before_tokens() {
        let err = lex(&[b'n', b'o', 0xff, b'p']).unwrap_err();
        assert_eq!(err, LexerError::BadUtf8 { offset: 2 });
        assert_eq!(err.line(), None);
    }
}
