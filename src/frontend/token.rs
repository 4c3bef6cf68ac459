use serde::Serialize;

use crate::bytecode::opcode::OpcodeDef;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Token {
    // Literals (text is kept verbatim, escapes already resolved)
    String(std::string::String),
    Atom(std::string::String),
    Integer(std::string::String),
    Float(std::string::String),
    Binary(std::string::String),

    // Directives
    Fun,
    Arg,
    Reg,
    Blk,
    Unw,

    // Delimiters
    ParenOpen,    // (
    ParenClose,   // )
    BracketOpen,  // [
    BracketClose, // ]

    Opcode(&'static OpcodeDef),

    Eof,
}

impl Token {
    /// Maps a directive word (without the leading dot) to its token.
    pub fn directive(word: &str) -> Option<Token> {
        match word {
            "fun" => Some(Token::Fun),
            "arg" => Some(Token::Arg),
            "reg" => Some(Token::Reg),
            "blk" => Some(Token::Blk),
            "unw" => Some(Token::Unw),
            _ => None,
        }
    }

    pub fn is_directive(&self) -> bool {
        matches!(
            self,
            Token::Fun | Token::Arg | Token::Reg | Token::Blk | Token::Unw
        )
    }

    /// Short human name of the token class, used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            Token::String(_) => "string",
            Token::Atom(_) => "atom",
            Token::Integer(_) => "integer",
            Token::Float(_) => "float",
            Token::Binary(_) => "binary",
            Token::Fun | Token::Arg | Token::Reg | Token::Blk | Token::Unw => "directive",
            Token::ParenOpen => "'('",
            Token::ParenClose => "')'",
            Token::BracketOpen => "'['",
            Token::BracketClose => "']'",
            Token::Opcode(_) => "opcode",
            Token::Eof => "end of input",
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Atom(s) => write!(f, "'{}'", s),
            Token::Integer(s) | Token::Float(s) => write!(f, "{}", s),
            Token::Binary(s) => write!(f, ":{}:", s),
            Token::Fun => write!(f, ".fun"),
            Token::Arg => write!(f, ".arg"),
            Token::Reg => write!(f, ".reg"),
            Token::Blk => write!(f, ".blk"),
            Token::Unw => write!(f, ".unw"),
            Token::ParenOpen => write!(f, "("),
            Token::ParenClose => write!(f, ")"),
            Token::BracketOpen => write!(f, "["),
            Token::BracketClose => write!(f, "]"),
            Token::Opcode(op) => write!(f, "{}", op.name),
            Token::Eof => write!(f, "<eof>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcode::lookup_by_name;

    #[test]
    fn test_directive_words() {
        assert_eq!(Token::directive("fun"), Some(Token::Fun));
        assert_eq!(Token::directive("unw"), Some(Token::Unw));
        assert_eq!(Token::directive("func"), None);
        assert!(Token::Blk.is_directive());
        assert!(!Token::Eof.is_directive());
    }

    #[test]
    fn test_display() {
        let op = lookup_by_name("jump.ret").unwrap();
        assert_eq!(Token::Opcode(op).to_string(), "jump.ret");
        assert_eq!(Token::Binary("101".into()).to_string(), ":101:");
        assert_eq!(Token::Atom("big".into()).to_string(), "'big'");
        assert_eq!(Token::Reg.to_string(), ".reg");
    }

    #[test]
    fn test_serialize_tagged() {
        let json = serde_json::to_string(&Token::Integer("42".into())).unwrap();
        assert_eq!(json, r#"{"kind":"integer","value":"42"}"#);
        let json = serde_json::to_string(&Token::Fun).unwrap();
        assert_eq!(json, r#"{"kind":"fun"}"#);
    }
}
