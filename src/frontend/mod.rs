pub mod assembler;
pub mod lexer;
pub mod token;
pub mod token_dumper;

pub use assembler::{AssembleError, assemble};
pub use lexer::{Lexer, LexerError, Span, Spanned, lex};
pub use token::Token;
