use std::io::{self, Write};

use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;

/// How `tok` renders a token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpFormat {
    #[default]
    Text,
    Json,
}

pub struct TokenDumper {
    pub color: bool,
    pub format: DumpFormat,
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            format: DumpFormat::Text,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = DumpFormat::Json;
        self
    }

    pub fn dump<W: Write>(&self, tokens: &[Spanned], out: &mut W) -> io::Result<()> {
        match self.format {
            DumpFormat::Text => {
                for s in tokens {
                    self.write_one(s, out)?;
                }
                Ok(())
            }
            DumpFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, tokens)?;
                writeln!(out)
            }
        }
    }

    fn write_one<W: Write>(&self, s: &Spanned, out: &mut W) -> io::Result<()> {
        let line = s.span.line;
        let col = s.span.col;

        let kind = self.kind(&s.token);
        let colr = if self.color { self.color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        writeln!(
            out,
            "[{:02}:{:02}] {}{:<9} {}{}",
            line, col, colr, kind, s.token, reset
        )
    }

    fn kind(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof => "EOF",

            // literals
            String(_) => "STRING",
            Atom(_) => "ATOM",
            Integer(_) => "INT",
            Float(_) => "FLOAT",
            Binary(_) => "BINARY",

            Fun | Arg | Reg | Blk | Unw => "DIRECTIVE",

            // structure
            ParenOpen | ParenClose => "PAREN",
            BracketOpen | BracketClose => "BRACKET",

            Opcode(_) => "OPCODE",
        }
    }

    fn color(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof => Self::DIM,
            String(_) | Atom(_) => Self::GRN,
            Integer(_) | Float(_) | Binary(_) => Self::CYN,
            Fun | Arg | Reg | Blk | Unw => Self::MAG,
            Opcode(_) => Self::YEL,
            _ => Self::RESET,
        }
    }
}
