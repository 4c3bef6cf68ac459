use thiserror::Error;
use tracing::debug;

use crate::bytecode::ir::{
    Block, BlockId, Function, Instruction, Module, Operand, Register, RegisterId,
};
use crate::bytecode::opcode::{OpcodeDef, OperandKind};
use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::token::Token;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    /// A token of the wrong type, or a missing token.
    #[error("{span}: syntax error: {message}")]
    Syntax { message: String, span: Span },

    /// Well-formed tokens describing an invalid module.
    #[error("{span}: assembly error: {message}")]
    Assembly { message: String, span: Span },
}

impl AssembleError {
    fn syntax(message: impl Into<String>, span: Span) -> Self {
        AssembleError::Syntax {
            message: message.into(),
            span,
        }
    }

    fn assembly(message: impl Into<String>, span: Span) -> Self {
        AssembleError::Assembly {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            AssembleError::Syntax { span, .. } | AssembleError::Assembly { span, .. } => *span,
        }
    }
}

/// Assembles `tokens` into `module`.
///
/// Functions, registers and blocks are added to `module` as they are
/// declared. Instructions and exception handlers are only attached once every
/// block name they mention has resolved, so on failure no block holds a
/// partial instruction list. On success, returns the span of the final token.
pub fn assemble(tokens: &[Spanned], module: &mut Module) -> Result<Span, AssembleError> {
    let mut assembler = Assembler::new(tokens);
    let end = assembler.collect(module)?;

    debug!(
        functions = assembler.functions.len(),
        instructions = assembler.instruction_count(),
        "assembler pass 1 complete"
    );

    assembler.resolve(module)?;

    debug!(module = module.name(), "assembler pass 2 complete");
    Ok(end)
}

/// A name token awaiting resolution.
#[derive(Debug)]
struct PendingName {
    text: String,
    span: Span,
}

#[derive(Debug)]
enum PendingOperand {
    Ready(Operand),
    Block(PendingName),
    Blocks(PendingName, PendingName),
}

#[derive(Debug)]
struct PendingInstruction {
    opcode: &'static OpcodeDef,
    registers: Vec<RegisterId>,
    operand: PendingOperand,
}

#[derive(Debug)]
struct PendingBlock {
    id: BlockId,
    unwind_declared: bool,
    handler: Option<PendingName>,
    instructions: Vec<PendingInstruction>,
}

#[derive(Debug)]
struct PendingFunction {
    name: String,
    registers_declared: bool,
    blocks: Vec<PendingBlock>,
}

struct Assembler<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    /// Stands in for a missing trailing `Eof` token.
    end: Spanned,
    functions: Vec<PendingFunction>,
}

impl<'a> Assembler<'a> {
    fn new(tokens: &'a [Spanned]) -> Self {
        let end = Spanned {
            token: Token::Eof,
            span: tokens
                .last()
                .map(|s| s.span)
                .unwrap_or(Span { line: 1, col: 0 }),
        };
        Assembler {
            tokens,
            pos: 0,
            end,
            functions: Vec::new(),
        }
    }

    fn current(&self) -> &Spanned {
        self.tokens.get(self.pos).unwrap_or(&self.end)
    }

    fn advance(&mut self) -> Spanned {
        let spanned = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        spanned
    }

    fn instruction_count(&self) -> usize {
        self.functions
            .iter()
            .flat_map(|f| &f.blocks)
            .map(|b| b.instructions.len())
            .sum()
    }

    fn expect_string(&mut self, what: &str) -> Result<PendingName, AssembleError> {
        let Spanned { token, span } = self.advance();
        match token {
            Token::String(text) => Ok(PendingName { text, span }),
            other => Err(AssembleError::syntax(
                format!("expected {} string, found {}", what, other.describe()),
                span,
            )),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), AssembleError> {
        let Spanned { token, span } = self.advance();
        if token == expected {
            Ok(())
        } else {
            Err(AssembleError::syntax(
                format!("expected {}, found {}", expected.describe(), token.describe()),
                span,
            ))
        }
    }

    // =========================================================================
    // Pass 1: declarations and staged instructions
    // =========================================================================

    fn collect(&mut self, module: &mut Module) -> Result<Span, AssembleError> {
        loop {
            let Spanned { token, span } = self.advance();
            match token {
                Token::Eof => return Ok(span),
                Token::Fun => self.function_directive(module)?,
                Token::Arg => self.register_directive(module, span, true)?,
                Token::Reg => self.register_directive(module, span, false)?,
                Token::Blk => self.block_directive(module, span)?,
                Token::Unw => self.unwind_directive(module, span)?,
                Token::Opcode(opcode) => self.instruction(module, opcode, span)?,
                other => {
                    return Err(AssembleError::syntax(
                        format!("expected directive or opcode, found {}", other.describe()),
                        span,
                    ));
                }
            }
        }
    }

    fn function_directive(&mut self, module: &mut Module) -> Result<(), AssembleError> {
        let name = self.expect_string("function name")?;
        module
            .add_function(Function::new(name.text.clone()))
            .map_err(|e| AssembleError::assembly(e.to_string(), name.span))?;

        self.functions.push(PendingFunction {
            name: name.text,
            registers_declared: false,
            blocks: Vec::new(),
        });
        Ok(())
    }

    fn current_function<'m>(
        &self,
        module: &'m mut Module,
        directive: &str,
        span: Span,
    ) -> Result<&'m mut Function, AssembleError> {
        let outside =
            || AssembleError::assembly(format!("{} outside of a function", directive), span);
        let Some(pending) = self.functions.last() else {
            return Err(outside());
        };
        module.function_mut(&pending.name).ok_or_else(outside)
    }

    fn register_directive(
        &mut self,
        module: &mut Module,
        span: Span,
        argument: bool,
    ) -> Result<(), AssembleError> {
        let directive = if argument { ".arg" } else { ".reg" };
        self.current_function(module, directive, span)?;

        if let Some(pending) = self.functions.last() {
            if !pending.blocks.is_empty() {
                return Err(AssembleError::assembly(
                    format!("{} after the first block", directive),
                    span,
                ));
            }
            if argument && pending.registers_declared {
                return Err(AssembleError::assembly(
                    ".arg after a register declaration",
                    span,
                ));
            }
        }

        let name = self.expect_string("register name")?;
        self.current_function(module, directive, span)?
            .add_register(Register::new(name.text, argument))
            .map_err(|e| AssembleError::assembly(e.to_string(), name.span))?;

        if !argument {
            if let Some(pending) = self.functions.last_mut() {
                pending.registers_declared = true;
            }
        }
        Ok(())
    }

    fn block_directive(&mut self, module: &mut Module, span: Span) -> Result<(), AssembleError> {
        self.current_function(module, ".blk", span)?;

        let name = self.expect_string("block name")?;
        let id = self
            .current_function(module, ".blk", span)?
            .add_block(Block::new(name.text))
            .map_err(|e| AssembleError::assembly(e.to_string(), name.span))?;

        if let Some(pending) = self.functions.last_mut() {
            pending.blocks.push(PendingBlock {
                id,
                unwind_declared: false,
                handler: None,
                instructions: Vec::new(),
            });
        }
        Ok(())
    }

    fn current_block(
        &mut self,
        directive: &str,
        span: Span,
    ) -> Result<&mut PendingBlock, AssembleError> {
        self.functions
            .last_mut()
            .and_then(|f| f.blocks.last_mut())
            .ok_or_else(|| {
                AssembleError::assembly(format!("{} outside of a block", directive), span)
            })
    }

    fn unwind_directive(&mut self, module: &mut Module, span: Span) -> Result<(), AssembleError> {
        let block = self.current_block(".unw", span)?;
        if block.unwind_declared {
            return Err(AssembleError::assembly(
                "block already has an unwind handler",
                span,
            ));
        }
        if !block.instructions.is_empty() {
            return Err(AssembleError::assembly(
                ".unw after the block's first instruction",
                span,
            ));
        }
        let block_id = block.id;

        let handler = self.expect_string("handler block name")?;
        let register = self.expect_string("exception register name")?;

        let function = self.current_function(module, ".unw", span)?;
        let register_id = function.register_id(&register.text).ok_or_else(|| {
            AssembleError::assembly(format!("unknown register '{}'", register.text), register.span)
        })?;
        function
            .block_mut(block_id)
            .ok_or_else(|| AssembleError::assembly(".unw outside of a block", span))?
            .set_exception_register(register_id)
            .map_err(|e| AssembleError::assembly(e.to_string(), register.span))?;

        let block = self.current_block(".unw", span)?;
        block.unwind_declared = true;
        block.handler = Some(handler);
        Ok(())
    }

    fn register_operand(&mut self, function: &Function) -> Result<RegisterId, AssembleError> {
        let name = self.expect_string("register name")?;
        function.register_id(&name.text).ok_or_else(|| {
            AssembleError::assembly(format!("unknown register '{}'", name.text), name.span)
        })
    }

    fn instruction(
        &mut self,
        module: &mut Module,
        opcode: &'static OpcodeDef,
        span: Span,
    ) -> Result<(), AssembleError> {
        self.current_block(opcode.name, span)?;
        let function: &Function = self.current_function(module, opcode.name, span)?;

        let mut registers = Vec::with_capacity(opcode.registers as usize);
        for _ in 0..opcode.registers {
            registers.push(self.register_operand(function)?);
        }

        if opcode.variable_registers && self.current().token == Token::BracketOpen {
            self.advance();
            while self.current().token != Token::BracketClose {
                registers.push(self.register_operand(function)?);
            }
            self.advance();
        }

        let operand = self.operand(opcode)?;

        self.current_block(opcode.name, span)?
            .instructions
            .push(PendingInstruction {
                opcode,
                registers,
                operand,
            });
        Ok(())
    }

    fn operand(&mut self, opcode: &'static OpcodeDef) -> Result<PendingOperand, AssembleError> {
        if opcode.operand == OperandKind::None {
            return Ok(PendingOperand::Ready(Operand::None));
        }

        self.expect(Token::ParenOpen)?;

        let operand = match opcode.operand {
            OperandKind::Integer | OperandKind::Float | OperandKind::Atom | OperandKind::Binary => {
                let Spanned { token, span } = self.advance();
                let operand = match (opcode.operand, token) {
                    (OperandKind::Integer, Token::Integer(s)) => Operand::Integer(s),
                    (OperandKind::Float, Token::Float(s)) => Operand::Float(s),
                    (OperandKind::Atom, Token::Atom(s)) => Operand::Atom(s),
                    (OperandKind::Binary, Token::Binary(s)) => Operand::Binary(s),
                    (kind, other) => {
                        return Err(AssembleError::syntax(
                            format!(
                                "{} expects {:?} operand, found {}",
                                opcode.name,
                                kind,
                                other.describe()
                            )
                            .to_lowercase(),
                            span,
                        ));
                    }
                };
                PendingOperand::Ready(operand)
            }
            OperandKind::Args => {
                let mut args = Vec::new();
                while self.current().token != Token::ParenClose {
                    args.push(self.expect_string("argument name")?.text);
                }
                PendingOperand::Ready(Operand::Args(args))
            }
            OperandKind::Block => PendingOperand::Block(self.expect_string("block name")?),
            OperandKind::Blocks => {
                let taken = self.expect_string("block name")?;
                let not_taken = self.expect_string("block name")?;
                PendingOperand::Blocks(taken, not_taken)
            }
            OperandKind::None => PendingOperand::Ready(Operand::None),
        };

        self.expect(Token::ParenClose)?;
        Ok(operand)
    }

    // =========================================================================
    // Pass 2: resolve block references, then commit
    // =========================================================================

    fn resolve(self, module: &mut Module) -> Result<(), AssembleError> {
        let mut resolved = Vec::new();

        for pending in &self.functions {
            let Some(function) = module.function(&pending.name) else {
                continue;
            };

            let lookup = |name: &PendingName| {
                function.block_id(&name.text).ok_or_else(|| {
                    AssembleError::assembly(
                        format!("unknown block '{}' in function '{}'", name.text, pending.name),
                        name.span,
                    )
                })
            };

            for block in &pending.blocks {
                let handler = block
                    .handler
                    .as_ref()
                    .map(|name| lookup(name).map(|id| (id, name.span)))
                    .transpose()?;

                let mut instructions = Vec::with_capacity(block.instructions.len());
                for insn in &block.instructions {
                    let operand = match &insn.operand {
                        PendingOperand::Ready(operand) => operand.clone(),
                        PendingOperand::Block(name) => Operand::Block(lookup(name)?),
                        PendingOperand::Blocks(a, b) => Operand::Blocks(lookup(a)?, lookup(b)?),
                    };
                    instructions.push(Instruction::new(
                        insn.opcode,
                        insn.registers.clone(),
                        operand,
                    ));
                }

                resolved.push((pending.name.as_str(), block.id, handler, instructions));
            }
        }

        for (function_name, block_id, handler, instructions) in resolved {
            let Some(block) = module
                .function_mut(function_name)
                .and_then(|f| f.block_mut(block_id))
            else {
                continue;
            };

            if let Some((handler, span)) = handler {
                block
                    .set_handler(handler)
                    .map_err(|e| AssembleError::assembly(e.to_string(), span))?;
            }
            for insn in instructions {
                block.append_instruction(insn);
            }
        }

        Ok(())
    }
}
