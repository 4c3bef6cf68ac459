//! In-memory representation of a ParaVM module.
//!
//! A [`Module`] owns its functions, a [`Function`] owns its registers and
//! blocks, and a [`Block`] owns its instructions. Everything that points
//! sideways in the graph (branch targets, exception handlers, instruction
//! registers) is a [`BlockId`] or [`RegisterId`] into the owning function's
//! tables, so control-flow cycles never turn into ownership cycles.

use indexmap::IndexMap;

use crate::bytecode::ir_error::{BlockField, Entity, IrError};
use crate::bytecode::opcode::{OpcodeDef, OperandKind};

/// Index of a register within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(usize);

impl RegisterId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

// =============================================================================
// Register
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    name: String,
    argument: bool,
}

impl Register {
    pub fn new(name: impl Into<String>, argument: bool) -> Self {
        Self {
            name: name.into(),
            argument,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_argument(&self) -> bool {
        self.argument
    }
}

// =============================================================================
// Instruction
// =============================================================================

/// The payload of an instruction, shaped by its opcode's [`OperandKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    /// Integer literal text, e.g. `42`.
    Integer(String),
    /// Float literal text, e.g. `4.25e+1`.
    Float(String),
    Atom(String),
    /// Binary literal digits, e.g. `0110`.
    Binary(String),
    Args(Vec<String>),
    Block(BlockId),
    Blocks(BlockId, BlockId),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Integer(_) => OperandKind::Integer,
            Operand::Float(_) => OperandKind::Float,
            Operand::Atom(_) => OperandKind::Atom,
            Operand::Binary(_) => OperandKind::Binary,
            Operand::Args(_) => OperandKind::Args,
            Operand::Block(_) => OperandKind::Block,
            Operand::Blocks(_, _) => OperandKind::Blocks,
        }
    }

    /// The literal text of a single-string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Operand::Integer(s) | Operand::Float(s) | Operand::Atom(s) | Operand::Binary(s) => {
                Some(s)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    opcode: &'static OpcodeDef,
    registers: Vec<RegisterId>,
    operand: Operand,
}

impl Instruction {
    /// Builds an instruction. The register count and operand shape must agree
    /// with `opcode`; this is only checked in debug builds.
    pub fn new(opcode: &'static OpcodeDef, registers: Vec<RegisterId>, operand: Operand) -> Self {
        debug_assert!(
            registers.len() == opcode.registers as usize
                || (opcode.variable_registers && registers.len() >= opcode.registers as usize),
            "{} takes {} registers, got {}",
            opcode.name,
            opcode.registers,
            registers.len()
        );
        debug_assert_eq!(
            operand.kind(),
            opcode.operand,
            "operand shape does not match {}",
            opcode.name
        );

        Self {
            opcode,
            registers,
            operand,
        }
    }

    pub fn opcode(&self) -> &'static OpcodeDef {
        self.opcode
    }

    pub fn registers(&self) -> &[RegisterId] {
        &self.registers
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}

// =============================================================================
// Block
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    name: String,
    instructions: Vec<Instruction>,
    handler: Option<BlockId>,
    exception: Option<RegisterId>,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Vec::new(),
            handler: None,
            exception: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block that receives control if an instruction in this block throws.
    pub fn handler(&self) -> Option<BlockId> {
        self.handler
    }

    /// Register that receives the exception value on handler entry.
    pub fn exception_register(&self) -> Option<RegisterId> {
        self.exception
    }

    pub fn set_handler(&mut self, handler: BlockId) -> Result<(), IrError> {
        if self.handler.is_some() {
            return Err(IrError::already_set(BlockField::Handler, &self.name));
        }
        self.handler = Some(handler);
        Ok(())
    }

    pub fn set_exception_register(&mut self, register: RegisterId) -> Result<(), IrError> {
        if self.exception.is_some() {
            return Err(IrError::already_set(
                BlockField::ExceptionRegister,
                &self.name,
            ));
        }
        self.exception = Some(register);
        Ok(())
    }

    pub fn append_instruction(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn prepend_instruction(&mut self, instruction: Instruction) {
        self.instructions.insert(0, instruction);
    }

    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }
}

// =============================================================================
// Function
// =============================================================================

#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    registers: IndexMap<String, Register>,
    blocks: IndexMap<String, Block>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registers: IndexMap::new(),
            blocks: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_register(&mut self, register: Register) -> Result<RegisterId, IrError> {
        if self.registers.contains_key(register.name()) {
            return Err(IrError::name_exists(Entity::Register, register.name()));
        }
        let (index, _) = self
            .registers
            .insert_full(register.name().to_string(), register);
        Ok(RegisterId(index))
    }

    pub fn register_id(&self, name: &str) -> Option<RegisterId> {
        self.registers.get_index_of(name).map(RegisterId)
    }

    pub fn register(&self, id: RegisterId) -> Option<&Register> {
        self.registers.get_index(id.0).map(|(_, r)| r)
    }

    /// All registers, arguments included, in declaration order.
    pub fn registers(&self) -> impl Iterator<Item = (RegisterId, &Register)> {
        self.registers
            .values()
            .enumerate()
            .map(|(i, r)| (RegisterId(i), r))
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    /// Looks up a register by name, but only if it is an argument.
    pub fn argument_id(&self, name: &str) -> Option<RegisterId> {
        self.registers
            .get_full(name)
            .filter(|(_, _, r)| r.is_argument())
            .map(|(i, _, _)| RegisterId(i))
    }

    pub fn arguments(&self) -> impl Iterator<Item = (RegisterId, &Register)> {
        self.registers().filter(|(_, r)| r.is_argument())
    }

    pub fn argument_count(&self) -> usize {
        self.arguments().count()
    }

    pub fn add_block(&mut self, block: Block) -> Result<BlockId, IrError> {
        if self.blocks.contains_key(block.name()) {
            return Err(IrError::name_exists(Entity::Block, block.name()));
        }
        let (index, _) = self.blocks.insert_full(block.name().to_string(), block);
        Ok(BlockId(index))
    }

    pub fn block_id(&self, name: &str) -> Option<BlockId> {
        self.blocks.get_index_of(name).map(BlockId)
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get_index(id.0).map(|(_, b)| b)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_index_mut(id.0).map(|(_, b)| b)
    }

    pub fn block_by_name(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .values()
            .enumerate()
            .map(|(i, b)| (BlockId(i), b))
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Name of the register behind `id`. Ids always come from this function,
    /// so a miss means the graph was stitched together from two functions.
    pub(crate) fn register_name(&self, id: RegisterId) -> &str {
        debug_assert!(
            id.index() < self.register_count(),
            "register #{} does not belong to {}",
            id.index(),
            self.name
        );
        self.register(id).map(Register::name).unwrap_or("<invalid>")
    }

    pub(crate) fn block_name(&self, id: BlockId) -> &str {
        debug_assert!(
            id.index() < self.block_count(),
            "block #{} does not belong to {}",
            id.index(),
            self.name
        );
        self.block(id).map(Block::name).unwrap_or("<invalid>")
    }
}

// IndexMap equality ignores order, but ids are positions, so order matters.
impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.registers.iter().eq(other.registers.iter())
            && self.blocks.iter().eq(other.blocks.iter())
    }
}

impl Eq for Function {}

// =============================================================================
// Module
// =============================================================================

#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    functions: IndexMap<String, Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds `function`, returning a handle to the stored copy so callers can
    /// keep populating it.
    pub fn add_function(&mut self, function: Function) -> Result<&mut Function, IrError> {
        if self.functions.contains_key(function.name()) {
            return Err(IrError::name_exists(Entity::Function, function.name()));
        }
        let (index, _) = self
            .functions
            .insert_full(function.name().to_string(), function);
        Ok(&mut self.functions[index])
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.get_mut(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.functions.iter().eq(other.functions.iter())
    }
}

impl Eq for Module {}
