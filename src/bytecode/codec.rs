//! Binary `.pvc` module format.
//!
//! All integers are little-endian and fixed-width. Strings are a `u32` byte
//! length followed by UTF-8 bytes. Blocks and registers are referenced by
//! name, so a reader first builds every block of a function and only then
//! decodes bodies, which lets bodies point at blocks defined later.
//!
//! ```text
//! u32 magic  u32 version  u32 function_count
//!   string name
//!   u32 register_count  { string name, u8 is_argument }
//!   u32 block_count     { string name }
//!                       { string name
//!                         u8 has_handler [string]  u8 has_exception [string]
//!                         u32 instruction_count { u8 code, registers, operand } }
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::bytecode::codec_error::CodecError;
use crate::bytecode::ir::{
    Block, BlockId, Function, Instruction, Module, Operand, Register, RegisterId,
};
use crate::bytecode::ir_error::Entity;
use crate::bytecode::opcode::{OperandKind, lookup_by_code};

/// Four-character code at the start of every current module (`\0PVC`).
pub const MAGIC: u32 = 0x4356_5000;

/// Most recent format version this crate reads and the one it writes.
pub const VERSION: u32 = 5;

/// Versions at or below this are treated as plausible version words when a
/// file has no magic.
const LEGACY_VERSION_CEILING: u32 = 0xff;

// =============================================================================
// Encoding
// =============================================================================

struct Encoder<W> {
    out: W,
    written: usize,
}

impl<W: Write> Encoder<W> {
    fn u8(&mut self, value: u8) -> io::Result<()> {
        self.out.write_all(&[value])?;
        self.written += 1;
        Ok(())
    }

    fn u32(&mut self, value: u32) -> io::Result<()> {
        self.out.write_all(&value.to_le_bytes())?;
        self.written += 4;
        Ok(())
    }

    fn len(&mut self, len: usize) -> Result<(), CodecError> {
        let len = u32::try_from(len).map_err(|_| CodecError::Limit)?;
        Ok(self.u32(len)?)
    }

    fn bool(&mut self, value: bool) -> io::Result<()> {
        self.u8(value as u8)
    }

    fn str(&mut self, value: &str) -> Result<(), CodecError> {
        self.len(value.len())?;
        self.out.write_all(value.as_bytes())?;
        self.written += value.len();
        Ok(())
    }

    fn function(&mut self, function: &Function) -> Result<(), CodecError> {
        self.str(function.name())?;

        self.len(function.register_count())?;
        for (_, register) in function.registers() {
            self.str(register.name())?;
            self.bool(register.is_argument())?;
        }

        self.len(function.block_count())?;
        for (_, block) in function.blocks() {
            self.str(block.name())?;
        }

        for (_, block) in function.blocks() {
            self.str(block.name())?;

            self.bool(block.handler().is_some())?;
            if let Some(handler) = block.handler() {
                self.block_ref(function, handler)?;
            }

            self.bool(block.exception_register().is_some())?;
            if let Some(register) = block.exception_register() {
                self.register_ref(function, register)?;
            }

            self.len(block.instruction_count())?;
            for insn in block.instructions() {
                self.instruction(function, insn)?;
            }
        }

        Ok(())
    }

    fn instruction(&mut self, function: &Function, insn: &Instruction) -> Result<(), CodecError> {
        let opcode = insn.opcode();
        self.u8(opcode.code)?;

        let fixed = (opcode.registers as usize).min(insn.registers().len());
        let (fixed_regs, extra_regs) = insn.registers().split_at(fixed);
        for &register in fixed_regs {
            self.register_ref(function, register)?;
        }
        if opcode.variable_registers {
            self.len(extra_regs.len())?;
            for &register in extra_regs {
                self.register_ref(function, register)?;
            }
        }

        match insn.operand() {
            Operand::None => {}
            Operand::Integer(s) | Operand::Float(s) | Operand::Atom(s) | Operand::Binary(s) => {
                self.str(s)?;
            }
            Operand::Args(args) => {
                self.len(args.len())?;
                for arg in args {
                    self.str(arg)?;
                }
            }
            Operand::Block(target) => self.block_ref(function, *target)?,
            Operand::Blocks(taken, not_taken) => {
                self.block_ref(function, *taken)?;
                self.block_ref(function, *not_taken)?;
            }
        }

        Ok(())
    }

    /// Writes the name behind `id`. An id from another function is refused
    /// rather than written as some unrelated name.
    fn block_ref(&mut self, function: &Function, id: BlockId) -> Result<(), CodecError> {
        let block = function
            .block(id)
            .ok_or_else(|| CodecError::nonexistent(Entity::Block, format!("#{}", id.index())))?;
        self.str(block.name())
    }

    fn register_ref(&mut self, function: &Function, id: RegisterId) -> Result<(), CodecError> {
        let register = function
            .register(id)
            .ok_or_else(|| CodecError::nonexistent(Entity::Register, format!("#{}", id.index())))?;
        self.str(register.name())
    }
}

/// Serializes `module` to `out`, returning the number of bytes written.
pub fn encode<W: Write>(module: &Module, out: W) -> Result<usize, CodecError> {
    let mut enc = Encoder { out, written: 0 };

    enc.u32(MAGIC)?;
    enc.u32(VERSION)?;
    enc.len(module.function_count())?;
    for function in module.functions() {
        enc.function(function)?;
    }
    enc.out.flush()?;

    Ok(enc.written)
}

/// Writes `module` to `path` without ever leaving a partially written file
/// behind: the bytes go to a temporary file next to `path`, which is then
/// renamed over it.
pub fn write_module(module: &Module, path: &Path) -> Result<(), CodecError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let tmp = NamedTempFile::new_in(dir)?;
    let written = {
        let mut out = BufWriter::new(tmp.as_file());
        let written = encode(module, &mut out)?;
        out.flush()?;
        written
    };
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CodecError::from(e.error))?;

    info!(module = module.name(), path = %path.display(), bytes = written, "wrote module");
    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

struct Decoder<R> {
    input: R,
    read: usize,
}

impl<R: Read> Decoder<R> {
    fn u8(&mut self) -> Result<u8, CodecError> {
        let mut buf = [0u8; 1];
        self.input.read_exact(&mut buf)?;
        self.read += 1;
        Ok(buf[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let mut buf = [0u8; 4];
        self.input.read_exact(&mut buf)?;
        self.read += 4;
        Ok(u32::from_le_bytes(buf))
    }

    fn bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.u8()? != 0)
    }

    fn str(&mut self) -> Result<String, CodecError> {
        let len = self.u32()? as usize;
        let mut bytes = Vec::new();
        (&mut self.input).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(CodecError::Eof);
        }
        self.read += len;
        String::from_utf8(bytes).map_err(|_| CodecError::BadUtf8)
    }

    /// Reads the header and returns the format version.
    fn header(&mut self) -> Result<u32, CodecError> {
        let first = self.u32()?;
        let version = if first == MAGIC {
            self.u32()?
        } else if first <= LEGACY_VERSION_CEILING {
            first
        } else {
            return Err(CodecError::BadMagic);
        };

        if version > VERSION {
            return Err(CodecError::Version {
                found: version,
                supported: VERSION,
            });
        }
        Ok(version)
    }

    fn function(&mut self, module: &mut Module) -> Result<(), CodecError> {
        let name = self.str()?;
        let function = module.add_function(Function::new(name))?;

        let register_count = self.u32()?;
        for _ in 0..register_count {
            let name = self.str()?;
            let argument = self.bool()?;
            function.add_register(Register::new(name, argument))?;
        }

        let block_count = self.u32()?;
        for _ in 0..block_count {
            function.add_block(Block::new(self.str()?))?;
        }

        let mut filled = HashSet::new();
        for _ in 0..block_count {
            self.block_body(function, &mut filled)?;
        }

        Ok(())
    }

    /// Decodes one block body. Each block gets exactly one, so with the
    /// count fixed by the name table a repeat also means some body is missing.
    fn block_body(
        &mut self,
        function: &mut Function,
        filled: &mut HashSet<BlockId>,
    ) -> Result<(), CodecError> {
        let name = self.str()?;
        let id = function
            .block_id(&name)
            .ok_or_else(|| CodecError::nonexistent(Entity::Block, &name))?;
        if !filled.insert(id) {
            return Err(CodecError::NameExists {
                kind: Entity::Block,
                name,
            });
        }

        let handler = if self.bool()? {
            Some(self.block_ref(function)?)
        } else {
            None
        };
        let exception = if self.bool()? {
            Some(self.register_ref(function)?)
        } else {
            None
        };

        let count = self.u32()?;
        let mut instructions = Vec::new();
        for _ in 0..count {
            instructions.push(self.instruction(function)?);
        }

        let block = function
            .block_mut(id)
            .ok_or_else(|| CodecError::nonexistent(Entity::Block, &name))?;
        if let Some(handler) = handler {
            block.set_handler(handler)?;
        }
        if let Some(register) = exception {
            block.set_exception_register(register)?;
        }
        for insn in instructions {
            block.append_instruction(insn);
        }

        Ok(())
    }

    fn block_ref(&mut self, function: &Function) -> Result<BlockId, CodecError> {
        let name = self.str()?;
        function
            .block_id(&name)
            .ok_or_else(|| CodecError::nonexistent(Entity::Block, name))
    }

    fn register_ref(&mut self, function: &Function) -> Result<RegisterId, CodecError> {
        let name = self.str()?;
        function
            .register_id(&name)
            .ok_or_else(|| CodecError::nonexistent(Entity::Register, name))
    }

    fn instruction(&mut self, function: &Function) -> Result<Instruction, CodecError> {
        let code = self.u8()?;
        let opcode = lookup_by_code(code)
            .ok_or_else(|| CodecError::nonexistent(Entity::Opcode, code.to_string()))?;

        let mut registers = Vec::with_capacity(opcode.registers as usize);
        for _ in 0..opcode.registers {
            registers.push(self.register_ref(function)?);
        }
        if opcode.variable_registers {
            let extra = self.u32()?;
            for _ in 0..extra {
                registers.push(self.register_ref(function)?);
            }
        }

        let operand = match opcode.operand {
            OperandKind::None => Operand::None,
            OperandKind::Integer => Operand::Integer(self.str()?),
            OperandKind::Float => Operand::Float(self.str()?),
            OperandKind::Atom => Operand::Atom(self.str()?),
            OperandKind::Binary => Operand::Binary(self.str()?),
            OperandKind::Args => {
                let count = self.u32()?;
                let mut args = Vec::new();
                for _ in 0..count {
                    args.push(self.str()?);
                }
                Operand::Args(args)
            }
            OperandKind::Block => Operand::Block(self.block_ref(function)?),
            OperandKind::Blocks => {
                let taken = self.block_ref(function)?;
                let not_taken = self.block_ref(function)?;
                Operand::Blocks(taken, not_taken)
            }
        };

        Ok(Instruction::new(opcode, registers, operand))
    }
}

/// Decodes a module from `input` into `module`, which should be empty.
///
/// The header is validated before `module` is touched. On any later error
/// `module` may hold the functions decoded so far.
pub fn decode<R: Read>(input: R, module: &mut Module) -> Result<u32, CodecError> {
    let mut dec = Decoder { input, read: 0 };

    let version = dec.header()?;

    let count = dec.u32()?;
    for _ in 0..count {
        dec.function(module)?;
    }

    debug!(version, functions = count, bytes = dec.read, "decoded module");
    Ok(version)
}

pub fn read_module(path: &Path, module: &mut Module) -> Result<(), CodecError> {
    let file = File::open(path)?;
    decode(BufReader::new(file), module)?;
    info!(module = module.name(), path = %path.display(), "read module");
    Ok(())
}
