use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use crate::bytecode::codec_error::CodecError;
use crate::bytecode::ir::{Function, Instruction, Module, Operand};

/// Renders `module` as assembly text that the assembler accepts. Arguments
/// are listed before the other registers, so the result reassembles to an
/// equal module whenever the arguments were declared first.
pub fn disassemble(module: &Module) -> String {
    let mut out = String::new();

    for (i, function) in module.functions().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_function(&mut out, function);
    }

    out
}

/// Disassembles `module` into `path`, replacing it atomically.
pub fn disassemble_to_file(module: &Module, path: &Path) -> Result<(), CodecError> {
    let text = disassemble(module);

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CodecError::from(e.error))?;

    info!(module = module.name(), path = %path.display(), bytes = text.len(), "wrote assembly");
    Ok(())
}

fn write_function(out: &mut String, function: &Function) {
    let _ = writeln!(out, ".fun {}", quoted(function.name(), '"'));

    // The assembler takes every .arg before the first .reg, whatever order
    // the registers were declared in.
    for (_, register) in function.arguments() {
        let _ = writeln!(out, ".arg {}", quoted(register.name(), '"'));
    }
    for (_, register) in function.registers().filter(|(_, r)| !r.is_argument()) {
        let _ = writeln!(out, ".reg {}", quoted(register.name(), '"'));
    }

    for (_, block) in function.blocks() {
        let _ = writeln!(out, ".blk {}", quoted(block.name(), '"'));

        if let (Some(handler), Some(register)) = (block.handler(), block.exception_register()) {
            let _ = writeln!(
                out,
                ".unw {} {}",
                quoted(function.block_name(handler), '"'),
                quoted(function.register_name(register), '"')
            );
        }

        for insn in block.instructions() {
            write_instruction(out, function, insn);
            out.push('\n');
        }
    }
}

fn write_instruction(out: &mut String, function: &Function, insn: &Instruction) {
    let opcode = insn.opcode();
    out.push_str(opcode.name);

    let fixed = (opcode.registers as usize).min(insn.registers().len());
    let (fixed_regs, extra_regs) = insn.registers().split_at(fixed);
    for &register in fixed_regs {
        out.push(' ');
        out.push_str(&quoted(function.register_name(register), '"'));
    }
    if !extra_regs.is_empty() {
        let names: Vec<_> = extra_regs
            .iter()
            .map(|&r| quoted(function.register_name(r), '"'))
            .collect();
        let _ = write!(out, " [{}]", names.join(" "));
    }

    let operand = match insn.operand() {
        Operand::None => return,
        Operand::Integer(s) | Operand::Float(s) => s.clone(),
        Operand::Atom(s) => quoted(s, '\''),
        Operand::Binary(s) => format!(":{}:", s),
        Operand::Args(args) => args
            .iter()
            .map(|a| quoted(a, '"'))
            .collect::<Vec<_>>()
            .join(" "),
        Operand::Block(target) => quoted(function.block_name(*target), '"'),
        Operand::Blocks(taken, not_taken) => format!(
            "{} {}",
            quoted(function.block_name(*taken), '"'),
            quoted(function.block_name(*not_taken), '"')
        ),
    };
    let _ = write!(out, " ({})", operand);
}

/// Wraps `text` in `quote`, backslash-escaping quotes and backslashes.
fn quoted(text: &str, quote: char) -> String {
    let mut s = String::with_capacity(text.len() + 2);
    s.push(quote);
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '\'') {
            s.push('\\');
        }
        s.push(c);
    }
    s.push(quote);
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::codec::{decode, encode};
    use crate::bytecode::ir::{Block, Register};
    use crate::bytecode::opcode::lookup_by_name;
    use crate::frontend::{assemble, lex};
    use std::io::Cursor;

    fn op(name: &str) -> &'static crate::bytecode::opcode::OpcodeDef {
        lookup_by_name(name).unwrap()
    }

    #[test]
    fn test_quoted_escapes() {
        assert_eq!(quoted(r#"a"b\c'd"#, '"'), r#""a\"b\\c\'d""#);
        assert_eq!(quoted("plain", '\''), "'plain'");
    }

    #[test]
    fn test_disassemble_layout() {
        let mut module = Module::new("m");
        let f = module.add_function(Function::new("f")).unwrap();
        let a = f.add_register(Register::new("a", true)).unwrap();
        let r = f.add_register(Register::new("r", false)).unwrap();
        let entry = f.add_block(Block::new("entry")).unwrap();
        let yes = f.add_block(Block::new("yes")).unwrap();

        let block = f.block_mut(entry).unwrap();
        block.set_handler(yes).unwrap();
        block.set_exception_register(r).unwrap();
        block.append_instruction(Instruction::new(
            op("load.int"),
            vec![r],
            Operand::Integer("42".into()),
        ));
        block.append_instruction(Instruction::new(op("call.func"), vec![r, a, a], Operand::None));
        block.append_instruction(Instruction::new(
            op("jump.cond"),
            vec![r],
            Operand::Blocks(yes, entry),
        ));
        f.block_mut(yes).unwrap().append_instruction(Instruction::new(
            op("load.bin"),
            vec![r],
            Operand::Binary("01".into()),
        ));

        module.add_function(Function::new("g")).unwrap();

        let expected = r#".fun "f"
.arg "a"
.reg "r"
.blk "entry"
.unw "yes" "r"
load.int "r" (42)
call.func "r" "a" ["a"]
jump.cond "r" ("yes" "entry")
.blk "yes"
load.bin "r" (:01:)

.fun "g"
"#;
        assert_eq!(disassemble(&module), expected);
    }

    #[test]
    fn test_arguments_precede_registers() {
        let mut module = Module::new("m");
        let f = module.add_function(Function::new("f")).unwrap();
        let r = f.add_register(Register::new("r", false)).unwrap();
        let a = f.add_register(Register::new("a", true)).unwrap();
        let b = f.add_block(Block::new("b")).unwrap();
        let block = f.block_mut(b).unwrap();
        block.append_instruction(Instruction::new(op("copy"), vec![r, a], Operand::None));
        block.append_instruction(Instruction::new(op("jump.ret"), vec![r], Operand::None));

        let mut bytes = Vec::new();
        encode(&module, &mut bytes).unwrap();
        let mut decoded = Module::new("m");
        decode(Cursor::new(bytes), &mut decoded).unwrap();

        let text = disassemble(&decoded);
        assert!(text.starts_with(".fun \"f\"\n.arg \"a\"\n.reg \"r\"\n"));

        let mut reassembled = Module::new("m");
        assemble(&lex(text.as_bytes()).unwrap(), &mut reassembled).unwrap();
        let f = reassembled.function("f").unwrap();
        let args: Vec<_> = f.arguments().map(|(_, r)| r.name()).collect();
        assert_eq!(args, vec!["a"]);
        assert_eq!(f.register_count(), 2);
        assert_eq!(disassemble(&reassembled), text);
    }

    #[test]
    fn test_unwind_needs_both_fields() {
        let mut module = Module::new("m");
        let f = module.add_function(Function::new("f")).unwrap();
        let b = f.add_block(Block::new("b")).unwrap();
        f.block_mut(b).unwrap().set_handler(b).unwrap();

        assert!(!disassemble(&module).contains(".unw"));
    }

    #[test]
    fn test_empty_module() {
        assert_eq!(disassemble(&Module::new("m")), "");
    }

    #[test]
    fn test_disassemble_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.pva");
        let mut module = Module::new("m");
        module.add_function(Function::new("f")).unwrap();

        disassemble_to_file(&module, &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), ".fun \"f\"\n");
    }
}
