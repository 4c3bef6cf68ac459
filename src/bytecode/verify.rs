use thiserror::Error;
use tracing::{debug, warn};

use crate::bytecode::ir::{Module, Operand};

/// Byte orders accepted by the `bin.*` opcodes that take one.
const ENDIANNESS: [&str; 3] = ["little", "big", "native"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("{function}/{block}: block does not end in a control-flow instruction")]
    NoTerminator { function: String, block: String },

    #[error("{function}/{block}: instruction {instruction} is a second control-flow instruction")]
    MultipleTerminators {
        function: String,
        block: String,
        instruction: usize,
    },

    #[error(
        "{function}/{block}: instruction {instruction} ({opcode}): invalid endianness '{value}' (expected little, big or native)"
    )]
    BadEndianness {
        function: String,
        block: String,
        instruction: usize,
        opcode: &'static str,
        value: String,
    },
}

/// Checks that every block ends in exactly one control-flow instruction and
/// that byte-order operands name a known endianness.
///
/// Scans functions, blocks and instructions in order and stops at the first
/// violation. Register arity and operand shape are not re-checked here.
pub fn verify(module: &Module) -> Result<(), VerifyError> {
    for function in module.functions() {
        for (_, block) in function.blocks() {
            let mut terminated = false;

            for (index, insn) in block.instructions().iter().enumerate() {
                let opcode = insn.opcode();

                if opcode.is_endian_sensitive() {
                    if let Operand::Atom(value) = insn.operand() {
                        if !ENDIANNESS.contains(&value.as_str()) {
                            return Err(VerifyError::BadEndianness {
                                function: function.name().to_string(),
                                block: block.name().to_string(),
                                instruction: index,
                                opcode: opcode.name,
                                value: value.clone(),
                            });
                        }
                    }
                }

                if opcode.is_terminator() {
                    if terminated {
                        return Err(VerifyError::MultipleTerminators {
                            function: function.name().to_string(),
                            block: block.name().to_string(),
                            instruction: index,
                        });
                    }
                    terminated = true;
                }
            }

            if !terminated {
                return Err(VerifyError::NoTerminator {
                    function: function.name().to_string(),
                    block: block.name().to_string(),
                });
            }
        }
    }

    debug!(module = module.name(), "module verified");
    Ok(())
}

/// Like [`verify`], but logs the violation before returning it.
pub fn verify_logged(module: &Module) -> Result<(), VerifyError> {
    verify(module).inspect_err(|e| warn!(module = module.name(), "verification failed: {}", e))
}
