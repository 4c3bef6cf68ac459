pub mod codec;
pub mod codec_error;
pub mod disasm;
pub mod ir;
pub mod ir_error;
pub mod opcode;
pub mod verify;

pub use codec_error::CodecError;
pub use ir::{Block, BlockId, Function, Instruction, Module, Operand, Register, RegisterId};
pub use ir_error::IrError;
pub use opcode::{ControlFlow, OpcodeDef, OperandKind};
pub use verify::VerifyError;
