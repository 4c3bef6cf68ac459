use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

// =============================================================================
// OPCODE - Static instruction catalog
// =============================================================================

/// The shape of the extra payload an instruction carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandKind {
    None,
    Integer,
    Float,
    Atom,
    Binary,
    /// A list of argument names.
    Args,
    /// A single basic block.
    Block,
    /// Two basic blocks (taken / not taken).
    Blocks,
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlFlow {
    None,
    Branch,
    Return,
    Throw,
}

#[derive(Debug, PartialEq, Eq, Hash, Serialize)]
pub struct OpcodeDef {
    pub name: &'static str,
    pub code: u8,
    /// Number of registers every instance takes.
    pub registers: u8,
    /// Whether additional registers beyond `registers` are allowed.
    pub variable_registers: bool,
    pub operand: OperandKind,
    pub control_flow: ControlFlow,
}

impl OpcodeDef {
    /// Returns true if the instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        self.control_flow != ControlFlow::None
    }

    /// Binary encode/decode opcodes whose atom operand names a byte order.
    pub fn is_endian_sensitive(&self) -> bool {
        self.operand == OperandKind::Atom && self.name.starts_with("bin.")
    }
}

impl std::fmt::Display for OpcodeDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

macro_rules! op {
    ($name:literal, $code:literal, $regs:literal, $var:literal, $operand:ident, $flow:ident) => {
        OpcodeDef {
            name: $name,
            code: $code,
            registers: $regs,
            variable_registers: $var,
            operand: OperandKind::$operand,
            control_flow: ControlFlow::$flow,
        }
    };
}

static OPCODES: &[OpcodeDef] = &[
    op!("noop", 0, 0, false, None, None),
    op!("copy", 1, 2, false, None, None),
    op!("type", 2, 2, false, None, None),
    // loads
    op!("load.nil", 3, 1, false, None, None),
    op!("load.int", 4, 1, false, Integer, None),
    op!("load.flt", 5, 1, false, Float, None),
    op!("load.atom", 6, 1, false, Atom, None),
    op!("load.bin", 7, 1, false, Binary, None),
    op!("load.func", 8, 3, true, None, None),
    // arithmetic & bitwise
    op!("num.add", 9, 3, false, None, None),
    op!("num.sub", 10, 3, false, None, None),
    op!("num.mul", 11, 3, false, None, None),
    op!("num.div", 12, 3, false, None, None),
    op!("num.rem", 13, 3, false, None, None),
    op!("num.pow", 14, 3, false, None, None),
    op!("num.neg", 15, 2, false, None, None),
    op!("num.and", 16, 3, false, None, None),
    op!("num.or", 17, 3, false, None, None),
    op!("num.xor", 18, 3, false, None, None),
    op!("num.not", 19, 2, false, None, None),
    op!("num.shl", 20, 3, false, None, None),
    op!("num.shr", 21, 3, false, None, None),
    // comparison
    op!("cmp.lt", 22, 3, false, None, None),
    op!("cmp.gt", 23, 3, false, None, None),
    op!("cmp.eq", 24, 3, false, None, None),
    op!("cmp.neq", 25, 3, false, None, None),
    op!("cmp.lteq", 26, 3, false, None, None),
    op!("cmp.gteq", 27, 3, false, None, None),
    // calls
    op!("call.rem", 28, 3, true, None, None),
    op!("call.func", 29, 2, true, None, None),
    op!("call.up", 30, 3, true, None, None),
    // tuples
    op!("tup.make", 31, 1, true, None, None),
    op!("tup.get", 32, 3, false, None, None),
    op!("tup.set", 33, 4, false, None, None),
    op!("tup.del", 34, 3, false, None, None),
    op!("tup.size", 35, 2, false, None, None),
    // lists
    op!("list.make", 36, 1, true, None, None),
    op!("list.head", 37, 2, false, None, None),
    op!("list.tail", 38, 2, false, None, None),
    op!("list.cons", 39, 3, false, None, None),
    // maps
    op!("map.make", 40, 1, true, None, None),
    op!("map.add", 41, 4, false, None, None),
    op!("map.get", 42, 3, false, None, None),
    op!("map.del", 43, 3, false, None, None),
    op!("map.size", 44, 2, false, None, None),
    op!("map.keys", 45, 3, false, None, None),
    op!("map.vals", 46, 3, false, None, None),
    // sets
    op!("set.make", 47, 1, true, None, None),
    op!("set.add", 48, 3, false, None, None),
    op!("set.find", 49, 3, false, None, None),
    op!("set.del", 50, 3, false, None, None),
    op!("set.size", 51, 3, false, None, None),
    op!("set.vals", 52, 3, false, None, None),
    // binaries
    op!("bin.size", 53, 2, false, None, None),
    op!("bin.ebin", 54, 4, false, None, None),
    op!("bin.dbin", 55, 4, false, None, None),
    op!("bin.efs", 56, 4, false, Atom, None),
    op!("bin.efd", 57, 4, false, Atom, None),
    op!("bin.dfs", 58, 3, false, Atom, None),
    op!("bin.dfd", 59, 3, false, Atom, None),
    op!("bin.eisu", 60, 5, false, Atom, None),
    op!("bin.dis", 61, 4, false, Atom, None),
    op!("bin.diu", 62, 4, false, Atom, None),
    // control flow
    op!("jump.goto", 63, 0, false, Block, Branch),
    op!("jump.cond", 64, 1, false, Blocks, Branch),
    op!("jump.ret", 65, 1, false, None, Return),
    // exceptions
    op!("exc.new", 66, 1, false, None, Throw),
    op!("exc.get", 67, 1, false, None, None),
    op!("exc.cont", 68, 0, false, None, Throw),
];

static BY_NAME: LazyLock<HashMap<&'static str, &'static OpcodeDef>> =
    LazyLock::new(|| OPCODES.iter().map(|op| (op.name, op)).collect());

static BY_CODE: LazyLock<HashMap<u8, &'static OpcodeDef>> =
    LazyLock::new(|| OPCODES.iter().map(|op| (op.code, op)).collect());

/// All opcodes, ordered by code.
pub fn all() -> &'static [OpcodeDef] {
    OPCODES
}

pub fn lookup_by_name(name: &str) -> Option<&'static OpcodeDef> {
    BY_NAME.get(name).copied()
}

pub fn lookup_by_code(code: u8) -> Option<&'static OpcodeDef> {
    BY_CODE.get(&code).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_and_codes_are_unique() {
        let names: HashSet<_> = all().iter().map(|op| op.name).collect();
        let codes: HashSet<_> = all().iter().map(|op| op.code).collect();
        assert_eq!(names.len(), all().len());
        assert_eq!(codes.len(), all().len());
    }

    #[test]
    fn test_codes_are_dense_and_ordered() {
        for (i, op) in all().iter().enumerate() {
            assert_eq!(op.code as usize, i, "opcode {} out of order", op.name);
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let op = lookup_by_name("load.int").unwrap();
        assert_eq!(op.code, 4);
        assert_eq!(op.registers, 1);
        assert_eq!(op.operand, OperandKind::Integer);
        assert!(lookup_by_name("load").is_none());
        assert!(lookup_by_name("mov").is_none());
    }

    #[test]
    fn test_lookup_by_code() {
        let op = lookup_by_code(64).unwrap();
        assert_eq!(op.name, "jump.cond");
        assert_eq!(op.operand, OperandKind::Blocks);
        assert!(lookup_by_code(200).is_none());
    }

    #[test]
    fn test_terminators() {
        let terminators: Vec<_> = all()
            .iter()
            .filter(|op| op.is_terminator())
            .map(|op| op.name)
            .collect();
        assert_eq!(
            terminators,
            vec!["jump.goto", "jump.cond", "jump.ret", "exc.new", "exc.cont"]
        );
    }

    #[test]
    fn test_endian_sensitive_opcodes() {
        let sensitive: Vec<_> = all()
            .iter()
            .filter(|op| op.is_endian_sensitive())
            .map(|op| op.name)
            .collect();
        assert_eq!(
            sensitive,
            vec![
                "bin.efs", "bin.efd", "bin.dfs", "bin.dfd", "bin.eisu", "bin.dis", "bin.diu"
            ]
        );
        assert!(!lookup_by_name("load.atom").unwrap().is_endian_sensitive());
    }

    #[test]
    fn test_display_is_name() {
        assert_eq!(lookup_by_name("num.add").unwrap().to_string(), "num.add");
    }
}
