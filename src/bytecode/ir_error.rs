use thiserror::Error;

/// The kind of named IR entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Function,
    Register,
    Block,
    Opcode,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Function => write!(f, "function"),
            Entity::Register => write!(f, "register"),
            Entity::Block => write!(f, "block"),
            Entity::Opcode => write!(f, "opcode"),
        }
    }
}

/// A single-assignment field of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockField {
    Handler,
    ExceptionRegister,
}

impl std::fmt::Display for BlockField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockField::Handler => write!(f, "handler block"),
            BlockField::ExceptionRegister => write!(f, "exception register"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    /// An insertion collided with an existing name in the same scope.
    #[error("{entity} '{name}' already exists")]
    NameExists { entity: Entity, name: String },

    /// A single-assignment block field was set twice.
    #[error("{field} of block '{block}' is already set")]
    AlreadySet { field: BlockField, block: String },
}

impl IrError {
    pub fn name_exists(entity: Entity, name: impl Into<String>) -> Self {
        IrError::NameExists {
            entity,
            name: name.into(),
        }
    }

    pub fn already_set(field: BlockField, block: impl Into<String>) -> Self {
        IrError::AlreadySet {
            field,
            block: block.into(),
        }
    }
}
