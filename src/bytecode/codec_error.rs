use std::io;

use thiserror::Error;

use crate::bytecode::ir_error::{Entity, IrError};

/// Failure while reading or writing a `.pvc` module.
///
/// Operating-system failures are folded into a closed set so callers can
/// match on them without inspecting raw `io::ErrorKind`s. Anything that does
/// not fit lands in [`CodecError::Io`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("file system is read-only")]
    ReadOnly,

    #[error("permission denied")]
    Access,

    #[error("file is busy")]
    Busy,

    #[error("operation interrupted")]
    Interrupted,

    #[error("path is a directory")]
    Directory,

    #[error("resource limit reached")]
    Limit,

    #[error("path name is invalid or too long")]
    PathLength,

    #[error("no such file or directory")]
    Nonexistent,

    #[error("no space left on device")]
    NoSpace,

    #[error("path component is not a directory")]
    NotDirectory,

    #[error("i/o error: {0}")]
    Io(#[source] io::Error),

    #[error("unexpected end of file")]
    Eof,

    #[error("not a ParaVM module (bad magic)")]
    BadMagic,

    #[error("module format version {found} is newer than supported version {supported}")]
    Version { found: u32, supported: u32 },

    #[error("string in module is not valid UTF-8")]
    BadUtf8,

    #[error("{kind} '{name}' defined twice")]
    NameExists { kind: Entity, name: String },

    #[error("reference to nonexistent {kind} '{name}'")]
    NonexistentName { kind: Entity, name: String },
}

impl CodecError {
    pub fn nonexistent(kind: Entity, name: impl Into<String>) -> Self {
        CodecError::NonexistentName {
            kind,
            name: name.into(),
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        use io::ErrorKind::*;
        match err.kind() {
            PermissionDenied => CodecError::Access,
            ReadOnlyFilesystem => CodecError::ReadOnly,
            ResourceBusy | ExecutableFileBusy => CodecError::Busy,
            Interrupted => CodecError::Interrupted,
            IsADirectory => CodecError::Directory,
            NotADirectory => CodecError::NotDirectory,
            FileTooLarge | OutOfMemory | TooManyLinks => CodecError::Limit,
            InvalidFilename => CodecError::PathLength,
            NotFound => CodecError::Nonexistent,
            StorageFull => CodecError::NoSpace,
            UnexpectedEof => CodecError::Eof,
            _ => CodecError::Io(err),
        }
    }
}

impl From<IrError> for CodecError {
    fn from(err: IrError) -> Self {
        match err {
            IrError::NameExists { entity, name } => CodecError::NameExists { kind: entity, name },
            // Handler and exception register are written at most once per block
            IrError::AlreadySet { block, .. } => CodecError::NameExists {
                kind: Entity::Block,
                name: block,
            },
        }
    }
}
