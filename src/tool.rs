//! File-level pipelines behind the `paravm` subcommands.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::bytecode::codec::{read_module, write_module};
use crate::bytecode::disasm::disassemble_to_file;
use crate::bytecode::verify::{VerifyError, verify_logged};
use crate::bytecode::{CodecError, Module};
use crate::frontend::token_dumper::TokenDumper;
use crate::frontend::{AssembleError, LexerError, assemble, lex};

/// Extension of assembly source files.
pub const ASSEMBLY_EXT: &str = "pva";
/// Extension of binary module files.
pub const BYTECODE_EXT: &str = "pvc";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("file '{}' does not have a base name", .path.display())]
    NoBaseName { path: PathBuf },

    #[error("file '{}' does not end in '.{ext}'", .path.display())]
    WrongExtension { path: PathBuf, ext: &'static str },

    #[error("file '{}' does not have a root name", .path.display())]
    NoRootName { path: PathBuf },

    #[error("could not read '{}': {source}", .path.display())]
    ReadSource { path: PathBuf, source: io::Error },

    #[error("{}:{source}", .path.display())]
    Lex { path: PathBuf, source: LexerError },

    #[error("{}:{source}", .path.display())]
    Assemble { path: PathBuf, source: AssembleError },

    #[error("could not read '{}': {source}", .path.display())]
    ReadModule { path: PathBuf, source: CodecError },

    #[error("could not write '{}': {source}", .path.display())]
    WriteModule { path: PathBuf, source: CodecError },

    #[error("'{}' failed verification: {source}", .path.display())]
    Verify { path: PathBuf, source: VerifyError },

    #[error("could not write output: {0}")]
    Output(#[from] io::Error),
}

/// Splits the base name of `path` into root and extension (with the dot).
fn split_base(path: &Path) -> Result<(String, String), ToolError> {
    let base = path
        .file_name()
        .map(|b| b.to_string_lossy().into_owned())
        .ok_or_else(|| ToolError::NoBaseName {
            path: path.to_path_buf(),
        })?;

    match base.rfind('.') {
        Some(dot) => Ok((base[..dot].to_string(), base[dot..].to_string())),
        None => Ok((base, String::new())),
    }
}

/// Checks that `path` has a base name ending in `.ext` with a non-empty root.
pub fn check_path(path: &Path, ext: &'static str) -> Result<(), ToolError> {
    let (root, found) = split_base(path)?;

    if found.strip_prefix('.') != Some(ext) {
        return Err(ToolError::WrongExtension {
            path: path.to_path_buf(),
            ext,
        });
    }
    if root.is_empty() {
        return Err(ToolError::NoRootName {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Derives a module name from a `.pva` or `.pvc` path: the base name without
/// its extension.
pub fn module_name(path: &Path) -> Result<String, ToolError> {
    let (root, found) = split_base(path)?;

    match found.strip_prefix('.') {
        Some(ASSEMBLY_EXT) | Some(BYTECODE_EXT) => {}
        _ => {
            return Err(ToolError::WrongExtension {
                path: path.to_path_buf(),
                ext: ASSEMBLY_EXT,
            });
        }
    }
    if root.is_empty() {
        return Err(ToolError::NoRootName {
            path: path.to_path_buf(),
        });
    }
    Ok(root)
}

/// `path` with its extension replaced by `ext`.
pub fn companion_path(path: &Path, ext: &str) -> PathBuf {
    path.with_extension(ext)
}

fn output_path(
    input: &Path,
    output: Option<&Path>,
    ext: &'static str,
) -> Result<PathBuf, ToolError> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| companion_path(input, ext));
    check_path(&output, ext)?;
    Ok(output)
}

fn read_source(path: &Path) -> Result<Vec<u8>, ToolError> {
    fs::read(path).map_err(|source| ToolError::ReadSource {
        path: path.to_path_buf(),
        source,
    })
}

fn load_module(path: &Path) -> Result<Module, ToolError> {
    check_path(path, BYTECODE_EXT)?;

    let mut module = Module::new(module_name(path)?);
    read_module(path, &mut module).map_err(|source| ToolError::ReadModule {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(module)
}

/// Assembles `input` (`.pva`) into `output`, or the `.pvc` next to it.
/// Returns the path written.
pub fn assemble_file(input: &Path, output: Option<&Path>) -> Result<PathBuf, ToolError> {
    check_path(input, ASSEMBLY_EXT)?;
    let output = output_path(input, output, BYTECODE_EXT)?;

    let source = read_source(input)?;
    let tokens = lex(&source).map_err(|source| ToolError::Lex {
        path: input.to_path_buf(),
        source,
    })?;

    let mut module = Module::new(module_name(input)?);
    assemble(&tokens, &mut module).map_err(|source| ToolError::Assemble {
        path: input.to_path_buf(),
        source,
    })?;

    write_module(&module, &output).map_err(|source| ToolError::WriteModule {
        path: output.clone(),
        source,
    })?;

    info!(input = %input.display(), output = %output.display(), "assembled");
    Ok(output)
}

/// Disassembles `input` (`.pvc`) into `output`, or the `.pva` next to it.
/// Returns the path written.
pub fn disassemble_file(input: &Path, output: Option<&Path>) -> Result<PathBuf, ToolError> {
    check_path(input, BYTECODE_EXT)?;
    let output = output_path(input, output, ASSEMBLY_EXT)?;
    let module = load_module(input)?;

    disassemble_to_file(&module, &output).map_err(|source| ToolError::WriteModule {
        path: output.clone(),
        source,
    })?;

    info!(input = %input.display(), output = %output.display(), "disassembled");
    Ok(output)
}

/// Reads and verifies `input` (`.pvc`), returning the module on success.
pub fn check_file(input: &Path) -> Result<Module, ToolError> {
    let module = load_module(input)?;

    verify_logged(&module).map_err(|source| ToolError::Verify {
        path: input.to_path_buf(),
        source,
    })?;

    info!(input = %input.display(), functions = module.function_count(), "verified");
    Ok(module)
}

/// Lexes `input` (`.pva`) and renders its tokens with `dumper`.
pub fn dump_tokens<W: Write>(
    input: &Path,
    dumper: &TokenDumper,
    out: &mut W,
) -> Result<(), ToolError> {
    check_path(input, ASSEMBLY_EXT)?;

    let source = read_source(input)?;
    let tokens = lex(&source).map_err(|source| ToolError::Lex {
        path: input.to_path_buf(),
        source,
    })?;

    dumper.dump(&tokens, out)?;
    Ok(())
}
