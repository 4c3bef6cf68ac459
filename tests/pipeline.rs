use std::fs;
use std::io::Cursor;

use paravm::bytecode::codec::{decode, encode};
use paravm::bytecode::disasm::disassemble;
use paravm::bytecode::verify::{VerifyError, verify};
use paravm::bytecode::{CodecError, Module};
use paravm::frontend::{assemble, lex};
use paravm::tool::{self, ToolError};

const PROGRAM: &str = r#"
; Sums a list; anything thrown in the loop is rethrown.
.fun "sum"
.arg "list"
.reg "acc"
.reg "head"
.reg "empty"
.reg "nil"
.reg "exc"
.blk "entry"
load.int "acc" (0)
load.nil "nil"
jump.goto ("loop")
.blk "loop"
.unw "fail" "exc"
cmp.eq "empty" "list" "nil"
jump.cond "empty" ("done" "step")
.blk "step"
list.head "head" "list"
list.tail "list" "list"
num.add "acc" "acc" "head"
jump.goto ("loop")
.blk "done"
jump.ret "acc"
.blk "fail"
exc.cont

.fun "pack"
.arg "a"
.arg "b"
.reg "t"
.reg "bits"
.blk "entry"
tup.make "t" ["a" "b"]
load.bin "bits" (:1010:)
bin.dfs "t" "bits" "t" ('big')
load.atom "a" ('it\'s "quoted"')
load.flt "b" (2.5e-3)
jump.ret "t"
"#;

fn assembled(source: &str) -> Module {
    let tokens = lex(source.as_bytes()).unwrap();
    let mut module = Module::new("prog");
    assemble(&tokens, &mut module).unwrap();
    module
}

#[test]
fn assembled_program_verifies() {
    let module = assembled(PROGRAM);
    assert_eq!(module.function_count(), 2);
    assert_eq!(verify(&module), Ok(()));
}

#[test]
fn binary_round_trip_preserves_module() {
    let module = assembled(PROGRAM);

    let mut bytes = Vec::new();
    encode(&module, &mut bytes).unwrap();

    let mut decoded = Module::new("prog");
    decode(Cursor::new(bytes), &mut decoded).unwrap();
    assert_eq!(decoded, module);
}

#[test]
fn text_round_trip_preserves_module() {
    let module = assembled(PROGRAM);
    let text = disassemble(&module);

    let reassembled = assembled(&text);
    assert_eq!(reassembled, module);
    assert_eq!(disassemble(&reassembled), text);
}

#[test]
fn newer_version_is_rejected() {
    let mut bytes = Vec::new();
    encode(&assembled(PROGRAM), &mut bytes).unwrap();
    bytes[4..8].copy_from_slice(&6u32.to_le_bytes());

    let mut module = Module::new("prog");
    let err = decode(Cursor::new(bytes), &mut module).unwrap_err();
    assert!(matches!(err, CodecError::Version { found: 6, supported: 5 }));
    assert_eq!(module.function_count(), 0);
}

#[test]
fn files_round_trip_through_tools() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prog.pva");
    fs::write(&source, PROGRAM).unwrap();

    let pvc = tool::assemble_file(&source, None).unwrap();
    assert_eq!(pvc, dir.path().join("prog.pvc"));

    let module = tool::check_file(&pvc).unwrap();
    assert_eq!(module.name(), "prog");
    assert_eq!(module, assembled(PROGRAM));

    let out = dir.path().join("copy.pva");
    tool::disassemble_file(&pvc, Some(&out)).unwrap();
    let text = fs::read_to_string(&out).unwrap();
    assert_eq!(text, disassemble(&module));
}

#[test]
fn check_reports_first_violation() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("bad.pva");
    fs::write(
        &source,
        r#"
.fun "f"
.reg "r"
.blk "ok"
jump.ret "r"
.blk "open"
noop
.blk "twice"
jump.ret "r"
jump.ret "r"
"#,
    )
    .unwrap();

    let pvc = tool::assemble_file(&source, None).unwrap();
    let err = tool::check_file(&pvc).unwrap_err();
    match err {
        ToolError::Verify { source, .. } => assert_eq!(
            source,
            VerifyError::NoTerminator {
                function: "f".into(),
                block: "open".into(),
            }
        ),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn check_rejects_bad_endianness() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("endian.pva");
    fs::write(
        &source,
        ".fun \"f\" .reg \"r\" .blk \"b\" bin.dfd \"r\" \"r\" \"r\" ('sideways') jump.ret \"r\"",
    )
    .unwrap();

    let pvc = tool::assemble_file(&source, None).unwrap();
    let err = tool::check_file(&pvc).unwrap_err();
    assert!(err.to_string().contains("sideways"));
}

#[test]
fn assembly_error_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("broken.pva");
    fs::write(&source, ".fun \"f\" .blk \"b\" jump.goto (\"nowhere\")").unwrap();

    let err = tool::assemble_file(&source, None).unwrap_err();
    assert!(matches!(err, ToolError::Assemble { .. }));
    assert!(!dir.path().join("broken.pvc").exists());
}

#[test]
fn token_dump_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("t.pva");
    fs::write(&source, ".fun \"f\"").unwrap();

    let dumper = paravm::frontend::token_dumper::TokenDumper::new().json();
    let mut out = Vec::new();
    tool::dump_tokens(&source, &dumper, &mut out).unwrap();

    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value[0]["token"]["kind"], "fun");
    assert_eq!(value[1]["token"]["value"], "f");
    assert_eq!(value[2]["token"]["kind"], "eof");
}
