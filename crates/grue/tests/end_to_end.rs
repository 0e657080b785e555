//! Black-box compiles against the public `grue::compile` entry point,
//! covering the observable scenarios a successful compile must satisfy.

use grue::asm::NullAssembler;
use grue::data_image::read_properties;
use grue::error::CompileError;
use grue::source::SourceLoader;

struct NoIncludes;

impl SourceLoader for NoIncludes {
    fn load(&mut self, path: &str) -> Result<String, CompileError> {
        Err(CompileError::io(format!("no includes available: {path}")))
    }
}

fn compile(src: &str) -> grue::session::Session {
    grue::compile("t", src.to_owned(), &mut NoIncludes, &mut NullAssembler).expect("compile succeeds")
}

#[test]
fn constant_fold() {
    let session = compile("def N = 2 + 3 * 4;\nvar x = N;\n");
    let x = session.globals.find(session.names.lookup("x").unwrap()).unwrap();
    let sym = session.globals.get(x);
    assert_eq!(session.data.get(sym.value as u32), 14);
}

#[test]
fn forward_object_reference() {
    let session = compile("var p = o;\nobject o { }\n");
    let p = session.globals.find(session.names.lookup("p").unwrap()).unwrap();
    let o = session.globals.find(session.names.lookup("o").unwrap()).unwrap();
    let o_sym = session.globals.get(o);
    assert!(o_sym.defined);
    let p_sym = session.globals.get(p);
    let p_slot = p_sym.value as u32;
    assert_eq!(session.data.get(p_slot), o_sym.value);
}

#[test]
fn nested_array_placement() {
    let session = compile("var a[] = { 1, {10, 20}, 3 };\n");
    let a = session.globals.find(session.names.lookup("a").unwrap()).unwrap();
    let first = session.globals.get(a).value as u32;
    assert_eq!(session.data.get(first - 1), 3);
    assert_eq!(session.data.get(first), 1);
    assert_eq!(session.data.get(first + 2), 3);
    let nested_offset = session.data.get(first + 1) as u32;
    assert_eq!(session.data.get(nested_offset - 1), 2);
    assert_eq!(session.data.get(nested_offset), 10);
    assert_eq!(session.data.get(nested_offset + 1), 20);
}

#[test]
fn class_inheritance_skips_shared_properties() {
    let session = compile("property s, nsh;\nobject C { shared s: 1; nsh: 2; }\nC D { nsh: 5; }\n");
    let d = session.globals.find(session.names.lookup("D").unwrap()).unwrap();
    let d_header = session.globals.get(d).value as u32;
    let d_props = read_properties(&session.data, d_header);
    assert_eq!(d_props.len(), 1);
    let (_, shared, value) = d_props[0];
    assert!(!shared);
    assert_eq!(value, 5);
}

#[test]
fn try_depth_accounting_reuses_slots_across_sibling_trys() {
    let session = compile(
        "def f() {\n\
           try { try { throw 1; } catch (a) { } } catch (b) { }\n\
           try { try { throw 2; } catch (c) { } } catch (d) { }\n\
         }\n",
    );
    let f = session.compiled_functions.last().expect("one function compiled");
    assert_eq!(f.exceptions.len(), 4);
    let max_slot = f.exceptions.iter().map(|e| e.catch_slot).max();
    assert_eq!(max_slot, Some(1));
}

#[test]
fn logical_short_circuit_compiles_with_two_merge_branches() {
    let session = compile(
        "var a = 0; var b = 0; var c = 0;\n\
         def t() { return 1; }\n\
         def f() { return 0; }\n\
         def test() { if (a || b || c) t(); else f(); return 0; }\n",
    );
    let dump = grue::debug::dump(&session);
    let test_fn = dump.split("FunctionDef: test").nth(1).expect("test function dumped");
    assert_eq!(test_fn.matches("JumpIfTrue").count(), 2);
    assert_eq!(test_fn.matches("JumpIfFalse").count(), 1);
}

#[test]
fn undefined_symbol_fails_the_whole_compile() {
    let err =
        grue::compile("t", "def f() { return nowhere; }\n".to_owned(), &mut NoIncludes, &mut NullAssembler).unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
}

#[test]
fn redeclaring_a_variable_as_a_function_is_rejected() {
    let err = grue::compile(
        "t",
        "var thing = 1;\ndef thing() { return 0; }\n".to_owned(),
        &mut NoIncludes,
        &mut NullAssembler,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
}
