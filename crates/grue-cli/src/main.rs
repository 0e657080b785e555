use std::env;
use std::fs;
use std::process::ExitCode;

use grue::asm::NullAssembler;
use grue::error::CompileResult;
use grue::source::SourceLoader;

/// Resolves `include` directives (and the root file) straight off the
/// filesystem, relative to the current working directory.
struct FsLoader;

impl SourceLoader for FsLoader {
    fn load(&mut self, path: &str) -> CompileResult<String> {
        fs::read_to_string(path).map_err(|err| grue::error::CompileError::io(format!("{path}: {err}")))
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(file_path) = args.get(1) else {
        println!("usage: gruec <source-file>");
        return ExitCode::FAILURE;
    };

    let mut loader = FsLoader;
    let source = match loader.load(file_path) {
        Ok(source) => source,
        Err(err) => {
            println!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let mut native = NullAssembler;
    let session = match grue::compile(file_path.clone(), source, &mut loader, &mut native) {
        Ok(session) => session,
        Err(err) => {
            println!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if grue::debug::enabled() {
        print!("{}", grue::debug::dump(&session));
    }

    ExitCode::SUCCESS
}
