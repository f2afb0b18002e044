use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

use structopt::StructOpt;

use bfjolt_core::{compile, disasm, interpret, jit_compile, new_tape, TapeProgram};

#[derive(Debug, StructOpt)]
#[structopt(name = "bfjolt", about = "An optimizing JIT for the eight-token tape language.")]
struct Opt {
    /// Source file; use '-' to read from standard input
    #[structopt(parse(from_os_str))]
    source: PathBuf,

    /// Run on the threaded interpreter instead of generating native code
    #[structopt(long)]
    interpret: bool,

    /// Print the optimized instruction stream instead of running
    #[structopt(long)]
    dump: bool,

    /// Like --dump, but annotated with each instruction's payload
    #[structopt(long)]
    dump_verbose: bool,
}

fn main() {
    let opt = Opt::from_args();

    let source = read_source(&opt.source).unwrap_or_else(|err| {
        eprintln!("bfjolt: {}: {}", opt.source.display(), err);
        process::exit(1);
    });

    let insns = compile(&source).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });

    if opt.dump || opt.dump_verbose {
        print!("{}", disasm::dump(insns.as_slice(), opt.dump_verbose));
        return;
    }

    let mut tape = new_tape();
    if opt.interpret {
        interpret(&insns).run(&mut tape);
    } else {
        let program = jit_compile(&insns).unwrap_or_else(|err| {
            eprintln!("bfjolt: {}", err);
            process::exit(1);
        });
        program.run(&mut tape);
    }
}

fn read_source(path: &Path) -> std::io::Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut source = Vec::new();
        std::io::stdin().read_to_end(&mut source)?;
        Ok(source)
    } else {
        fs::read(path)
    }
}
