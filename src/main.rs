use std::io;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use paravm::frontend::token_dumper::TokenDumper;
use paravm::tool::{self, ToolError};

#[derive(Parser, Debug)]
#[command(name = "paravm")]
#[command(about = "ParaVM assembler, disassembler and module checker")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output file (defaults to the input with its extension swapped)
    #[arg(short, long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a .pva file into a .pvc module
    Asm { file: PathBuf },

    /// Disassemble a .pvc module into a .pva file
    Dis { file: PathBuf },

    /// Verify a .pvc module
    Chk { file: PathBuf },

    /// Print the tokens of a .pva file
    Tok {
        file: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,

        /// Disable ANSI colors in text output
        #[arg(long)]
        no_color: bool,
    },
}

fn run(cli: Cli) -> Result<(), ToolError> {
    let out = cli.out.as_deref();

    match cli.command {
        Command::Asm { file } => {
            let written = tool::assemble_file(&file, out)?;
            println!("{}", written.display());
        }
        Command::Dis { file } => {
            let written = tool::disassemble_file(&file, out)?;
            println!("{}", written.display());
        }
        Command::Chk { file } => {
            tool::check_file(&file)?;
        }
        Command::Tok {
            file,
            json,
            no_color,
        } => {
            let mut dumper = TokenDumper::new();
            if json {
                dumper = dumper.json();
            }
            if no_color {
                dumper = dumper.no_color();
            }
            tool::dump_tokens(&file, &dumper, &mut io::stdout().lock())?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    paravm::init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
