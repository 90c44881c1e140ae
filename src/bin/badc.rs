use bad_lang::{
    build::{self, BuildConfig},
    codegen::CompilerOptions,
    diagnostics::Diagnostic,
    parser, BadError, Result,
};
use clap::{ArgAction, Parser, Subcommand};
use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

#[derive(Parser)]
#[command(name = "badc")]
#[command(about = "BaD compiler: S-expressions to FASM x86-64 for Windows")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a program to an assembly listing
    Build {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Keep literal-only arithmetic unfolded
        #[arg(long)]
        no_fold: bool,
        /// Comment the emitted instructions
        #[arg(long)]
        annotate: bool,
        #[arg(long, default_value = "main")]
        entry: String,
    },
    /// Type check a program without generating code
    Check {
        #[arg(short, long)]
        input: PathBuf,
        /// Print the top-level signatures as JSON
        #[arg(long)]
        json: bool,
        #[arg(long, default_value = "main")]
        entry: String,
    },
    /// Print the parsed program
    Ast {
        #[arg(short, long)]
        input: PathBuf,
    },
}

impl Commands {
    fn input(&self) -> &PathBuf {
        match self {
            Commands::Build { input, .. }
            | Commands::Check { input, .. }
            | Commands::Ast { input } => input,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(command: &Commands) -> Result<()> {
    match command {
        Commands::Build {
            input,
            output,
            no_fold,
            annotate,
            entry,
        } => {
            let config = BuildConfig {
                input_path: input.clone(),
                output_path: output.clone(),
                options: CompilerOptions {
                    fold_constants: !no_fold,
                    annotate: *annotate,
                    entry_point: entry.clone(),
                },
            };
            build::build(&config)?;
            println!("wrote {}", output.display());
        }
        Commands::Check { input, json, entry } => {
            let source = fs::read_to_string(input)?;
            let signatures = build::check(&source, entry)?;
            if *json {
                println!("{}", build::signatures_json(&signatures)?);
            } else {
                for signature in &signatures {
                    println!("{} {}: {}", signature.kind, signature.name, signature.signature);
                }
                println!("{}: ok", input.display());
            }
        }
        Commands::Ast { input } => {
            let source = fs::read_to_string(input)?;
            let ast = parser::parse(&source)?;
            for &item in ast.items() {
                println!("{}", ast.display(item));
            }
        }
    }
    Ok(())
}

fn report(input: &Path, err: &BadError) {
    let source = fs::read_to_string(input).unwrap_or_default();
    eprint!("{}", Diagnostic::from_error(err).report(input, &source));
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(cli.command.input(), &err);
            ExitCode::FAILURE
        }
    }
}
