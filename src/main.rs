use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use phlow::config::CodegenOptions;
use phlow::diagnostics::{render_error, CompileError};
use phlow::runtime::Fault;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "phlowc", version, about = "Code generator for bound PHP modules")]
struct Cli {
    /// Path to a phlow.toml; by default it is discovered from the current directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate code for a serialized bound module and print the instruction listing
    Emit {
        /// Bound module (JSON)
        module: PathBuf,
        /// Write the listing here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate code and execute it in the evaluator
    Run {
        /// Bound module (JSON)
        module: PathBuf,
        /// Routine to call
        #[arg(long, default_value = "main")]
        entry: String,
    },
    /// Print each routine's type context table
    Types {
        /// Bound module (JSON)
        module: PathBuf,
    },
}

fn init_tracing() {
    let filter = match std::env::var("PHLOW_LOG") {
        Ok(val) => EnvFilter::builder().parse_lossy(val),
        Err(_) => EnvFilter::new("warn"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn fail(file: &Path, err: &CompileError) -> ! {
    let source = std::fs::read_to_string(file).unwrap_or_default();
    render_error(&source, &file.to_string_lossy(), err);
    std::process::exit(1);
}

fn options(config: Option<&Path>) -> Result<CodegenOptions, CompileError> {
    match config {
        Some(path) => CodegenOptions::load(path),
        None => {
            let cwd = std::env::current_dir()
                .map_err(|e| CompileError::input(format!("cannot determine the working directory: {e}")))?;
            CodegenOptions::discover(&cwd)
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let opts = match options(cli.config.as_deref()) {
        Ok(opts) => opts,
        Err(err) => {
            render_error("", "phlow.toml", &err);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Emit { module: file, output } => {
            let image = phlow::load_module(&file)
                .and_then(|module| phlow::generate(module, &opts))
                .unwrap_or_else(|err| fail(&file, &err));
            let listing = image.to_string();
            match output {
                Some(path) => {
                    if let Err(e) = std::fs::write(&path, listing) {
                        eprintln!("error: failed to write {}: {e}", path.display());
                        std::process::exit(1);
                    }
                }
                None => print!("{listing}"),
            }
        }
        Commands::Run { module: file, entry } => {
            let outcome = phlow::load_module(&file)
                .and_then(|module| phlow::generate_and_run(module, &opts, &entry))
                .unwrap_or_else(|err| fail(&file, &err));
            print!("{}", outcome.output);
            for warning in &outcome.warnings {
                eprintln!("Warning: {warning}");
            }
            match &outcome.result {
                Ok(_) | Err(Fault::Exit(_)) => {}
                Err(Fault::Thrown(ex)) => eprintln!("PHP Fatal error:  Uncaught {ex}"),
                Err(fault @ Fault::Internal(_)) => eprintln!("error: {fault}"),
            }
            let status = outcome.exit_status();
            if status != 0 {
                std::process::exit(status);
            }
        }
        Commands::Types { module: file } => {
            let module = phlow::load_module(&file).unwrap_or_else(|err| fail(&file, &err));
            for (i, routine) in module.routines.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                println!("{}", routine.qualified_name());
                for index in 0..routine.ctx.types_count() {
                    if let Some(t) = routine.ctx.type_at(index) {
                        println!("  #{index:<2} {t}");
                    }
                }
                for local in &routine.locals {
                    println!("  ${} : {}", local.name, routine.ctx.display(local.mask));
                }
            }
        }
    }
}
