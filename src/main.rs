use clap::{Parser, Subcommand};
use photon_lang::{
    config::EngineConfig,
    diagnostics::{report_error, report_io_error},
    runtime::Interpreter,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "photon", version, about = "Staged interpreter for the photon language")]
struct Cli {
    /// Engine configuration file (defaults to ./photon.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `photon_lang::runtime=trace`
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare and execute a program, then print its result
    Run { file: PathBuf },
    /// Run partial evaluation only and report what was specialized
    Check { file: PathBuf },
    /// Print the program after macro expansion
    Parse { file: PathBuf },
}

/// Interpreted calls recurse on the native stack.
const INTERPRETER_STACK_SIZE: usize = 256 * 1024 * 1024;

fn main() {
    let cli = Cli::parse();
    let worker = thread::Builder::new()
        .name("photon".into())
        .stack_size(INTERPRETER_STACK_SIZE)
        .spawn(move || execute(cli));
    let ok = match worker {
        Ok(handle) => handle.join().unwrap_or(false),
        Err(err) => {
            eprintln!("failed to start the interpreter thread: {err}");
            false
        }
    };
    if !ok {
        process::exit(1);
    }
}

fn execute(cli: Cli) -> bool {
    let config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return false;
        }
    };
    setup_logging(cli.log.as_deref().or(config.log.as_deref()));

    let interpreter = Interpreter::new(config);
    match &cli.command {
        Commands::Run { file } => run(&interpreter, file),
        Commands::Check { file } => check(&interpreter, file),
        Commands::Parse { file } => parse(&interpreter, file),
    }
}

/// `--log` wins over `PHOTON_LOG` and the config file, which were already
/// merged into the config.
fn setup_logging(filter: Option<&str>) {
    let filter = EnvFilter::new(filter.unwrap_or("warn"));
    let formatter = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(formatter)
        .with(filter)
        .init();
}

fn read_source(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(source) => Some(source),
        Err(err) => {
            report_io_error(path, &err);
            None
        }
    }
}

fn run(interpreter: &Interpreter, path: &Path) -> bool {
    let Some(source) = read_source(path) else {
        return false;
    };
    let file = path.display().to_string();
    match interpreter.eval(&file, &source) {
        Ok(value) => {
            println!("{value}");
            true
        }
        Err(err) => {
            error!(file = %file, "program failed");
            report_error(&file, &source, &err);
            false
        }
    }
}

fn check(interpreter: &Interpreter, path: &Path) -> bool {
    let Some(source) = read_source(path) else {
        return false;
    };
    let file = path.display().to_string();
    match interpreter.load(&file, &source) {
        Ok(module) => {
            let specialized: usize = module
                .templates()
                .iter()
                .map(|template| template.specialization_count())
                .sum();
            println!(
                "{file}: ok ({} functions, {} templates, {specialized} specializations)",
                module.functions().len(),
                module.templates().len()
            );
            true
        }
        Err(err) => {
            report_error(&file, &source, &err);
            false
        }
    }
}

fn parse(interpreter: &Interpreter, path: &Path) -> bool {
    let Some(source) = read_source(path) else {
        return false;
    };
    let file = path.display().to_string();
    match interpreter.parse(&file, &source) {
        Ok(program) => {
            println!("{program}");
            true
        }
        Err(err) => {
            report_error(&file, &source, &err);
            false
        }
    }
}
