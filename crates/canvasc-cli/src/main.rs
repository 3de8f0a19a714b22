//! canvasc command-line interface.
//!
//! Provides the `canvasc` binary. `translate` compiles a model to the
//! requested targets and writes text plus metadata; `run` executes one In
//! function of the interpreted target.
//!
//! Logging goes to stderr and is filtered by `CANVASC_LOG` (default `info`).

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use canvasc_cli::{execution_config, parse_targets, RunOptions, TranslateOptions};
use canvasc_interpreted::{BuildConfiguration, ExecutionConfig};
use canvasc_translate::{TargetFlags, TranslationConfig};

/// Graph compiler and runner.
#[derive(Parser)]
#[command(name = "canvasc", about = "Translate and run graph models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a model to one or more targets.
    Translate {
        /// Path to the model JSON file.
        #[arg(short, long)]
        model: PathBuf,

        /// Comma-separated targets: lua, cpp, hpp.
        #[arg(short, long, default_value = "lua,cpp,hpp", value_parser = parse_targets)]
        targets: TargetFlags,

        /// Output directory.
        #[arg(short, long, default_value = "./build")]
        out: PathBuf,

        /// Emit a comment with the originating node above each statement.
        #[arg(long)]
        node_comments: bool,

        /// Run translators concurrently.
        #[arg(long)]
        parallel: bool,
    },

    /// Run an In function of a model in the script VM.
    Run {
        /// Path to the model JSON file.
        #[arg(short, long)]
        model: PathBuf,

        /// Name of the In function to call.
        #[arg(short, long)]
        entry: String,

        /// JSON value for the next parameter; repeat per parameter.
        #[arg(short, long = "arg")]
        args: Vec<String>,

        /// Build configuration: debug, performance, release.
        #[arg(long)]
        mode: Option<BuildConfiguration>,

        /// Maximum VM instructions per call.
        #[arg(long)]
        instruction_limit: Option<u64>,

        /// Entity id of the instance owner.
        #[arg(long, default_value_t = 1)]
        owner: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CANVASC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Translate {
            model,
            targets,
            out,
            node_comments,
            parallel,
        } => {
            let options = TranslateOptions {
                model,
                targets,
                out_dir: out,
                config: TranslationConfig {
                    emit_node_comments: node_comments,
                    parallel,
                    ..Default::default()
                },
            };
            run_translate(&options)
        }
        Commands::Run {
            model,
            entry,
            args,
            mode,
            instruction_limit,
            owner,
        } => {
            let overrides = ExecutionConfig {
                build: mode,
                instruction_limit,
                ..Default::default()
            };
            run_run(model, entry, args, owner, overrides)
        }
    };
    process::exit(exit_code);
}

/// Returns exit code: 0 = success, 1 = a target failed, 2 = invalid
/// source, 3 = I/O error.
fn run_translate(options: &TranslateOptions) -> i32 {
    match canvasc_cli::translate(options) {
        Ok(report) => {
            for path in &report.written {
                println!("wrote {}", path.display());
            }
            if report.exit_code() != 0 {
                eprint!("{}", report.errors_to_string());
            }
            report.exit_code()
        }
        Err(e) => {
            eprintln!("Error: {e}");
            e.exit_code()
        }
    }
}

fn run_run(
    model: PathBuf,
    entry: String,
    args: Vec<String>,
    owner: u64,
    overrides: ExecutionConfig,
) -> i32 {
    let execution = match execution_config(overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return e.exit_code();
        }
    };
    let options = RunOptions {
        model,
        entry,
        args,
        owner,
        execution,
    };
    match canvasc_cli::run(&options) {
        Ok(report) => {
            let json = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize report: {e}\"}}"));
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            e.exit_code()
        }
    }
}
