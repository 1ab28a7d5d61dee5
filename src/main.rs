//! proc-relay - Run an external process and stream its stdout.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use proc_relay::config::{ConfigLoader, RunnerConfig};
use proc_relay::runner::{ProcessOutput, ProcessRunner, RunError};

/// Exit code used when the run timed out, as `timeout(1)` does.
const EXIT_TIMED_OUT: u8 = 124;

/// Exit code used when the run was cancelled.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "proc-relay",
    about = "Run a process and stream its stdout, with timeout and cancellation",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a process and copy its stdout to ours.
    Run {
        /// Overall timeout in seconds.
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Milliseconds to wait for exit after stdout closes.
        #[arg(long)]
        exit_grace_ms: Option<u64>,
        /// Milliseconds to wait after spawn before using pipes.
        #[arg(long)]
        startup_delay_ms: Option<u64>,
        /// Show the process's stderr live instead of capturing it.
        #[arg(long)]
        show_stderr: bool,
        /// File to feed to the process's stdin.
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Config file (defaults to .proc-relay.toml or the user config).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Executable to run.
        executable: PathBuf,
        /// Arguments passed to the executable.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn print_error(message: &str) {
    eprintln!("{} {message}", "[ERROR]".red().bold());
}

/// Map a run error to the exit code of this program.
fn exit_code_for(err: &RunError) -> ExitCode {
    match err {
        RunError::ExecutionFailed { exit_code, .. } => {
            ExitCode::from(u8::try_from(*exit_code).unwrap_or(1))
        }
        RunError::TimedOut { .. } => ExitCode::from(EXIT_TIMED_OUT),
        RunError::Cancelled => ExitCode::from(EXIT_CANCELLED),
        _ => ExitCode::FAILURE,
    }
}

async fn relay_to_stdout(mut output: ProcessOutput) -> ExitCode {
    let mut stdout = tokio::io::stdout();
    let copied = tokio::io::copy(&mut output, &mut stdout).await;
    if let Err(e) = stdout.flush().await {
        tracing::debug!(error = %e, "Failed to flush stdout");
    }

    match copied {
        Ok(bytes) => {
            tracing::debug!(bytes, "Process finished");
            output.close().await;
            ExitCode::SUCCESS
        }
        Err(e) => match RunError::from_io(&e) {
            Some(run_err) => {
                print_error(&run_err.to_string());
                exit_code_for(run_err)
            }
            None => {
                // Our own stdout went away, or the pipe failed mid-stream.
                tracing::debug!(error = %e, "Stopped relaying output");
                output.close().await;
                ExitCode::FAILURE
            }
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            timeout,
            exit_grace_ms,
            startup_delay_ms,
            show_stderr,
            input,
            config,
            executable,
            args,
        } => {
            let loader = config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
            let mut runner_config = match loader.load() {
                Ok(config) => config,
                Err(e) => {
                    print_error(&e.to_string());
                    return ExitCode::FAILURE;
                }
            };
            apply_overrides(
                &mut runner_config,
                timeout,
                exit_grace_ms,
                startup_delay_ms,
                show_stderr,
            );
            tracing::info!(config = ?runner_config, "Starting process runner");

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, cancelling run");
                    ctrl_c.cancel();
                }
            });

            let runner = ProcessRunner::new(runner_config);
            let started = match input {
                Some(path) => match tokio::fs::File::open(&path).await {
                    Ok(file) => {
                        runner
                            .run_and_read_output_with_input(&executable, &args, file, cancel)
                            .await
                    }
                    Err(e) => {
                        print_error(&format!("Failed to open input {}: {e}", path.display()));
                        return ExitCode::FAILURE;
                    }
                },
                None => runner.run_and_read_output(&executable, &args, cancel).await,
            };

            match started {
                Ok(output) => relay_to_stdout(output).await,
                Err(e) => {
                    print_error(&e.to_string());
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn apply_overrides(
    config: &mut RunnerConfig,
    timeout: Option<u64>,
    exit_grace_ms: Option<u64>,
    startup_delay_ms: Option<u64>,
    show_stderr: bool,
) {
    if timeout.is_some() {
        config.timeout_secs = timeout;
    }
    if let Some(ms) = exit_grace_ms {
        config.exit_grace_ms = ms;
    }
    if let Some(ms) = startup_delay_ms {
        config.startup_delay_ms = ms;
    }
    if show_stderr {
        config.capture_stderr = false;
    }
}
