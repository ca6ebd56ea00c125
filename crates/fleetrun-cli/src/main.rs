//! fleetrun CLI
//!
//! Run a command locally or on a remote host, or look up a binary

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use fleetrun_exec::{BinaryLocation, Dispatcher, ExecOptions, ExecResult, ReturnValue};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod config;

use config::{Config, Defaults, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "fleetrun", version)]
#[command(about = "Run commands locally or over SSH", long_about = None)]
struct Cli {
    /// Config file (default: $FLEETRUN_CONFIG, ./fleetrun.toml, /etc/fleetrun/fleetrun.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command
    #[command(name = "run")]
    Run(RunArgs),

    /// Check whether a binary is available
    #[command(name = "which")]
    Which {
        /// Binary name or absolute path
        name: String,

        /// Target host
        #[arg(long, default_value = "localhost")]
        host: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Target host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Timeout in seconds (0 disables)
    #[arg(long)]
    timeout: Option<u64>,

    /// Capture output and print it when the command finishes
    #[arg(long)]
    capture: bool,

    /// Capture output into this file
    #[arg(long)]
    out_file: Option<PathBuf>,

    /// Append to --out-file instead of truncating it
    #[arg(long, requires = "out_file")]
    append: bool,

    /// Append output and a timestamped transcript to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Pass output through instead of discarding it
    #[arg(short, long)]
    verbose: bool,

    /// Do not run anything
    #[arg(long)]
    dry_run: bool,

    /// Report the raw exit code as `value` in --json output
    #[arg(long)]
    return_rv: bool,

    /// Detach the remote command from the session
    #[arg(long)]
    nohup: bool,

    /// Remote retries after a failed attempt
    #[arg(long)]
    retry: Option<u32>,

    /// Seconds to wait before each retry
    #[arg(long)]
    sleep: Option<u64>,

    /// Extra ssh client options
    #[arg(long, allow_hyphen_values = true)]
    ssh_opts: Option<String>,

    /// Verbose ssh client output
    #[arg(long)]
    ssh_verbose: bool,

    /// Skip host-key verification
    #[arg(long)]
    no_strict_host_key_checking: bool,

    /// Keep the ssh agent (needs forward_agent in the config)
    #[arg(long)]
    use_ssh_agent: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Command to run, joined with spaces and passed to the shell
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

impl RunArgs {
    fn options(&self, defaults: &Defaults) -> ExecOptions {
        ExecOptions {
            log_file: self.log_file.clone(),
            capture_output: self.capture || self.out_file.is_some(),
            out_file: self.out_file.clone(),
            append: self.append,
            verbose: self.verbose,
            timeout: self
                .timeout
                .map_or_else(|| defaults.timeout(), Duration::from_secs),
            return_rv: self.return_rv,
            dry_run: self.dry_run,
            nohup: self.nohup,
            use_ssh_agent: self.use_ssh_agent,
            no_strict_host_key_checking: self.no_strict_host_key_checking,
            ssh_opts: self.ssh_opts.clone(),
            ssh_verbose: self.ssh_verbose,
            retry: self.retry.unwrap_or(defaults.retry),
            sleep: self
                .sleep
                .map_or_else(|| defaults.sleep(), Duration::from_secs),
        }
    }
}

/// `--json` output: the result plus its legacy return value
#[derive(Serialize, Debug)]
struct RunReport<'a> {
    #[serde(flatten)]
    result: &'a ExecResult,
    value: ReturnValue,
}

impl<'a> RunReport<'a> {
    fn new(result: &'a ExecResult) -> Self {
        Self {
            result,
            value: result.value(),
        }
    }
}

/// Exit status after Ctrl-C, as a shell reports SIGINT
const INTERRUPTED_EXIT: u8 = 130;

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Process exit status for a result: the command's own code when it fits, else 1
fn exit_status(result: &ExecResult) -> u8 {
    if result.ok() {
        return 0;
    }
    u8::try_from(result.exit_code())
        .ok()
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let (config, source) = Config::load_default(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match &source {
        Some(path) => tracing::debug!(path = %path.display(), "loaded config"),
        None => tracing::warn!("no config file found, using defaults"),
    }

    let dispatcher = Dispatcher::new(config.ssh.clone());

    match cli.command {
        Commands::Run(args) => {
            let opts = args.options(&config.defaults);
            let command = args.command.join(" ");

            // Dropping the run kills whatever the command started
            let result = tokio::select! {
                result = dispatcher.run(&args.host, &command, &opts) => result,
                interrupted = tokio::signal::ctrl_c() => {
                    interrupted?;
                    tracing::warn!(host = %args.host, command = %command, "interrupted, command killed");
                    return Ok(ExitCode::from(INTERRUPTED_EXIT));
                }
            };

            if args.json {
                println!("{}", serde_json::to_string_pretty(&RunReport::new(&result))?);
            } else if let Some(captured) = result.captured() {
                print!("{captured}");
            }

            Ok(ExitCode::from(exit_status(&result)))
        }
        Commands::Which { name, host } => match dispatcher.which(&host, &name).await {
            BinaryLocation::Local(path) => {
                println!("{}", path.display());
                Ok(ExitCode::SUCCESS)
            }
            BinaryLocation::Remote => {
                println!("yes");
                Ok(ExitCode::SUCCESS)
            }
            BinaryLocation::Missing => {
                println!("no");
                Ok(ExitCode::FAILURE)
            }
        },
    }
}
