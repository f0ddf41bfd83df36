use actverify_core::logging::{self, LogOptions};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Harness subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify a built action artifact
    #[command(long_about = "Verify a built action artifact\n\n\
        Checks the manifest's structure and schema, confirms each entry point exists, \
        runs each entry point as a child process and compares its output with the \
        expected sentinel. The post phase, when enabled, only starts after the main \
        phase has passed verification.")]
    Run {
        /// Build output directory holding the manifest (default: dist)
        #[arg(long, value_name = "PATH")]
        dist_dir: Option<PathBuf>,
        /// Manifest file name relative to the dist directory (default: action.yml)
        #[arg(long, value_name = "FILE")]
        manifest_file: Option<String>,
        /// Also verify the post entry point
        #[arg(long)]
        post: bool,
        /// Program used to launch entry points (default: node)
        #[arg(long, value_name = "PROG", conflicts_with = "direct")]
        interpreter: Option<String>,
        /// Execute entry points directly instead of through an interpreter
        #[arg(long)]
        direct: bool,
        /// Action input (format: NAME=VALUE, can be repeated)
        #[arg(long, value_name = "NAME=VALUE", action = clap::ArgAction::Append)]
        input: Vec<String>,
        /// Output every entry point must produce (default: foobar)
        #[arg(long, value_name = "S")]
        expected_output: Option<String>,
        /// Required prefix of runs.using (default: node)
        #[arg(long, value_name = "T")]
        runtime_family: Option<String>,
        /// Pass the full parent environment to entry points
        #[arg(long)]
        inherit_env: bool,
        /// Output format (text or json)
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Print the verification steps and their dependencies
    Plan {
        /// Include the post phase
        #[arg(long)]
        post: bool,
        /// Output format (text or json)
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Action artifact verification harness",
    long_about = "Action artifact verification harness\n\n\
        Runs the lifecycle test suite against a packaged action: manifest checks, \
        entry point checks and real executions of main and post.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json; falls back to ACTVERIFY_LOG_FORMAT, then text)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level for the harness (ACTVERIFY_LOG or RUST_LOG take precedence)
    #[arg(long, global = true, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Harness configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Logging preferences from the global flags; the level is always set
    /// since `--log-level` has a default
    fn log_options(&self) -> LogOptions {
        LogOptions {
            format: self.log_format.as_ref().map(|format| match format {
                LogFormat::Text => logging::LogFormat::Text,
                LogFormat::Json => logging::LogFormat::Json,
            }),
            level: Some(self.log_level.as_str().to_string()),
        }
    }

    pub async fn dispatch(self) -> Result<()> {
        logging::init(&self.log_options())?;
        tracing::debug!("CLI initialized with log level: {}", self.log_level.as_str());

        match self.command {
            Some(Commands::Run {
                dist_dir,
                manifest_file,
                post,
                interpreter,
                direct,
                input,
                expected_output,
                runtime_family,
                inherit_env,
                output,
            }) => {
                use crate::commands::run::{execute_run, RunArgs};

                let args = RunArgs {
                    config_path: self.config,
                    dist_dir,
                    manifest_file,
                    post,
                    interpreter,
                    direct,
                    inputs: input,
                    expected_output,
                    runtime_family,
                    inherit_env,
                    output,
                };
                execute_run(args).await
            }
            Some(Commands::Plan { post, output }) => {
                use crate::commands::plan::{execute_plan, PlanArgs};

                execute_plan(PlanArgs {
                    config_path: self.config,
                    post,
                    output,
                })
            }
            None => {
                // No subcommand provided - show help-like message
                println!("Action artifact verification harness");
                println!("Run 'actverify --help' to see available commands.");
                Ok(())
            }
        }
    }
}
