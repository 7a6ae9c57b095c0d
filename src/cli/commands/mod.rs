//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod cleanup;
mod config_cmd;
mod serve;
mod submit;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions, CHUNK_SIZE_RANGE};
use crate::models::{ExportSelection, ProcessingOptions};

#[derive(Parser)]
#[command(name = "bibliotecario")]
#[command(about = "CSV observation processing server with live progress tracking")]
#[command(version)]
pub struct Cli {
    /// Data directory holding uploads and exports (overrides config file)
    #[arg(long, global = true, env = "BIBLIOTECARIO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server URL used by `submit` and `watch`
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

fn parse_export(s: &str) -> Result<ExportSelection, String> {
    ExportSelection::from_str(s).ok_or_else(|| {
        let names: Vec<&str> = ExportSelection::CHOICES
            .iter()
            .map(|(choice, _)| choice.as_str())
            .collect();
        format!("expected one of: {}", names.join(", "))
    })
}

fn parse_chunk_size(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|_| format!("not a number: {}", s))?;
    if CHUNK_SIZE_RANGE.contains(&n) {
        Ok(n)
    } else {
        Err(format!(
            "must be between {} and {}",
            CHUNK_SIZE_RANGE.start(),
            CHUNK_SIZE_RANGE.end()
        ))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        /// Address to bind: port, host, or host:port
        #[arg(default_value = "127.0.0.1:5000")]
        bind: String,
    },

    /// Upload a CSV file to a running server and follow its progress
    Submit {
        /// CSV file to upload
        file: PathBuf,
        /// Column holding the free-text observations
        #[arg(short, long, default_value = "obs")]
        text_column: String,
        /// Rows per processing chunk
        #[arg(long, value_parser = parse_chunk_size)]
        chunk_size: Option<usize>,
        /// Export formats: json, csv, excel, both, all
        #[arg(short, long, default_value = "json", value_parser = parse_export)]
        export: ExportSelection,
        /// Skip noise cleaning of the text column
        #[arg(long)]
        no_cleaning: bool,
        /// Print the processing URL and exit instead of watching
        #[arg(short, long)]
        detach: bool,
    },

    /// Follow a session by id or processing URL
    Watch {
        /// Session id, or a /processing/{id} URL
        session: String,
    },

    /// Remove expired uploads and exports
    Cleanup {
        /// Age threshold in hours (defaults to the retention window)
        #[arg(long)]
        older_than: Option<u64>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved settings
    Show,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };
    let (mut settings, config) = load_settings_with_options(options).await;
    if let Some(url) = cli.server_url {
        settings.server_url = url.trim_end_matches('/').to_string();
    }

    match cli.command {
        Commands::Serve { bind } => serve::cmd_serve(settings, &bind).await,
        Commands::Submit {
            file,
            text_column,
            chunk_size,
            export,
            no_cleaning,
            detach,
        } => {
            let options = ProcessingOptions {
                text_column,
                chunk_size: chunk_size.unwrap_or(settings.default_chunk_size),
                export,
                enable_cleaning: !no_cleaning,
            };
            submit::cmd_submit(&settings, &file, &options, detach).await
        }
        Commands::Watch { session } => watch::cmd_watch(&settings, &session).await,
        Commands::Cleanup { older_than } => cleanup::cmd_cleanup(&settings, older_than).await,
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_cmd::cmd_config_show(&settings, &config),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_submit_arguments() {
        let cli = Cli::try_parse_from([
            "bibliotecario",
            "submit",
            "notes.csv",
            "--export",
            "all",
            "--chunk-size",
            "250",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit {
                export, chunk_size, ..
            } => {
                assert_eq!(export, ExportSelection::All);
                assert_eq!(chunk_size, Some(250));
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_rejects_out_of_range_chunk_size() {
        assert!(Cli::try_parse_from([
            "bibliotecario",
            "submit",
            "notes.csv",
            "--chunk-size",
            "50",
        ])
        .is_err());
    }
}
