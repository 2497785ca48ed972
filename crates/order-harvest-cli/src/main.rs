// Copyright 2026 Order Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Command-line entry point for order harvesting.

mod cli;

use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use order_harvest::config::{HarvestConfig, OutputFormat};

#[derive(Parser)]
#[command(
    name = "order-harvest",
    about = "Download every order document from a paginated portal list and merge them into one table",
    version
)]
struct Cli {
    /// Path to a JSON config file (default: $HARVEST_CONFIG, then ./order-harvest.json).
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Print the run summary as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with the browser profile, download every row, and merge.
    Run(RunArgs),

    /// Merge documents already downloaded into a directory.
    Merge {
        /// Directory holding the downloaded documents.
        dir: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Check Chromium, profile and output directory readiness.
    Doctor,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   order-harvest completions bash > ~/.local/share/bash-completion/completions/order-harvest
    ///   order-harvest completions zsh > ~/.zfunc/_order-harvest
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// URL of the order list page.
    #[arg(long)]
    url: Option<String>,

    /// Maximum number of documents to download (0 = all).
    #[arg(short, long)]
    limit: Option<usize>,

    /// Show the browser window.
    #[arg(long)]
    headed: bool,

    /// Chromium executable to launch.
    #[arg(long)]
    chromium: Option<PathBuf>,

    /// Browser profile directory holding the signed-in session.
    #[arg(long)]
    profile: Option<PathBuf>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug, Default)]
struct OutputArgs {
    /// Directory for the merged table.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output file name prefix.
    #[arg(long)]
    prefix: Option<String>,

    /// Output format (xlsx, csv).
    #[arg(long, value_parser = parse_format)]
    format: Option<OutputFormat>,
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    s.parse().map_err(|e: order_harvest::HarvestError| e.to_string())
}

impl RunArgs {
    fn apply(self, config: &mut HarvestConfig) {
        if let Some(url) = self.url {
            config.list_url = Some(url);
        }
        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if self.headed {
            config.headless = false;
        }
        if let Some(path) = self.chromium {
            config.chromium_path = Some(path);
        }
        if let Some(dir) = self.profile {
            config.profile_dir = Some(dir);
        }
        self.output.apply(config);
    }
}

impl OutputArgs {
    fn apply(self, config: &mut HarvestConfig) {
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(prefix) = self.prefix {
            config.output_prefix = prefix;
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => {
            let mut config = HarvestConfig::load(cli.config.as_deref())?;
            args.apply(&mut config);
            cli::run_cmd::run(config, cli.json).await
        }

        Commands::Merge { dir, output } => {
            let mut config = HarvestConfig::load(cli.config.as_deref())?;
            output.apply(&mut config);
            cli::merge_cmd::run(config, &dir, cli.json)
        }

        Commands::Doctor => {
            let config = HarvestConfig::load(cli.config.as_deref())?;
            cli::doctor::run(&config, cli.config.as_deref())
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "order-harvest", &mut std::io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_override_config() {
        let cli = Cli::try_parse_from([
            "order-harvest",
            "--json",
            "run",
            "--url",
            "https://portal.example.com/po",
            "--limit",
            "25",
            "--headed",
            "--format",
            "csv",
            "-o",
            "out",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = HarvestConfig::default();
        args.apply(&mut config);
        assert_eq!(config.list_url.as_deref(), Some("https://portal.example.com/po"));
        assert_eq!(config.limit, 25);
        assert!(!config.headless);
        assert_eq!(config.output_format, OutputFormat::Csv);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.output_prefix, "merged_orders");
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let cli = Cli::try_parse_from(["order-harvest", "merge", "downloads"]).unwrap();
        let Commands::Merge { dir, output } = cli.command else {
            panic!("expected merge");
        };
        assert_eq!(dir, PathBuf::from("downloads"));
        let mut config = HarvestConfig {
            output_prefix: "from_file".to_string(),
            ..Default::default()
        };
        output.apply(&mut config);
        assert_eq!(config.output_prefix, "from_file");
        assert_eq!(config.output_format, OutputFormat::Xlsx);
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(Cli::try_parse_from(["order-harvest", "run", "--format", "pdf"]).is_err());
    }
}
