//! Main CLI application structure

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use super::output::{Output, OutputFormat};
use super::{logger, shapefile_cmd};
use crate::storage::Config;

#[derive(Parser)]
#[command(name = "soilmap")]
#[command(author, version, about = "Digital soil mapping toolkit")]
#[command(disable_version_flag = true)]
#[command(after_help = "See 'soilmap help <command>' for more information on a specific command.")]
pub struct Cli {
    /// Print soilmap version information
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    pub version: Option<bool>,

    /// Output format (defaults to the configured format)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Operations on shapefiles
    Shapefile(shapefile_cmd::ShapefileArgs),
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let config = Config::load()?;
    let format = cli
        .format
        .unwrap_or_else(|| OutputFormat::from(config.default_format));
    let output = Output::new(format, cli.verbose);

    output.verbose("soilmap starting");
    if let Some(path) = Config::path() {
        output.verbose_ctx("config", &format!("Using config: {}", path.display()));
    }

    match cli.command {
        Commands::Shapefile(args) => shapefile_cmd::run(args, &config, &output)?,
    }

    output.verbose("Command completed successfully");
    Ok(())
}
