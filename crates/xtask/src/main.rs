mod build;
mod cli;
mod constants;
mod flash;
mod rtt;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use constants::app_elf;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build { features, no_default_features, release } => {
            println!("Building firmware...");
            build::build_firmware(
                features.as_deref(),
                *no_default_features,
                *release,
            )?;
            println!("Build complete!");
        }
        Commands::Flash { features, no_default_features, release, force } => {
            flash::flash_firmware(
                features.as_deref(),
                *no_default_features,
                *release,
                *force,
            )?;
        }
        Commands::Run { features, no_default_features, release } => {
            flash::flash_firmware(
                features.as_deref(),
                *no_default_features,
                *release,
                false,
            )?;

            println!("Attaching RTT...");
            rtt::run(&app_elf(*release))?;
        }
        Commands::Attach { release } => {
            rtt::run(&app_elf(*release))?;
        }
    }

    Ok(())
}
