mod cli;
mod commands;
mod observability;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Setup {
            install_prefix,
            input,
            dir_models,
            lm_types,
            teeth,
            save_in_folder,
            output_dir,
        } => commands::run_setup(
            install_prefix,
            input,
            dir_models,
            lm_types,
            teeth,
            save_in_folder,
            output_dir,
        ),
        Commands::Doctor { env_name } => commands::run_doctor(env_name),
    }
}
