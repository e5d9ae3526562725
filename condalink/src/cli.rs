use clap::{Parser, Subcommand};

/// condalink - WSL/conda execution bridge for the landmark pipeline
#[derive(Parser, Debug)]
#[command(name = "condalink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision the runtime and environment, then dispatch one job
    Setup {
        /// Miniconda install prefix inside WSL (e.g. ~/miniconda3)
        #[arg(value_name = "INSTALL_PREFIX")]
        install_prefix: String,

        /// Host path to the input scan (file or directory)
        #[arg(value_name = "INPUT")]
        input: String,

        /// Host path to the trained models directory
        #[arg(value_name = "DIR_MODELS")]
        dir_models: String,

        /// Space-separated landmark types (e.g. "O MB DB")
        #[arg(value_name = "LM_TYPES")]
        lm_types: String,

        /// Space-separated tooth selectors (e.g. "UR6 UL1")
        #[arg(value_name = "TEETH")]
        teeth: String,

        /// Group outputs into a per-scan folder ("true" / "false")
        #[arg(value_name = "SAVE_IN_FOLDER")]
        save_in_folder: String,

        /// Host path to the output directory
        #[arg(value_name = "OUTPUT_DIR")]
        output_dir: String,
    },

    /// Diagnose the subsystem: WSL, runtime, environment, ML capabilities
    Doctor {
        /// Environment name to probe (default: from env or aliIOSCondaCli)
        #[arg(long, value_name = "NAME")]
        env_name: Option<String>,
    },
}
