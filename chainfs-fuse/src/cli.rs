use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "Build and inspect chainfs volume images")]
pub struct Cli {
    /// Volume image file
    #[arg(long, short)]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Format a new image and copy a host directory into it
    Pack {
        /// Host directory to copy from
        #[arg(long, short)]
        source: PathBuf,

        /// Image size in MiB
        #[arg(long, default_value_t = 32)]
        size_mib: u64,

        /// Bytes per block, at least 512
        #[arg(long, default_value_t = 512)]
        block_size: usize,
    },

    /// List a directory of the image
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file of the image to stdout
    Cat { path: String },
}
