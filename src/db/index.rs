//! Code implementing the `db index` sub command.

use clap::Parser;

use crate::common;
use crate::db::SequenceIndex;

/// Command line arguments for `db index` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Build the sequence dataset index", long_about = None)]
pub struct Args {
    /// Path to the FASTA file with all input protein sequences.
    #[arg(long, required = true)]
    pub path_fasta: String,
    /// Path to the index file to write.
    #[arg(long, required = true)]
    pub path_output: String,
}

/// Main entry point for the `db index` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let index = SequenceIndex::build(&args.path_fasta)?;
    index.save(&args.path_output)?;
    tracing::info!(
        "indexed {} sequences from {}",
        index.entries.len(),
        &args.path_fasta
    );

    Ok(())
}
