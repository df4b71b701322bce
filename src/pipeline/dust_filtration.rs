//! Label dust-attack transactions.
//!
//! First all sub-transaction fee rates of the corpus are collected to get the
//! upper fence `Q3 + m * IQR`. A transaction is a dust attack (`"1"`) if none of
//! its sub-transactions pays above it.

use clap::Parser;
use dust_attack::config::{CorpusArgs, FenceArgs};
use dust_attack::stage;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    corpus: CorpusArgs,
    #[command(flatten)]
    fence: FenceArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let files = args.corpus.init()?;
    stage::dust_filtration(&files, args.fence.iqr_multiplier);
    Ok(())
}
