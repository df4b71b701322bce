//! Recompute victim cost, attack cost and attack effect (ROI, %) of every
//! transaction.
//!
//! Needs the `bytes` fields from `annotate-script-bytes`.

use clap::Parser;
use dust_attack::config::CorpusArgs;
use dust_attack::stage;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    corpus: CorpusArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let files = args.corpus.init()?;
    stage::attack_metrics(&files);
    Ok(())
}
