//! Annotate every UTXO of the corpus with its script type and byte size, and
//! record which output of each sent sub-transaction spends the dust.
//!
//! Files are rewritten in place.

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
    stage::annotate_script_bytes(&files);
    Ok(())
}
