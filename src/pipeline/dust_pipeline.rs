//! All three stages over one corpus, in order.

use clap::Parser;
use dust_attack::config::{CorpusArgs, FenceArgs};
use dust_attack::stage;
use log::info;

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

    stage::annotate_script_bytes(&files);
    stage::attack_metrics(&files);
    if let Some(report) = stage::dust_filtration(&files, args.fence.iqr_multiplier) {
        info!(
            "Dust attacks: {} of {} transactions",
            report.labels.processed - report.labels.non_dust,
            report.labels.processed
        );
    }
    Ok(())
}
