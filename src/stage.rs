//! The annotation stages run over a whole corpus.
//!
//! Order: [`annotate_script_bytes`], [`attack_metrics`], [`dust_filtration`].
//! Each later stage reads fields written by the earlier ones.

use crate::annotate::{annotate_transaction, ScriptCensus};
use crate::corpus::{for_each_file, read_tx_file, rewrite, Batch};
use crate::cost::annotate_costs;
use crate::outlier::{collect_fee_rates, label, LabelCounts, UpperFence};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileCounts {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl<R> From<&Batch<R>> for FileCounts {
    fn from(batch: &Batch<R>) -> Self {
        Self {
            total: batch.total(),
            succeeded: batch.succeeded(),
            failed: batch.failed.len(),
        }
    }
}

fn log_finished(name: &str, counts: FileCounts, start: Instant) {
    info!(
        "{name}: {} files, {} succeeded, {} failed in {}",
        counts.total,
        counts.succeeded,
        counts.failed,
        humantime::format_duration(start.elapsed())
    );
}

/// Stage 1: `scriptType` and `bytes` on every descriptor, and the matched
/// output of every sub-transaction.
pub fn annotate_script_bytes(files: &[PathBuf]) -> (FileCounts, ScriptCensus) {
    let start = Instant::now();
    let batch = for_each_file(files, |path| {
        rewrite(path, |file| {
            let mut census = ScriptCensus::default();
            for tx in file.transactions_mut() {
                annotate_transaction(tx, &mut census);
            }
            census
        })
    });
    let counts = FileCounts::from(&batch);

    let mut census = ScriptCensus::default();
    for x in batch.values() {
        census += x;
    }
    info!("Classified {} UTXOs", census.total());
    for (script_type, count) in census.sorted() {
        info!("  {script_type}: {count}");
    }
    log_finished("Script bytes", counts, start);
    (counts, census)
}

/// Stage 2: victim and attack costs and the attack effect.
pub fn attack_metrics(files: &[PathBuf]) -> FileCounts {
    let start = Instant::now();
    let batch = for_each_file(files, |path| {
        rewrite(path, |file| {
            for tx in file.transactions_mut() {
                annotate_costs(tx);
            }
        })
    });
    let counts = FileCounts::from(&batch);
    log_finished("Attack metrics", counts, start);
    counts
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiltrationReport {
    pub fence: UpperFence,
    pub files: FileCounts,
    pub labels: LabelCounts,
}

/// Stage 3: corpus-wide fee-rate fence, then `dust_attacker` on every
/// transaction. Returns `None` without touching any file when the corpus has no
/// sub-transaction fee rates.
pub fn dust_filtration(files: &[PathBuf], iqr_multiplier: f64) -> Option<FiltrationReport> {
    let start = Instant::now();

    let sample = for_each_file(files, |path| Ok(collect_fee_rates(&read_tx_file(path)?)))
        .values()
        .flatten()
        .collect::<Vec<_>>();
    let Some(fence) = UpperFence::from_sample(sample, iqr_multiplier) else {
        warn!("No fee rates collected; nothing labeled");
        return None;
    };
    info!("Collected {} fee rates", fence.sample_len);
    info!(
        "Q1={:.4}, Q3={:.4}, IQR={:.4}",
        fence.q1,
        fence.q3,
        fence.iqr()
    );
    info!(
        "Upper threshold (Q3+{}*IQR)={:.4}",
        fence.multiplier,
        fence.threshold()
    );

    let threshold = fence.threshold();
    let batch = for_each_file(files, |path| rewrite(path, |file| label(file, threshold)));
    let file_counts = FileCounts::from(&batch);
    let mut labels = LabelCounts::default();
    for x in batch.values() {
        labels += x;
    }
    info!("Transactions processed: {}", labels.processed);
    info!("Transactions marked non-dust (0): {}", labels.non_dust);
    log_finished("Dust filtration", file_counts, start);

    Some(FiltrationReport {
        fence,
        files: file_counts,
        labels,
    })
}
