//! Dust-attack labeling by fee-rate outliers.
//!
//! Two phases: every sub-transaction fee rate of the whole corpus is collected
//! into one sample and turned into an [`UpperFence`]; then each transaction is
//! labeled against that one fence. A dust campaign consolidates at consistently
//! low fee rates, so a single sub-transaction above the fence means ordinary
//! spending.

use crate::record::{f64_of, TxFile, DUST_ATTACKER, SENT_UTXO_UXNS, TXN_FEE_RATE};
use serde_json::{Map, Value};

/// Tukey's fence multiplier.
pub const IQR_MULTIPLIER: f64 = 1.5;

/// Percentile of an ascending sample with linear interpolation between the two
/// closest ranks (`p` in `0.0..=100.0`).
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (sorted.len() - 1) as f64 * (p / 100.0).clamp(0.0, 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Immutable threshold snapshot computed from the corpus-wide sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpperFence {
    pub q1: f64,
    pub q3: f64,
    pub multiplier: f64,
    pub sample_len: usize,
}

impl UpperFence {
    /// `None` for an empty sample.
    pub fn from_sample(mut sample: Vec<f64>, multiplier: f64) -> Option<Self> {
        sample.sort_by(f64::total_cmp);
        Some(Self {
            q1: percentile(&sample, 25.0)?,
            q3: percentile(&sample, 75.0)?,
            multiplier,
            sample_len: sample.len(),
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// `Q3 + m * IQR`
    pub fn threshold(&self) -> f64 {
        self.q3 + self.multiplier * self.iqr()
    }
}

/// Fee rates of the sub-transactions of `tx`. A missing rate reads as zero; a
/// non-numeric one yields `None`.
fn sub_fee_rates(tx: &Map<String, Value>) -> impl Iterator<Item = Option<f64>> + '_ {
    let sent: &[Value] = match tx.get(SENT_UTXO_UXNS) {
        Some(Value::Array(a)) => a,
        _ => &[],
    };
    sent.iter()
        .filter_map(Value::as_object)
        .map(|sub| match sub.get(TXN_FEE_RATE) {
            None => Some(0.0),
            Some(v) => f64_of(v),
        })
}

/// Phase 1 for one file.
pub fn collect_fee_rates(file: &TxFile) -> Vec<f64> {
    file.transactions()
        .flat_map(sub_fee_rates)
        .flatten()
        .collect()
}

/// True unless some sub-transaction pays above `threshold`. Vacuously true with
/// no sub-transactions; unreadable rates are skipped.
pub fn is_dust_attack(tx: &Map<String, Value>, threshold: f64) -> bool {
    sub_fee_rates(tx).flatten().all(|rate| rate <= threshold)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LabelCounts {
    pub processed: usize,
    /// transactions labeled `"0"`
    pub non_dust: usize,
}

impl std::ops::AddAssign for LabelCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.non_dust += rhs.non_dust;
    }
}

/// Phase 2 for one file.
pub fn label(file: &mut TxFile, threshold: f64) -> LabelCounts {
    let mut counts = LabelCounts::default();
    for tx in file.transactions_mut() {
        counts.processed += 1;
        let dust = is_dust_attack(tx, threshold);
        if !dust {
            counts.non_dust += 1;
        }
        tx.insert(DUST_ATTACKER.into(), if dust { "1" } else { "0" }.into());
    }
    counts
}

#[cfg(test)]
mod test {
    use crate::outlier::{collect_fee_rates, label, percentile, LabelCounts, UpperFence, IQR_MULTIPLIER};
    use crate::record::TxFile;
    use serde_json::json;

    fn sample() -> Vec<f64> {
        vec![5.0, 1.0, 100.0, 2.0, 3.0, 4.0, 6.0, 7.0, 8.0, 9.0]
    }

    #[test]
    fn linear_percentile() {
        let mut s = sample();
        s.sort_by(f64::total_cmp);
        assert_eq!(percentile(&s, 25.0), Some(3.25));
        assert_eq!(percentile(&s, 75.0), Some(7.75));
        assert_eq!(percentile(&s, 0.0), Some(1.0));
        assert_eq!(percentile(&s, 100.0), Some(100.0));
        assert_eq!(percentile(&[4.0], 25.0), Some(4.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn fence() {
        let fence = UpperFence::from_sample(sample(), IQR_MULTIPLIER).unwrap();
        assert_eq!(fence.q1, 3.25);
        assert_eq!(fence.q3, 7.75);
        assert_eq!(fence.iqr(), 4.5);
        assert_eq!(fence.threshold(), 14.5);
        assert_eq!(fence.sample_len, 10);
        assert!(UpperFence::from_sample(vec![], IQR_MULTIPLIER).is_none());
    }

    fn corpus_file() -> TxFile {
        TxFile::Many(vec![
            json!({ "sent_utxo_uxns": [{"Txn Fee Rate": 1}, {"Txn Fee Rate": 14.5}] }),
            json!({ "sent_utxo_uxns": [{"Txn Fee Rate": 3}, {"Txn Fee Rate": "20"}] }),
            json!({ "sent_utxo_uxns": [] }),
            json!({ "sent_utxo_uxns": [{"Txn Fee Rate": "n/a"}, {}] }),
        ])
    }

    #[test]
    fn collection() {
        let rates = collect_fee_rates(&corpus_file());
        assert_eq!(rates, [1.0, 14.5, 3.0, 20.0, 0.0]);
    }

    #[test]
    fn labeling() {
        let mut file = corpus_file();
        let counts = label(&mut file, 14.5);
        assert_eq!(
            counts,
            LabelCounts {
                processed: 4,
                non_dust: 1
            }
        );
        let TxFile::Many(txs) = &file else {
            unreachable!()
        };
        let labels = txs
            .iter()
            .map(|x| x["dust_attacker"].as_str().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(labels, ["1", "0", "1", "1"]);
    }
}
