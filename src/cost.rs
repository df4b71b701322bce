//! Fee cost of UTXOs and the attack effect of a transaction.
//!
//! Victim cost is what the receiver of a dust input pays to spend it; attack
//! cost is what the attacker paid for the dust output in the sub-transaction.
//! All figures are recomputed on every run.

use crate::record::{
    decimal_of, edit_embedded, entries_mut, ATTACK_COST_BTC, ATTACK_EFFECT, BYTES,
    INPUT_UTXO_DETAILS, OUTPUT_UTXO_DETAILS, SENT_UTXO_UXNS, TOTAL_ATTACK_COST_BTC,
    TOTAL_VICTIM_COST_BTC, TXN_FEE_RATE, VICTIM_COST_BTC,
};
use log::warn;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Value};

/// Fee rates below 1 sat/vB (including missing or negative ones) are charged at 1.
pub const MIN_FEE_RATE: Decimal = Decimal::ONE;

const SATS_PER_BTC: u64 = 100_000_000;

pub const BTC_DECIMALS: u32 = 8;
pub const PERCENT_DECIMALS: u32 = 2;

/// Rounds half to even and prints exactly `places` decimals.
pub fn format_fixed(value: Decimal, places: u32) -> String {
    let mut value = value.round_dp_with_strategy(places, RoundingStrategy::MidpointNearestEven);
    value.rescale(places);
    value.to_string()
}

pub fn effective_fee_rate(fee_rate: Option<Decimal>) -> Decimal {
    fee_rate.unwrap_or(Decimal::ZERO).max(MIN_FEE_RATE)
}

/// `bytes * max(fee_rate, 1) / 1e8`, rounded to 8 places. A fee rate so large
/// that the product overflows is charged at the floor.
pub fn cost_btc(bytes: u64, fee_rate: Option<Decimal>) -> Decimal {
    let bytes = Decimal::from(bytes);
    let sats = bytes
        .checked_mul(effective_fee_rate(fee_rate))
        .or_else(|| {
            warn!("Fee rate {fee_rate:?} overflows; charged at {MIN_FEE_RATE} sat/vB");
            bytes.checked_mul(MIN_FEE_RATE)
        })
        .unwrap_or_default();
    sats.checked_div(Decimal::from(SATS_PER_BTC))
        .unwrap_or_default()
        .round_dp_with_strategy(BTC_DECIMALS, RoundingStrategy::MidpointNearestEven)
}

/// Victim cost relative to attack cost, in percent. Zero when nothing was spent
/// on the attack.
pub fn attack_effect(total_victim: Decimal, total_attack: Decimal) -> Decimal {
    if total_attack <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    total_victim
        .checked_div(total_attack)
        .and_then(|x| x.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

/// Recorded `bytes` of a descriptor; missing or malformed reads as zero.
fn bytes_of(utxo: &Map<String, Value>) -> u64 {
    match utxo.get(BYTES) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Writes `cost_key` on `utxo` and returns the cost.
fn annotate_cost(utxo: &mut Map<String, Value>, fee_rate: Option<Decimal>, cost_key: &str) -> Decimal {
    let cost = cost_btc(bytes_of(utxo), fee_rate);
    utxo.insert(cost_key.into(), format_fixed(cost, BTC_DECIMALS).into());
    cost
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TxCosts {
    pub total_victim: Decimal,
    pub total_attack: Decimal,
    pub attack_effect: Decimal,
}

/// Computes and writes every cost field of one transaction.
pub fn annotate_costs(tx: &mut Map<String, Value>) -> TxCosts {
    let fee_rate = tx.get(TXN_FEE_RATE).and_then(decimal_of);

    let total_victim = edit_embedded(tx, INPUT_UTXO_DETAILS, |inputs| {
        entries_mut(inputs)
            .map(|x| annotate_cost(x, fee_rate, VICTIM_COST_BTC))
            .fold(Decimal::ZERO, Decimal::saturating_add)
    })
    .unwrap_or_default();

    let mut total_attack = Decimal::ZERO;
    if let Some(Value::Array(sent)) = tx.get_mut(SENT_UTXO_UXNS) {
        for sub in sent.iter_mut().filter_map(Value::as_object_mut) {
            let sub_fee_rate = sub.get(TXN_FEE_RATE).and_then(decimal_of);
            // `[]` when no output of the sub-transaction was matched
            let cost = edit_embedded(sub, OUTPUT_UTXO_DETAILS, |matched| match matched {
                Value::Object(o) => annotate_cost(o, sub_fee_rate, ATTACK_COST_BTC),
                _ => Decimal::ZERO,
            });
            total_attack = total_attack.saturating_add(cost.unwrap_or_default());
        }
    }

    let effect = attack_effect(total_victim, total_attack);
    tx.insert(
        TOTAL_VICTIM_COST_BTC.into(),
        format_fixed(total_victim, BTC_DECIMALS).into(),
    );
    tx.insert(
        TOTAL_ATTACK_COST_BTC.into(),
        format_fixed(total_attack, BTC_DECIMALS).into(),
    );
    tx.insert(
        ATTACK_EFFECT.into(),
        format_fixed(effect, PERCENT_DECIMALS).into(),
    );

    TxCosts {
        total_victim,
        total_attack,
        attack_effect: effect,
    }
}
