//! Byte sizes of UTXO descriptors.
//!
//! Outputs use fixed conventional sizes per script family. Inputs are sized by
//! the SegWit weight rules, as virtual bytes.
//!
//! References:
//!
//! - https://learnmeabitcoin.com/technical/transaction/#structure
//! - https://learnmeabitcoin.com/technical/transaction/size/#weight

use crate::record::{Descriptor, Role};
use crate::script_type::ScriptType;

/// previous txid (32) + previous vout (4) + sequence (4)
pub const TXIN_BASE_SIZE: usize = 32 + 4 + 4;

pub const WITNESS_SCALE_FACTOR: usize = 4;

/// Size of an output of the given type. These are the conventional sizes used
/// for cost comparison, not recomputed from script bytes.
pub fn output_size(script_type: ScriptType) -> usize {
    match script_type.family() {
        ScriptType::P2pkh => 34,
        ScriptType::P2sh => 32,
        ScriptType::P2wpkh => 31,
        ScriptType::P2wsh => 43,
        ScriptType::P2tr => 43,
        ScriptType::OpReturn => 0,
        _ => 43,
    }
}

/// Length of the length prefix in the size model: 1, 3 or 5 bytes.
///
/// This caps at 5 bytes on purpose and is not Bitcoin's CompactSize, which
/// takes 9 bytes above `u32::MAX`. Cost figures across the corpus are computed
/// with this model, so it must not be "corrected".
pub fn varint_size(n: usize) -> usize {
    match n {
        0..=252 => 1,
        253..=65535 => 3,
        _ => 5,
    }
}

/// Byte length of a hex payload. Two characters per byte.
#[inline]
pub fn hex_byte_len(hex: &str) -> usize {
    hex.trim().len() / 2
}

/// Virtual size of an input.
///
/// With a witness stack, the non-witness part counts four times and the witness
/// once, and the weight is rounded up to whole vbytes. Without one it is the
/// plain serialized size.
pub fn input_vsize(script_sig_hex: Option<&str>, witness: &[&str]) -> usize {
    let script_sig_len = script_sig_hex.map(hex_byte_len).unwrap_or(0);
    let base_size = TXIN_BASE_SIZE + varint_size(script_sig_len) + script_sig_len;

    if witness.is_empty() {
        return base_size;
    }

    // witness item count, then <length prefix> <data> for each item
    let witness_size = 1 + witness
        .iter()
        .map(|x| {
            let len = hex_byte_len(x);
            varint_size(len) + len
        })
        .sum::<usize>();
    let weight = base_size * WITNESS_SCALE_FACTOR + witness_size;
    weight.div_ceil(WITNESS_SCALE_FACTOR)
}

pub fn size_of(utxo: &Descriptor, script_type: ScriptType, role: Role) -> usize {
    match role {
        Role::Input => input_vsize(utxo.script_sig.hex, &utxo.witness),
        Role::Output => output_size(script_type),
    }
}

#[cfg(test)]
mod test {
    use crate::script_type::ScriptType;
    use crate::size::{input_vsize, output_size, varint_size};

    #[test]
    fn varint() {
        assert_eq!(varint_size(0), 1);
        assert_eq!(varint_size(252), 1);
        assert_eq!(varint_size(253), 3);
        assert_eq!(varint_size(65535), 3);
        assert_eq!(varint_size(65536), 5);
        assert_eq!(varint_size(10_000_000), 5);
    }

    #[test]
    fn legacy_input() {
        let script_sig = "ab".repeat(50);
        assert_eq!(input_vsize(Some(&script_sig), &[]), 91);
        assert_eq!(input_vsize(None, &[]), 41);
        assert_eq!(input_vsize(Some(""), &[]), 41);
    }

    #[test]
    fn witness_input() {
        let item = "cd".repeat(64);
        assert_eq!(input_vsize(None, &[&item, &item]), 74);
        assert_eq!(input_vsize(Some(""), &[&item, &item]), 74);

        // P2SH-P2WPKH: 23-byte redeem push, 72-byte signature, 33-byte pubkey
        let script_sig = format!("160014{}", "11".repeat(20));
        let sig = "22".repeat(72);
        let pubkey = "33".repeat(33);
        // base 64, witness 1 + 73 + 34 = 108, weight 364
        assert_eq!(input_vsize(Some(&script_sig), &[&sig, &pubkey]), 91);
    }

    #[test]
    fn witness_rounds_up() {
        // base 41, witness 1 + 2 = 3, weight 167 -> 41.75
        assert_eq!(input_vsize(None, &["aa"]), 42);
    }

    #[test]
    fn output_table() {
        assert_eq!(output_size(ScriptType::P2pkh), 34);
        assert_eq!(output_size(ScriptType::P2sh), 32);
        assert_eq!(output_size(ScriptType::P2shP2wpkh), 32);
        assert_eq!(output_size(ScriptType::P2wpkh), 31);
        assert_eq!(output_size(ScriptType::P2wsh), 43);
        assert_eq!(output_size(ScriptType::P2tr), 43);
        assert_eq!(output_size(ScriptType::P2trKeyPath), 43);
        assert_eq!(output_size(ScriptType::OpReturn), 0);
        assert_eq!(output_size(ScriptType::NonStandard), 43);
    }
}
