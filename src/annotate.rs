//! Script type and byte size annotation of a transaction, and matching of each
//! sent sub-transaction to the dust output it spends.

use crate::record::{
    decimal_of, decoded, edit_embedded, entries, entries_mut, insert_after, to_spaced_string,
    Descriptor, Role, AMOUNT, BYTES, INPUT_DETAILS, INPUT_UTXO_DETAILS, OUTPUT_DETAILS,
    OUTPUT_UTXO_DETAILS, SCRIPT_TYPE, SENT_UTXO_UXNS, TXID, TXN_HASH,
};
use crate::script_type::{classify, ScriptType};
use crate::size::size_of;
use fxhash::FxHashMap;
use log::debug;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::ops::AddAssign;

/// Amounts closer than this are the same UTXO value (1e-8 BTC).
pub const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// Number of descriptors per script type.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScriptCensus(pub FxHashMap<ScriptType, usize>);

impl ScriptCensus {
    pub fn record(&mut self, script_type: ScriptType) {
        *self.0.entry(script_type).or_default() += 1;
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Sorted by script type.
    pub fn sorted(&self) -> Vec<(ScriptType, usize)> {
        let mut list = self.0.iter().map(|(&k, &v)| (k, v)).collect::<Vec<_>>();
        list.sort_by_key(|x| x.0);
        list
    }
}

impl AddAssign for ScriptCensus {
    fn add_assign(&mut self, rhs: Self) {
        for (k, v) in rhs.0 {
            *self.0.entry(k).or_default() += v;
        }
    }
}

/// Writes `scriptType` and `bytes` on one descriptor.
pub fn annotate_utxo(utxo: &mut Map<String, Value>, role: Role) -> ScriptType {
    let (script_type, bytes) = {
        let descriptor = Descriptor::read(utxo, role);
        let script_type = classify(&descriptor, role);
        (script_type, size_of(&descriptor, script_type, role))
    };
    utxo.insert(SCRIPT_TYPE.into(), script_type.as_str().into());
    utxo.insert(BYTES.into(), Value::from(bytes as u64));
    script_type
}

/// Annotates the entries of a detail field. With `role` given, only entries
/// carrying that role's address key are touched; otherwise each entry's role is
/// read from its keys.
fn annotate_details(
    tx: &mut Map<String, Value>,
    key: &str,
    role: Option<Role>,
    census: &mut ScriptCensus,
) {
    let edited = edit_embedded(tx, key, |details| {
        for utxo in entries_mut(details) {
            let entry_role = match (role, Role::of(utxo)) {
                (Some(r), _) if utxo.contains_key(r.address_key()) => r,
                (None, Some(r)) => r,
                _ => continue,
            };
            census.record(annotate_utxo(utxo, entry_role));
        }
    });
    if edited.is_none() && tx.contains_key(key) {
        debug!(
            "Undecodable '{key}' in {}",
            tx.get(TXN_HASH).and_then(Value::as_str).unwrap_or("?")
        );
    }
}

/// Parent input amounts grouped by the txid of the transaction that created them.
fn input_amounts(tx: &Map<String, Value>) -> FxHashMap<String, Vec<Decimal>> {
    let mut map: FxHashMap<String, Vec<Decimal>> = FxHashMap::default();
    let Some(inputs) = tx.get(INPUT_UTXO_DETAILS).and_then(decoded) else {
        return map;
    };
    for utxo in entries(&inputs) {
        let Some(txid) = utxo.get(TXID).and_then(Value::as_str) else {
            continue;
        };
        let Some(amount) = utxo.get(AMOUNT).and_then(decimal_of) else {
            continue;
        };
        if txid.is_empty() || amount.is_zero() {
            continue;
        }
        map.entry(txid.to_owned()).or_default().push(amount);
    }
    map
}

/// The first output of `outputs` whose amount equals one of `amounts`.
pub fn match_output<'a>(outputs: &'a Value, amounts: &[Decimal]) -> Option<&'a Map<String, Value>> {
    entries(outputs).find(|o| {
        let Some(amount) = o.get(AMOUNT).and_then(decimal_of) else {
            return false;
        };
        amounts
            .iter()
            .any(|&x| amount.checked_sub(x).is_some_and(|d| d.abs() < AMOUNT_TOLERANCE))
    })
}

/// Annotates a sub-transaction's outputs and records its matched output, as a
/// JSON string right after `Txn Output Details` (`[]` if none matched).
fn annotate_sub_transaction(
    sub: &mut Map<String, Value>,
    parent_amounts: &FxHashMap<String, Vec<Decimal>>,
    census: &mut ScriptCensus,
) {
    if !sub.contains_key(OUTPUT_DETAILS) {
        return;
    }
    annotate_details(sub, OUTPUT_DETAILS, Some(Role::Output), census);

    let amounts = sub
        .get(TXN_HASH)
        .and_then(Value::as_str)
        .and_then(|x| parent_amounts.get(x))
        .map(Vec::as_slice)
        .unwrap_or_default();
    let matched = sub
        .get(OUTPUT_DETAILS)
        .and_then(decoded)
        .and_then(|outputs| {
            match_output(&outputs, amounts).map(|o| to_spaced_string(&Value::Object(o.clone())))
        })
        .unwrap_or_else(|| "[]".into());
    insert_after(sub, OUTPUT_DETAILS, OUTPUT_UTXO_DETAILS, Value::String(matched));
}

/// Annotates every descriptor of one transaction and its sub-transactions.
pub fn annotate_transaction(tx: &mut Map<String, Value>, census: &mut ScriptCensus) {
    annotate_details(tx, INPUT_UTXO_DETAILS, None, census);
    annotate_details(tx, INPUT_DETAILS, Some(Role::Input), census);
    annotate_details(tx, OUTPUT_DETAILS, Some(Role::Output), census);

    let parent_amounts = input_amounts(tx);
    if let Some(Value::Array(sent)) = tx.get_mut(SENT_UTXO_UXNS) {
        for sub in sent.iter_mut().filter_map(Value::as_object_mut) {
            annotate_sub_transaction(sub, &parent_amounts, census);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::annotate::{annotate_transaction, match_output, ScriptCensus};
    use crate::script_type::ScriptType;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use std::str::FromStr;

    const P2WPKH_ADDR: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";

    fn sample_tx() -> Value {
        let inputs = json!([
            {
                "inputHash": "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
                "txid": "sub1",
                "amount": "0.00000546",
                "scriptSig": {"hex": "ab".repeat(107), "asm": "3044 02aa"},
            },
            {
                "inputHash": P2WPKH_ADDR,
                "txid": "sub2",
                "amount": 0.00000294,
                "txinwitness": ["cd".repeat(71), "ef".repeat(33)],
            },
        ]);
        json!({
            "Txn Hash": "parent",
            "Txn Fee Rate": 4,
            "Txn Input UTXO Details": inputs.to_string(),
            "Txn Output Details": [{"outputHash": "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy", "amount": 0.001}],
            "sent_utxo_uxns": [
                {
                    "Txn Hash": "sub1",
                    "Txn Fee Rate": 1,
                    "Txn Output Details": "[{\"outputHash\": \"OP_RETURN\", \"amount\": 0}, {\"outputHash\": \"1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2\", \"amount\": 0.00000546}]",
                    "note": "kept",
                },
                {
                    "Txn Hash": "unrelated",
                    "Txn Output Details": [{"outputHash": P2WPKH_ADDR, "amount": 0.00000294}],
                },
            ],
        })
    }

    fn run(tx: &mut Value) -> ScriptCensus {
        let mut census = ScriptCensus::default();
        annotate_transaction(tx.as_object_mut().unwrap(), &mut census);
        census
    }

    #[test]
    fn inputs_and_outputs() {
        let mut tx = sample_tx();
        let census = run(&mut tx);

        let inputs: Value =
            serde_json::from_str(tx["Txn Input UTXO Details"].as_str().unwrap()).unwrap();
        assert_eq!(inputs[0]["scriptType"], "P2PKH");
        assert_eq!(inputs[0]["bytes"], 148);
        assert_eq!(inputs[1]["scriptType"], "P2WPKH");
        // base 41, witness 1 + 72 + 34 = 107, weight 271
        assert_eq!(inputs[1]["bytes"], 68);

        assert_eq!(tx["Txn Output Details"][0]["scriptType"], "P2SH");
        assert_eq!(tx["Txn Output Details"][0]["bytes"], 32);

        assert_eq!(census.total(), 6);
        assert_eq!(census.0[&ScriptType::P2pkh], 2);
        assert_eq!(census.0[&ScriptType::OpReturn], 1);
    }

    #[test]
    fn sub_transaction_matching() {
        let mut tx = sample_tx();
        run(&mut tx);
        let sub = tx["sent_utxo_uxns"][0].as_object().unwrap();
        let keys = sub.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(
            keys,
            ["Txn Hash", "Txn Fee Rate", "Txn Output Details", "Txn Output UTXO Details", "note"]
        );
        assert_eq!(
            sub["Txn Output UTXO Details"],
            "{\"outputHash\": \"1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2\", \"amount\": 0.00000546, \"scriptType\": \"P2PKH\", \"bytes\": 34}"
        );
        assert!(sub["Txn Output Details"].is_string());

        // txid not among the parent's inputs
        assert_eq!(tx["sent_utxo_uxns"][1]["Txn Output UTXO Details"], "[]");
    }

    #[test]
    fn rerun_is_stable() {
        let mut tx = sample_tx();
        tx["Txn Input Details"] = json!([
            {
                "inputHash": "",
                "scriptType": "P2SH",
                "scriptSig": {"hex": format!("160014{}", "11".repeat(20))},
                "txinwitness": ["aa", "bb"],
            },
            {"inputHash": "", "scriptType": "p2tr", "txinwitness": ["aa"]},
            {"inputHash": "", "scriptType": "P2SH", "scriptSig": {"hex": "zz"}},
        ]);
        run(&mut tx);
        let first = tx.clone();
        let tags = |tx: &Value| {
            tx["Txn Input Details"]
                .as_array()
                .unwrap()
                .iter()
                .map(|x| x["scriptType"].as_str().unwrap().to_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(
            tags(&first),
            ["P2SH-P2WPKH", "P2TR_key_path", "Non-Standard P2SH"]
        );

        run(&mut tx);
        assert_eq!(tx, first);
    }

    #[test]
    fn malformed_amounts_never_match() {
        let outputs = json!([
            {"outputHash": "1abc", "amount": "lots"},
            {"outputHash": "1abc", "amount": "79228162514264337593543950335"},
            {"outputHash": "1abc", "amount": 0.00000546},
        ]);
        let amounts = [Decimal::MIN, Decimal::from_str("0.00000546").unwrap()];
        let matched = match_output(&outputs, &amounts).unwrap();
        assert_eq!(matched["amount"], outputs[2]["amount"]);
        assert!(match_output(&outputs, &[Decimal::MIN]).is_none());
    }

    #[test]
    fn malformed_parent_amount_skipped() {
        let mut tx = sample_tx();
        tx["Txn Input UTXO Details"] = json!([
            {"inputHash": "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", "txid": "sub1", "amount": "n/a"},
        ])
        .to_string()
        .into();
        run(&mut tx);
        assert_eq!(tx["sent_utxo_uxns"][0]["Txn Output UTXO Details"], "[]");
    }
}
