//! JSON record model of the transaction corpus.
//!
//! A corpus file holds either one transaction object or an array of them. Some
//! fields (the UTXO detail lists) are JSON documents encoded into strings; those
//! are decoded for processing and encoded back into strings afterward, so a
//! field keeps whichever representation it had on disk.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::io;
use std::str::FromStr;

pub const TXN_HASH: &str = "Txn Hash";
pub const TXN_FEE_RATE: &str = "Txn Fee Rate";
pub const INPUT_UTXO_DETAILS: &str = "Txn Input UTXO Details";
pub const INPUT_DETAILS: &str = "Txn Input Details";
pub const OUTPUT_DETAILS: &str = "Txn Output Details";
pub const OUTPUT_UTXO_DETAILS: &str = "Txn Output UTXO Details";
pub const SENT_UTXO_UXNS: &str = "sent_utxo_uxns";

pub const INPUT_HASH: &str = "inputHash";
pub const OUTPUT_HASH: &str = "outputHash";
pub const TXID: &str = "txid";
pub const AMOUNT: &str = "amount";
pub const SCRIPT_TYPE: &str = "scriptType";
pub const SCRIPT_SIG: &str = "scriptSig";
pub const TX_IN_WITNESS: &str = "txinwitness";
pub const BYTES: &str = "bytes";

pub const VICTIM_COST_BTC: &str = "victim_cost_btc";
pub const ATTACK_COST_BTC: &str = "attack_cost_btc";
pub const TOTAL_VICTIM_COST_BTC: &str = "total_victim_cost_btc";
pub const TOTAL_ATTACK_COST_BTC: &str = "total_attack_cost_btc";
pub const ATTACK_EFFECT: &str = "attack_effect";
pub const DUST_ATTACKER: &str = "dust_attacker";

/// Which side of a transaction a UTXO descriptor sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Input,
    Output,
}

impl Role {
    /// Decides the role of an entry in a mixed detail list by its address key.
    pub fn of(object: &Map<String, Value>) -> Option<Self> {
        if object.contains_key(INPUT_HASH) {
            Some(Role::Input)
        } else if object.contains_key(OUTPUT_HASH) {
            Some(Role::Output)
        } else {
            None
        }
    }

    pub fn address_key(self) -> &'static str {
        match self {
            Role::Input => INPUT_HASH,
            Role::Output => OUTPUT_HASH,
        }
    }
}

/// A field value together with the representation it was stored in.
#[derive(Debug, Clone, PartialEq)]
pub enum Embedded {
    /// A JSON document encoded into a string.
    Text(Value),
    Native(Value),
}

impl Embedded {
    /// Moves the value out of `slot`. A string that isn't valid JSON yields `None`
    /// and `slot` is left as it was.
    pub fn take(slot: &mut Value) -> Option<Self> {
        match slot {
            Value::String(s) => serde_json::from_str(s.as_str()).ok().map(Embedded::Text),
            other => Some(Embedded::Native(other.take())),
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Embedded::Text(v) | Embedded::Native(v) => v,
        }
    }

    pub fn value_mut(&mut self) -> &mut Value {
        match self {
            Embedded::Text(v) | Embedded::Native(v) => v,
        }
    }

    pub fn encode(self) -> Value {
        match self {
            Embedded::Text(v) => Value::String(to_spaced_string(&v)),
            Embedded::Native(v) => v,
        }
    }
}

/// Read-only view of a possibly string-encoded field.
pub fn decoded(value: &Value) -> Option<Cow<'_, Value>> {
    match value {
        Value::String(s) => serde_json::from_str(s).ok().map(Cow::Owned),
        v => Some(Cow::Borrowed(v)),
    }
}

/// Runs `f` over the decoded content of `object[key]` and stores it back in its
/// original representation. Returns `None` if the key is absent or undecodable.
pub fn edit_embedded<R>(
    object: &mut Map<String, Value>,
    key: &str,
    f: impl FnOnce(&mut Value) -> R,
) -> Option<R> {
    let slot = object.get_mut(key)?;
    let mut embedded = Embedded::take(slot)?;
    let result = f(embedded.value_mut());
    *slot = embedded.encode();
    Some(result)
}

/// Object entries of a detail field, which may be a list or a single object.
pub fn entries_mut(value: &mut Value) -> impl Iterator<Item = &mut Map<String, Value>> {
    let items: &mut [Value] = match value {
        Value::Array(a) => a,
        v => std::slice::from_mut(v),
    };
    items.iter_mut().filter_map(Value::as_object_mut)
}

pub fn entries(value: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    let items: &[Value] = match value {
        Value::Array(a) => a,
        v => std::slice::from_ref(v),
    };
    items.iter().filter_map(Value::as_object)
}

/// The JSON compact form with `", "` and `": "` separators, which is how the
/// string-encoded fields in the corpus are written.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

pub fn to_spaced_string(value: &Value) -> String {
    let mut buf = Vec::new();
    let result = value.serialize(&mut serde_json::Serializer::with_formatter(
        &mut buf,
        SpacedFormatter,
    ));
    match result {
        Ok(()) => String::from_utf8(buf).unwrap_or_else(|_| value.to_string()),
        Err(_) => value.to_string(),
    }
}

/// A parsed corpus file.
#[derive(Debug, Clone, PartialEq)]
pub enum TxFile {
    Single(Value),
    Many(Vec<Value>),
}

impl TxFile {
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        Ok(match serde_json::from_slice(bytes)? {
            Value::Array(a) => TxFile::Many(a),
            v => TxFile::Single(v),
        })
    }

    fn items(&self) -> &[Value] {
        match self {
            TxFile::Single(v) => std::slice::from_ref(v),
            TxFile::Many(a) => a,
        }
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Map<String, Value>> {
        self.items().iter().filter_map(Value::as_object)
    }

    pub fn transactions_mut(&mut self) -> impl Iterator<Item = &mut Map<String, Value>> {
        let items: &mut [Value] = match self {
            TxFile::Single(v) => std::slice::from_mut(v),
            TxFile::Many(a) => a,
        };
        items.iter_mut().filter_map(Value::as_object_mut)
    }

    /// Pretty-printed with a two-space indent.
    pub fn to_pretty_vec(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            TxFile::Single(v) => serde_json::to_vec_pretty(v),
            TxFile::Many(a) => serde_json::to_vec_pretty(a),
        }
    }
}

/// `{ "hex": ..., "asm": ... }`
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct ScriptSig<'a> {
    #[serde(default, borrow)]
    pub hex: Option<&'a str>,
    #[serde(default, borrow)]
    pub asm: Option<&'a str>,
}

/// The fields of a UTXO descriptor that classification and sizing look at.
#[derive(Debug, Default, Clone)]
pub struct Descriptor<'a> {
    pub address: Option<&'a str>,
    /// Tag already present on the record, if any.
    pub script_type: Option<&'a str>,
    pub script_sig: ScriptSig<'a>,
    /// Hex-encoded witness stack items. Non-string items read as empty.
    pub witness: Vec<&'a str>,
}

impl<'a> Descriptor<'a> {
    pub fn read(object: &'a Map<String, Value>, role: Role) -> Self {
        let script_sig = match role {
            Role::Input => object
                .get(SCRIPT_SIG)
                .and_then(|v| ScriptSig::deserialize(v).ok())
                .unwrap_or_default(),
            Role::Output => ScriptSig::default(),
        };
        let witness = match (role, object.get(TX_IN_WITNESS)) {
            (Role::Input, Some(Value::Array(items))) => {
                items.iter().map(|x| x.as_str().unwrap_or("")).collect()
            }
            _ => Vec::new(),
        };
        Self {
            address: object.get(role.address_key()).and_then(Value::as_str),
            script_type: object.get(SCRIPT_TYPE).and_then(Value::as_str),
            script_sig,
            witness,
        }
    }
}

/// Parses a BTC amount or fee rate from its source text, keeping every digit.
pub fn decimal_of(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_owned(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

pub fn f64_of(value: &Value) -> Option<f64> {
    let x: f64 = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    x.is_finite().then_some(x)
}

/// Inserts `key` right after `anchor`, dropping any previous `key` entry. Appends
/// when `anchor` is missing.
pub fn insert_after(object: &mut Map<String, Value>, anchor: &str, key: &str, value: Value) {
    let old = std::mem::take(object);
    let mut value = Some(value);
    for (k, v) in old {
        if k == key {
            continue;
        }
        let is_anchor = k == anchor;
        object.insert(k, v);
        if is_anchor {
            if let Some(v) = value.take() {
                object.insert(key.to_owned(), v);
            }
        }
    }
    if let Some(v) = value {
        object.insert(key.to_owned(), v);
    }
}
