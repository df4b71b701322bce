//! Dust-attack annotation of an extracted Bitcoin transaction corpus.
//!
//! Each corpus file holds one transaction record or an array of them, each
//! possibly with the later "sent" sub-transactions that spent its outputs. The
//! stages in [`stage`] annotate the records in place:
//!
//! 1. script type and byte size of every input and output ([`script_type`], [`size`]);
//! 2. victim cost, attack cost and attack effect ([`cost`]);
//! 3. the `dust_attacker` label against a corpus-wide fee-rate fence ([`outlier`]).

pub mod annotate;
pub mod config;
pub mod corpus;
pub mod cost;
pub mod outlier;
pub mod record;
pub mod script_type;
pub mod size;
pub mod stage;

pub use record::{Role, TxFile};
pub use script_type::{classify, ScriptType};
