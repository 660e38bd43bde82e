// Bitcoin Dev Kit
// Written in 2020 by Alekos Filini <alekos.filini@gmail.com>
//
// Copyright (c) 2020-2021 Bitcoin Dev Kit Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Transaction transport and coin selection for UTXO wallets.
//!
//! Two independent cores sharing one set of primitives:
//!
//! - [`psbt`]: a byte-exact codec for partially signed transactions, the
//!   envelope signers and combiners pass around while a transaction is
//!   collecting signatures. Script tables are verified against their hashes
//!   during decoding, and records the codec does not recognize survive a
//!   round trip untouched.
//! - [`wallet::coin_selection`]: chooses which unspent outputs fund a target
//!   amount, with a branch-and-bound search minimizing fee waste and a
//!   randomized knapsack as its fallback.
//!
//! Everything here is a plain data transformation: no I/O, no locks, no
//! internal state between calls. Inputs come in by reference, results come
//! out owned, and independent operations can run on independent threads
//! without coordination.

pub mod encode;
#[macro_use]
pub(crate) mod error;
pub mod hash_types;
pub mod keys;
pub mod psbt;
pub mod script;
pub mod signer;
pub mod transaction;
pub(crate) mod types;
pub mod wallet;

pub use error::Error;
pub use hash_types::{ScriptHash, Txid, WScriptHash};
pub use keys::{PrivateKey, PublicKey};
pub use psbt::{PartiallySignedInput, PartiallySignedTransaction, PsbtUtils};
pub use script::Script;
pub use signer::SigningProvider;
pub use transaction::{OutPoint, Transaction, TxIn, TxOut};
pub use types::*;
pub use wallet::coin_selection::{select_bnb, select_coins, select_knapsack, InputCoin};
