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

//! Script bytes
//!
//! Scripts are opaque to this crate: the codec and the coin selector never
//! interpret them, they only move them around and hash them.

use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::encode::{Decodable, Decoder, Encodable};
use crate::hash_types::{ScriptHash, WScriptHash};

/// An ordered sequence of script bytes.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Script(Vec<u8>);

impl Script {
    /// Create an empty script.
    pub fn new() -> Self {
        Script(Vec::new())
    }

    /// Length of the script in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the script has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw script bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the script into its raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// The RIPEMD160-of-SHA256 digest of the script bytes, as used to key the
    /// redeem-script table.
    pub fn script_hash(&self) -> ScriptHash {
        ScriptHash::hash(&self.0)
    }

    /// The single-SHA256 digest of the script bytes, as used to key the
    /// witness-script table.
    pub fn wscript_hash(&self) -> WScriptHash {
        WScriptHash::hash(&self.0)
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }
}

impl From<&[u8]> for Script {
    fn from(bytes: &[u8]) -> Self {
        Script(bytes.to_vec())
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Encodable for Script {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        self.0.consensus_encode(writer)
    }
}

impl Decodable for Script {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, crate::encode::Error> {
        Ok(Script(Vec::<u8>::consensus_decode(decoder)?))
    }
}
