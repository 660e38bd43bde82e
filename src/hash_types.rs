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

//! Hash types
//!
//! The three digests used by the codec: transaction ids (double SHA256),
//! redeem-script hashes (RIPEMD160 of SHA256) and witness-script hashes
//! (single SHA256). Each wraps the corresponding [`bitcoin_hashes`] engine
//! and is compared by value.

use std::fmt;
use std::str::FromStr;

use bitcoin_hashes::{hash160, hex, sha256, sha256d, Hash};

use serde::{Deserialize, Serialize};

macro_rules! digest_newtype {
    ($(#[$doc:meta])* $name:ident, $inner:ty, $len:expr) => {
        $(#[$doc])*
        #[derive(
            Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
        )]
        pub struct $name($inner);

        impl $name {
            /// Length of the digest in bytes.
            pub const LEN: usize = $len;

            /// Hash `data` with a fresh hasher.
            pub fn hash(data: &[u8]) -> Self {
                $name(<$inner>::hash(data))
            }

            /// Interpret a fixed-size array as a digest.
            pub fn from_byte_array(bytes: [u8; $len]) -> Self {
                $name(<$inner>::from_byte_array(bytes))
            }

            /// Interpret a slice as a digest. Fails unless it is exactly
            /// [`LEN`](Self::LEN) bytes long.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, bitcoin_hashes::Error> {
                Ok($name(<$inner>::from_slice(bytes)?))
            }

            /// The digest as a byte array.
            pub fn to_byte_array(self) -> [u8; $len] {
                self.0.to_byte_array()
            }

            /// The digest as a borrowed byte array.
            pub fn as_byte_array(&self) -> &[u8; $len] {
                self.0.as_byte_array()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = hex::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok($name(<$inner>::from_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name(<$inner>::all_zeros())
            }
        }
    };
}

digest_newtype! {
    /// A transaction id: the double-SHA256 of a transaction's legacy
    /// serialization, displayed in reverse byte order.
    Txid, sha256d::Hash, 32
}

digest_newtype! {
    /// The RIPEMD160-of-SHA256 digest binding a redeem script to its
    /// lookup-table key.
    ScriptHash, hash160::Hash, 20
}

digest_newtype! {
    /// The single-SHA256 digest binding a witness script to its lookup-table
    /// key.
    WScriptHash, sha256::Hash, 32
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn script_hash_is_hash160() {
        // HASH160 of the single byte 0x51 (OP_TRUE)
        let hash = ScriptHash::hash(&[0x51]);
        assert_eq!(
            hash.to_string(),
            "da1745e9b549bd0bfa1a569971c77eba30cd5a4b"
        );
    }

    #[test]
    fn wscript_hash_is_single_sha256() {
        let hash = WScriptHash::hash(b"");
        assert_eq!(
            hash.to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn txid_displays_reversed() {
        let txid = Txid::from_byte_array([0xAB; 32]);
        assert!(txid.to_string().starts_with("abab"));
        let round = Txid::from_str(&txid.to_string()).unwrap();
        assert_eq!(round, txid);
    }
}
