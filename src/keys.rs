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

//! Key blobs
//!
//! Public keys are carried as serialized bytes: this crate routes them through
//! maps and the wire format but performs no curve arithmetic. Lookup-table
//! order is the lexicographic order of the serialized bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash_types::ScriptHash;

/// Serialized length of an uncompressed public key.
pub const PUBLIC_KEY_SIZE: usize = 65;
/// Serialized length of a compressed public key.
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;

/// A serialized public key, 33 bytes (compressed) or 65 bytes (uncompressed).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey(Vec<u8>);

/// The error returned when a byte slice is not a plausible public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPublicKeyLength(pub usize);

impl fmt::Display for InvalidPublicKeyLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid public key length {}, expected {} or {}",
            self.0, COMPRESSED_PUBLIC_KEY_SIZE, PUBLIC_KEY_SIZE
        )
    }
}

impl std::error::Error for InvalidPublicKeyLength {}

impl PublicKey {
    /// Interpret `bytes` as a serialized public key. The length decides
    /// whether the key is compressed.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidPublicKeyLength> {
        match bytes.len() {
            COMPRESSED_PUBLIC_KEY_SIZE | PUBLIC_KEY_SIZE => Ok(PublicKey(bytes.to_vec())),
            n => Err(InvalidPublicKeyLength(n)),
        }
    }

    /// Whether this is the 33-byte compressed form.
    pub fn is_compressed(&self) -> bool {
        self.0.len() == COMPRESSED_PUBLIC_KEY_SIZE
    }

    /// The serialized key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The RIPEMD160-of-SHA256 digest of the serialized key, used as the key
    /// identifier by signing providers.
    pub fn key_id(&self) -> ScriptHash {
        ScriptHash::hash(&self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// A raw 32-byte private key. Only ever handed out through the
/// [`SigningProvider`](crate::signer::SigningProvider) seam; this crate does
/// not sign.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(pub [u8; 32]);

// Deliberately opaque so key material doesn't end up in logs.
impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(..)")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn public_key_length_gate() {
        assert!(PublicKey::from_slice(&[0x02; 33]).is_ok());
        assert!(PublicKey::from_slice(&[0x04; 65]).is_ok());
        assert_eq!(
            PublicKey::from_slice(&[0x02; 32]),
            Err(InvalidPublicKeyLength(32))
        );
        assert!(PublicKey::from_slice(&[0x02; 33]).unwrap().is_compressed());
        assert!(!PublicKey::from_slice(&[0x04; 65]).unwrap().is_compressed());
    }

    #[test]
    fn public_keys_order_by_bytes() {
        let a = PublicKey::from_slice(&[0x02; 33]).unwrap();
        let b = PublicKey::from_slice(&[0x03; 33]).unwrap();
        assert!(a < b);
    }
}
