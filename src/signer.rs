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

//! Signing providers
//!
//! The seam between this crate and whatever holds the keys. Signature
//! production happens on the other side of [`SigningProvider`]; the codec
//! only ever asks "do you know the script or key behind this hash". A
//! keystore that cannot answer returns `None`, it never fails.

use std::collections::BTreeMap;

use crate::hash_types::ScriptHash;
use crate::keys::{PrivateKey, PublicKey};
use crate::script::Script;

/// A capability handed to signing callers: script and key lookup by hash.
pub trait SigningProvider {
    /// The script behind `script_hash`, if known.
    fn get_script(&self, script_hash: &ScriptHash) -> Option<Script>;

    /// The public key behind `key_id`, if known.
    fn get_pubkey(&self, key_id: &ScriptHash) -> Option<PublicKey>;

    /// The private key behind `key_id`, if known.
    fn get_key(&self, key_id: &ScriptHash) -> Option<PrivateKey>;
}

/// An in-memory [`SigningProvider`] backed by plain maps.
#[derive(Debug, Default, Clone)]
pub struct KeyMap {
    scripts: BTreeMap<ScriptHash, Script>,
    keys: BTreeMap<ScriptHash, (PublicKey, Option<PrivateKey>)>,
}

impl KeyMap {
    /// An empty key map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a script, retrievable by its hash.
    pub fn add_script(&mut self, script: Script) -> ScriptHash {
        let hash = script.script_hash();
        self.scripts.insert(hash, script);
        hash
    }

    /// Store a key pair, retrievable by the public key's identifier. The
    /// private half is optional for watch-only entries.
    pub fn add_key(&mut self, pubkey: PublicKey, privkey: Option<PrivateKey>) -> ScriptHash {
        let key_id = pubkey.key_id();
        self.keys.insert(key_id, (pubkey, privkey));
        key_id
    }
}

impl SigningProvider for KeyMap {
    fn get_script(&self, script_hash: &ScriptHash) -> Option<Script> {
        self.scripts.get(script_hash).cloned()
    }

    fn get_pubkey(&self, key_id: &ScriptHash) -> Option<PublicKey> {
        self.keys.get(key_id).map(|(pubkey, _)| pubkey.clone())
    }

    fn get_key(&self, key_id: &ScriptHash) -> Option<PrivateKey> {
        self.keys
            .get(key_id)
            .and_then(|(_, privkey)| privkey.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keymap_lookups() {
        let mut keymap = KeyMap::new();
        let script = Script::from(vec![0x51]);
        let script_hash = keymap.add_script(script.clone());

        let pubkey = PublicKey::from_slice(&[0x02; 33]).unwrap();
        let key_id = keymap.add_key(pubkey.clone(), Some(PrivateKey([7; 32])));

        assert_eq!(keymap.get_script(&script_hash), Some(script));
        assert_eq!(keymap.get_pubkey(&key_id), Some(pubkey));
        assert!(keymap.get_key(&key_id).is_some());

        let unknown = ScriptHash::hash(b"nothing here");
        assert_eq!(keymap.get_script(&unknown), None);
        assert_eq!(keymap.get_pubkey(&unknown), None);
        assert!(keymap.get_key(&unknown).is_none());
    }
}
