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

//! Partially signed transactions
//!
//! The transport format used to pass an in-flight transaction between the
//! parties that update and sign it. The wire format is a key-typed,
//! separator-delimited record stream: a global section holding the unsigned
//! transaction and its script lookup tables, followed by one section per
//! input. Records the codec does not recognize are preserved byte for byte so
//! that tools can round-trip state they do not understand.
//!
//! Script tables are hash-bound: decoding recomputes each script's digest and
//! refuses streams where it does not match the key, so a decoded
//! [`PartiallySignedTransaction`] is guaranteed to satisfy its lookup-table
//! invariants.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::mem;

use crate::encode::{self, CompactSize, Decodable, Decoder, Encodable};
use crate::hash_types::{ScriptHash, WScriptHash};
use crate::keys::PublicKey;
use crate::script::Script;
use crate::transaction::{Transaction, TxOut};
use crate::types::FeeRate;

mod error;

pub use self::error::{Error, ErrorKind};

/// Magic word opening every stream, "psbt" (`0x74627370` as a little-endian u32).
const PSBT_MAGIC_BYTES: [u8; 4] = [0x70, 0x73, 0x62, 0x74];
/// Fixed byte following the magic word.
const PSBT_HEAD_BYTE: u8 = 0xFF;

// Type tags are context dependent: the same tag carries different record
// kinds in the global section and in a per-input section.
const TYPE_TX_OR_PREV_TX: u8 = 0x00;
const TYPE_REDEEM_SCRIPT_OR_WITNESS_UTXO: u8 = 0x01;
const TYPE_WITNESS_SCRIPT_OR_PARTIAL_SIG: u8 = 0x02;
const TYPE_KEYPATH_OR_SIGHASH: u8 = 0x03;
const TYPE_INPUT_COUNT_OR_INDEX: u8 = 0x04;

/// Section terminator, read back as a zero key length.
const PSBT_SEPARATOR: u8 = 0x00;

/// Expected key length for a redeem-script record: tag plus 20-byte hash.
const REDEEM_SCRIPT_KEY_LEN: usize = 1 + ScriptHash::LEN;
/// Expected key length for a witness-script record: tag plus 32-byte hash.
const WITNESS_SCRIPT_KEY_LEN: usize = 1 + WScriptHash::LEN;

/// The in-flight state of one transaction input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartiallySignedInput {
    /// The full transaction creating the output this input spends. Preferred
    /// over [`witness_utxo`](Self::witness_utxo) when both are present.
    pub non_witness_utxo: Option<Transaction>,
    /// Just the output this input spends, for segwit spends
    pub witness_utxo: Option<TxOut>,
    /// Signatures collected so far, keyed by the signing public key
    pub partial_sigs: BTreeMap<PublicKey, Vec<u8>>,
    /// Sighash type to sign with; zero means unset
    pub sighash_type: u32,
    /// Records with unrecognized type tags, preserved verbatim
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Position of this input in the unsigned transaction
    pub index: u64,
    /// Whether the position was carried explicitly on the wire
    pub use_in_index: bool,
}

/// A transaction with the partial state accumulated while it is being signed.
///
/// Holds the unsigned transaction, the global script lookup tables (bound to
/// their keys by hash), per-input partial state, and BIP-32 derivation paths
/// for the keys involved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartiallySignedTransaction {
    /// The transaction being signed
    pub tx: Transaction,
    /// Redeem scripts, keyed by their RIPEMD160-of-SHA256 digest
    pub redeem_scripts: BTreeMap<ScriptHash, Script>,
    /// Witness scripts, keyed by their SHA256 digest
    pub witness_scripts: BTreeMap<WScriptHash, Script>,
    /// Per-input state, one entry per transaction input
    pub inputs: Vec<PartiallySignedInput>,
    /// BIP-32 derivation path of each public key involved
    pub hd_keypaths: BTreeMap<PublicKey, Vec<u32>>,
    /// Global records with unrecognized type tags, preserved verbatim
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Number of inputs stated on the wire; zero means unstated
    pub num_ins: u64,
    /// Whether per-input sections carry explicit positional indexes
    pub use_in_index: bool,
}

impl PartiallySignedTransaction {
    /// Assemble a partially signed transaction from its parts.
    ///
    /// `inputs` must hold one entry per input of `tx`; the stated input count
    /// is taken from its length.
    pub fn new(
        tx: Transaction,
        redeem_scripts: BTreeMap<ScriptHash, Script>,
        witness_scripts: BTreeMap<WScriptHash, Script>,
        inputs: Vec<PartiallySignedInput>,
    ) -> Self {
        let num_ins = inputs.len() as u64;
        PartiallySignedTransaction {
            tx,
            redeem_scripts,
            witness_scripts,
            inputs,
            hd_keypaths: BTreeMap::new(),
            unknown: BTreeMap::new(),
            num_ins,
            use_in_index: false,
        }
    }

    /// Start from an unsigned transaction, with one blank entry per input.
    pub fn from_unsigned_tx(tx: Transaction) -> Self {
        let inputs = tx
            .input
            .iter()
            .enumerate()
            .map(|(index, _)| PartiallySignedInput {
                index: index as u64,
                ..Default::default()
            })
            .collect();
        Self::new(tx, BTreeMap::new(), BTreeMap::new(), inputs)
    }

    /// Serialize into `writer`, returning the number of bytes written.
    ///
    /// The per-input loop walks the unsigned transaction's inputs, so
    /// [`inputs`](Self::inputs) must hold one entry per transaction input.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        debug_assert_eq!(self.tx.input.len(), self.inputs.len());

        writer.write_all(&PSBT_MAGIC_BYTES)?;
        let mut written = PSBT_MAGIC_BYTES.len();
        written += PSBT_HEAD_BYTE.consensus_encode(writer)?;

        if !self.tx.is_null() {
            written += write_key(writer, TYPE_TX_OR_PREV_TX, &[])?;
            written += encode::serialize(&self.tx).consensus_encode(writer)?;
        }

        for (hash, script) in &self.redeem_scripts {
            written += write_key(writer, TYPE_REDEEM_SCRIPT_OR_WITNESS_UTXO, hash.as_byte_array())?;
            written += script.consensus_encode(writer)?;
        }
        for (hash, script) in &self.witness_scripts {
            written += write_key(writer, TYPE_WITNESS_SCRIPT_OR_PARTIAL_SIG, hash.as_byte_array())?;
            written += script.consensus_encode(writer)?;
        }

        for (pubkey, path) in &self.hd_keypaths {
            written += write_key(writer, TYPE_KEYPATH_OR_SIGHASH, pubkey.as_bytes())?;
            written += CompactSize(4 * path.len() as u64).consensus_encode(writer)?;
            for child in path {
                written += child.consensus_encode(writer)?;
            }
        }

        if self.num_ins > 0 {
            written += write_key(writer, TYPE_INPUT_COUNT_OR_INDEX, &[])?;
            written += encode::serialize(&CompactSize(self.num_ins)).consensus_encode(writer)?;
        }

        for (key, value) in &self.unknown {
            written += key.consensus_encode(writer)?;
            written += value.consensus_encode(writer)?;
        }

        written += PSBT_SEPARATOR.consensus_encode(writer)?;

        for (txin, input) in self.tx.input.iter().zip(&self.inputs) {
            // Once an input is signed its partial state is dead weight; only
            // unknown records still travel with it.
            if txin.script_sig.is_empty() && txin.witness.is_empty() {
                if let Some(prev_tx) = &input.non_witness_utxo {
                    written += write_key(writer, TYPE_TX_OR_PREV_TX, &[])?;
                    written += encode::serialize(prev_tx).consensus_encode(writer)?;
                } else if let Some(utxo) = &input.witness_utxo {
                    written += write_key(writer, TYPE_REDEEM_SCRIPT_OR_WITNESS_UTXO, &[])?;
                    written += encode::serialize(utxo).consensus_encode(writer)?;
                }

                for (pubkey, sig) in &input.partial_sigs {
                    written +=
                        write_key(writer, TYPE_WITNESS_SCRIPT_OR_PARTIAL_SIG, pubkey.as_bytes())?;
                    written += sig.consensus_encode(writer)?;
                }

                if input.sighash_type > 0 {
                    written += write_key(writer, TYPE_KEYPATH_OR_SIGHASH, &[])?;
                    written += CompactSize(4).consensus_encode(writer)?;
                    written += input.sighash_type.consensus_encode(writer)?;
                }

                if self.use_in_index {
                    written += write_key(writer, TYPE_INPUT_COUNT_OR_INDEX, &[])?;
                    written += encode::serialize(&CompactSize(input.index)).consensus_encode(writer)?;
                }
            }

            for (key, value) in &input.unknown {
                written += key.consensus_encode(writer)?;
                written += value.consensus_encode(writer)?;
            }

            written += PSBT_SEPARATOR.consensus_encode(writer)?;
        }

        Ok(written)
    }

    /// Serialize into a fresh byte vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize(&mut out)
            .expect("writing to a Vec cannot fail");
        out
    }

    /// Decode a partially signed transaction, validating its hash bindings.
    ///
    /// All hash-bound invariants hold on the returned value: every redeem
    /// script hashes to its key, every witness script hashes to its key, and
    /// every provided previous transaction hashes to its input's prevout.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut decoder = Decoder::new(bytes);

        let magic = decoder.read_bytes(PSBT_MAGIC_BYTES.len())?;
        if magic != &PSBT_MAGIC_BYTES[..] {
            return Err(Error::new(ErrorKind::InvalidMagic, 0));
        }
        let head_offset = decoder.position();
        if decoder.read_u8()? != PSBT_HEAD_BYTE {
            return Err(Error::new(ErrorKind::InvalidMagic, head_offset));
        }

        let mut psbt = PartiallySignedTransaction::default();
        let mut input = PartiallySignedInput::default();
        let mut in_globals = true;
        // Completed per-input sections; also the default positional index of
        // the section currently accumulating.
        let mut sections: u64 = 0;

        while !decoder.is_empty() {
            let key_offset = decoder.position();
            let key_len = decoder.read_compact_size()?;

            // A zero key length is the section separator: it ends the global
            // section first, and then each per-input section in turn.
            if key_len == 0 {
                if in_globals {
                    in_globals = false;
                } else {
                    if psbt.use_in_index && !input.use_in_index {
                        return Err(Error::new(ErrorKind::IndexPolicyViolation, key_offset));
                    }
                    psbt.inputs.push(mem::take(&mut input));
                    sections += 1;
                    input.index = sections;
                }
                continue;
            }

            if key_len > decoder.remaining() as u64 {
                return Err(Error::new(
                    ErrorKind::UnexpectedEof,
                    key_offset + decoder.remaining(),
                ));
            }
            let key = decoder.read_bytes(key_len as usize)?.to_vec();
            let type_tag = key[0];

            let value_len = decoder.read_compact_size()?;
            if value_len > decoder.remaining() as u64 {
                return Err(Error::new(
                    ErrorKind::UnexpectedEof,
                    decoder.position() + decoder.remaining(),
                ));
            }
            let value_len = value_len as usize;
            let value_offset = decoder.position();

            match (type_tag, in_globals) {
                (TYPE_TX_OR_PREV_TX, true) => {
                    psbt.tx = decode_embedded(&mut decoder, value_len)?;
                }
                (TYPE_TX_OR_PREV_TX, false) => {
                    let prev_tx: Transaction = decode_embedded(&mut decoder, value_len)?;
                    let prevout = psbt
                        .tx
                        .input
                        .get(input.index as usize)
                        .map(|txin| txin.previous_output)
                        .ok_or_else(|| Error::new(ErrorKind::UtxoMismatch, value_offset))?;
                    if prev_tx.txid() != prevout.txid {
                        return Err(Error::new(ErrorKind::UtxoMismatch, value_offset));
                    }
                    input.non_witness_utxo = Some(prev_tx);
                }
                (TYPE_REDEEM_SCRIPT_OR_WITNESS_UTXO, true) => {
                    if key.len() != REDEEM_SCRIPT_KEY_LEN {
                        return Err(bad_key_length(type_tag, key.len(), key_offset));
                    }
                    let hash = ScriptHash::from_slice(&key[1..]).expect("key length checked");
                    let script = Script::from(decoder.read_bytes(value_len)?);
                    if script.script_hash() != hash {
                        return Err(Error::new(
                            ErrorKind::HashMismatch { tag: type_tag },
                            value_offset,
                        ));
                    }
                    psbt.redeem_scripts.entry(hash).or_insert(script);
                }
                (TYPE_REDEEM_SCRIPT_OR_WITNESS_UTXO, false) => {
                    input.witness_utxo = Some(decode_embedded(&mut decoder, value_len)?);
                }
                (TYPE_WITNESS_SCRIPT_OR_PARTIAL_SIG, true) => {
                    if key.len() != WITNESS_SCRIPT_KEY_LEN {
                        return Err(bad_key_length(type_tag, key.len(), key_offset));
                    }
                    let hash = WScriptHash::from_slice(&key[1..]).expect("key length checked");
                    let script = Script::from(decoder.read_bytes(value_len)?);
                    if script.wscript_hash() != hash {
                        return Err(Error::new(
                            ErrorKind::HashMismatch { tag: type_tag },
                            value_offset,
                        ));
                    }
                    psbt.witness_scripts.entry(hash).or_insert(script);
                }
                (TYPE_WITNESS_SCRIPT_OR_PARTIAL_SIG, false) => {
                    let pubkey = pubkey_from_key(type_tag, &key, key_offset)?;
                    let sig = decoder.read_bytes(value_len)?.to_vec();
                    input.partial_sigs.entry(pubkey).or_insert(sig);
                }
                (TYPE_KEYPATH_OR_SIGHASH, true) => {
                    let pubkey = pubkey_from_key(type_tag, &key, key_offset)?;
                    let mut value = decoder.take(value_len)?;
                    let mut path = Vec::with_capacity(value_len / 4);
                    while !value.is_empty() {
                        path.push(value.read_u32()?);
                    }
                    psbt.hd_keypaths.entry(pubkey).or_insert(path);
                }
                (TYPE_KEYPATH_OR_SIGHASH, false) => {
                    let mut value = decoder.take(value_len)?;
                    input.sighash_type = value.read_u32()?;
                }
                (TYPE_INPUT_COUNT_OR_INDEX, true) => {
                    let mut value = decoder.take(value_len)?;
                    psbt.num_ins = value.read_compact_size()?;
                }
                (TYPE_INPUT_COUNT_OR_INDEX, false) => {
                    // An explicit index is only acceptable on the first input
                    // or once indexes are already in use.
                    if !psbt.use_in_index && sections != 0 {
                        return Err(Error::new(ErrorKind::IndexPolicyViolation, key_offset));
                    }
                    let mut value = decoder.take(value_len)?;
                    input.index = value.read_compact_size()?;
                    psbt.use_in_index = true;
                    input.use_in_index = true;
                }
                (_, true) => {
                    let value = decoder.read_bytes(value_len)?.to_vec();
                    psbt.unknown.entry(key).or_insert(value);
                }
                (_, false) => {
                    let value = decoder.read_bytes(value_len)?.to_vec();
                    input.unknown.entry(key).or_insert(value);
                }
            }
        }

        if psbt.num_ins > 0 && sections != psbt.num_ins {
            return Err(Error::new(
                ErrorKind::UnexpectedInputCount {
                    stated: psbt.num_ins,
                    parsed: sections,
                },
                decoder.position(),
            ));
        }

        Ok(psbt)
    }

    /// Merge another copy of the same in-flight transaction into this one.
    ///
    /// Both copies must carry the same unsigned transaction. Existing entries
    /// win over incoming ones, so repeated combining is idempotent.
    pub fn combine(&mut self, other: Self) -> Result<(), crate::error::Error> {
        if self.tx != other.tx {
            return Err(crate::error::Error::DifferentTransactions);
        }

        merge_maps(&mut self.redeem_scripts, other.redeem_scripts);
        merge_maps(&mut self.witness_scripts, other.witness_scripts);
        merge_maps(&mut self.hd_keypaths, other.hd_keypaths);
        merge_maps(&mut self.unknown, other.unknown);

        for (ours, theirs) in self.inputs.iter_mut().zip(other.inputs) {
            if ours.non_witness_utxo.is_none() {
                ours.non_witness_utxo = theirs.non_witness_utxo;
            }
            if ours.witness_utxo.is_none() {
                ours.witness_utxo = theirs.witness_utxo;
            }
            if ours.sighash_type == 0 {
                ours.sighash_type = theirs.sighash_type;
            }
            merge_maps(&mut ours.partial_sigs, theirs.partial_sigs);
            merge_maps(&mut ours.unknown, theirs.unknown);
        }

        Ok(())
    }

    /// Decode another signer's serialized copy and merge it into this one.
    ///
    /// The combiner loop folds updated copies in as they arrive off the
    /// wire: [`deserialize`](Self::deserialize) followed by
    /// [`combine`](Self::combine), with either failure surfaced through the
    /// crate-level error.
    pub fn combine_serialized(&mut self, bytes: &[u8]) -> Result<(), crate::error::Error> {
        let other = Self::deserialize(bytes)?;
        self.combine(other)
    }
}

/// Extra accessors on [`PartiallySignedTransaction`] for fee inspection.
pub trait PsbtUtils {
    /// Get the `TxOut` for the specified input index, if it doesn't exist in the PSBT `None` is returned.
    fn get_utxo_for(&self, input_index: usize) -> Option<TxOut>;

    /// The total transaction fee amount, sum of input amounts minus sum of output amounts, in sats.
    /// If the PSBT is missing a TxOut for an input returns None.
    fn fee_amount(&self) -> Option<u64>;

    /// The transaction's fee rate. This value will only be accurate if calculated AFTER all
    /// witness/signature data is added to the transaction.
    /// If the PSBT is missing a TxOut for an input returns None.
    fn fee_rate(&self) -> Option<FeeRate>;
}

impl PsbtUtils for PartiallySignedTransaction {
    fn get_utxo_for(&self, input_index: usize) -> Option<TxOut> {
        let txin = self.tx.input.get(input_index)?;
        let input = self.inputs.get(input_index)?;

        if let Some(utxo) = &input.witness_utxo {
            Some(utxo.clone())
        } else if let Some(prev_tx) = &input.non_witness_utxo {
            prev_tx
                .output
                .get(txin.previous_output.vout as usize)
                .cloned()
        } else {
            None
        }
    }

    fn fee_amount(&self) -> Option<u64> {
        let utxos: Option<Vec<TxOut>> = (0..self.tx.input.len())
            .map(|i| self.get_utxo_for(i))
            .collect();

        utxos.map(|inputs| {
            let input_amount: i64 = inputs.iter().map(|i| i.value).sum();
            let output_amount: i64 = self.tx.output.iter().map(|o| o.value).sum();
            input_amount
                .checked_sub(output_amount)
                .filter(|fee| *fee >= 0)
                .expect("input amount must be greater than output amount") as u64
        })
    }

    fn fee_rate(&self) -> Option<FeeRate> {
        let fee_amount = self.fee_amount();
        fee_amount.map(|fee| FeeRate::from_wu(fee, self.tx.weight()))
    }
}

// A typed key: compact-size length covering the tag byte and the key data,
// then the tag, then the data.
fn write_key<W: Write>(writer: &mut W, type_tag: u8, key_data: &[u8]) -> io::Result<usize> {
    let mut written = CompactSize(1 + key_data.len() as u64).consensus_encode(writer)?;
    written += type_tag.consensus_encode(writer)?;
    writer.write_all(key_data)?;
    Ok(written + key_data.len())
}

fn bad_key_length(tag: u8, len: usize, offset: usize) -> Error {
    Error::new(ErrorKind::BadKeyLength { tag, len }, offset)
}

// Keys whose suffix is a public key must be a tag byte plus 33 or 65 bytes.
fn pubkey_from_key(tag: u8, key: &[u8], key_offset: usize) -> Result<PublicKey, Error> {
    PublicKey::from_slice(&key[1..]).map_err(|_| bad_key_length(tag, key.len(), key_offset))
}

// Decode a value that must fill its record exactly; a payload that stops
// short or fails to parse cannot be trusted.
fn decode_embedded<T: Decodable>(decoder: &mut Decoder, value_len: usize) -> Result<T, Error> {
    let mut value = decoder.take(value_len)?;
    let decoded = T::consensus_decode(&mut value).map_err(|err| match err {
        encode::Error::NonCanonicalCompactSize { offset } => {
            Error::new(ErrorKind::NonCanonicalCompactSize, offset)
        }
        other => Error::new(ErrorKind::MalformedEmbeddedTransaction, other.offset()),
    })?;
    if !value.is_empty() {
        return Err(Error::new(
            ErrorKind::MalformedEmbeddedTransaction,
            value.position(),
        ));
    }
    Ok(decoded)
}

fn merge_maps<K: Ord, V>(ours: &mut BTreeMap<K, V>, theirs: BTreeMap<K, V>) {
    for (key, value) in theirs {
        ours.entry(key).or_insert(value);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hash_types::Txid;
    use crate::transaction::{OutPoint, TxIn};

    fn unsigned_tx(num_inputs: usize) -> Transaction {
        Transaction {
            version: 2,
            input: (0..num_inputs)
                .map(|i| TxIn {
                    previous_output: OutPoint::new(Txid::from_byte_array([i as u8 + 1; 32]), 0),
                    ..Default::default()
                })
                .collect(),
            output: vec![TxOut {
                value: 40_000,
                script_pubkey: Script::from(vec![0x00, 0x14]),
            }],
            lock_time: 0,
        }
    }

    fn test_pubkey(fill: u8) -> PublicKey {
        let mut bytes = vec![0x02];
        bytes.extend(std::iter::repeat(fill).take(32));
        PublicKey::from_slice(&bytes).unwrap()
    }

    fn rich_psbt() -> PartiallySignedTransaction {
        let mut psbt = PartiallySignedTransaction::from_unsigned_tx(unsigned_tx(1));

        let redeem_script = Script::from(vec![0x51]);
        psbt.redeem_scripts
            .insert(redeem_script.script_hash(), redeem_script);
        let witness_script = Script::from(vec![0x52, 0x53]);
        psbt.witness_scripts
            .insert(witness_script.wscript_hash(), witness_script);

        psbt.hd_keypaths
            .insert(test_pubkey(0xAA), vec![0x8000_002C, 0, 7]);
        psbt.unknown.insert(vec![0x99, 0x01], vec![0xDE, 0xAD]);

        psbt.inputs[0].partial_sigs.insert(test_pubkey(0xBB), vec![0x30, 0x45, 0x02]);
        psbt.inputs[0].sighash_type = 1;
        psbt.inputs[0].witness_utxo = Some(TxOut {
            value: 50_000,
            script_pubkey: Script::from(vec![0x00, 0x20]),
        });
        psbt.inputs[0].unknown.insert(vec![0x88], vec![0x01]);
        psbt
    }

    #[test]
    fn round_trip_preserves_everything() {
        let psbt = rich_psbt();
        let decoded = PartiallySignedTransaction::deserialize(&psbt.to_vec()).unwrap();
        assert_eq!(decoded, psbt);
    }

    #[test]
    fn round_trip_with_non_witness_utxo() {
        let prev_tx = Transaction {
            version: 1,
            input: vec![TxIn::default()],
            output: vec![TxOut {
                value: 90_000,
                script_pubkey: Script::from(vec![0x76, 0xA9]),
            }],
            lock_time: 0,
        };
        let mut tx = unsigned_tx(1);
        tx.input[0].previous_output = OutPoint::new(prev_tx.txid(), 0);

        let mut psbt = PartiallySignedTransaction::from_unsigned_tx(tx);
        psbt.inputs[0].non_witness_utxo = Some(prev_tx);

        let decoded = PartiallySignedTransaction::deserialize(&psbt.to_vec()).unwrap();
        assert_eq!(decoded, psbt);
    }

    #[test]
    fn tampered_redeem_script_is_rejected() {
        let psbt = rich_psbt();
        let mut bytes = psbt.to_vec();

        // The redeem script record's value is the single byte 0x51; flip it.
        let script_pos = bytes
            .iter()
            .position(|&b| b == 0x51)
            .expect("redeem script byte present");
        bytes[script_pos] = 0x00;

        let err = PartiallySignedTransaction::deserialize(&bytes).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::HashMismatch {
                tag: TYPE_REDEEM_SCRIPT_OR_WITNESS_UTXO
            }
        );
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut bytes = rich_psbt().to_vec();
        bytes[0] = b'q';
        let err = PartiallySignedTransaction::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidMagic);
        assert_eq!(err.offset, 0);

        let mut bytes = rich_psbt().to_vec();
        bytes[4] = 0xFE;
        let err = PartiallySignedTransaction::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidMagic);
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn truncation_reports_eof_with_offset() {
        let bytes = rich_psbt().to_vec();
        let cut = bytes.len() - 3;
        let err = PartiallySignedTransaction::deserialize(&bytes[..cut]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedEof);
        assert!(err.offset <= cut);
    }

    #[test]
    fn bad_redeem_script_key_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PSBT_MAGIC_BYTES);
        bytes.push(PSBT_HEAD_BYTE);
        // redeem script record with a 3-byte key instead of 21
        bytes.extend_from_slice(&[0x03, 0x01, 0xAB, 0xCD, 0x01, 0x51]);
        bytes.push(PSBT_SEPARATOR);
        bytes.push(PSBT_SEPARATOR);

        let err = PartiallySignedTransaction::deserialize(&bytes).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::BadKeyLength {
                tag: TYPE_REDEEM_SCRIPT_OR_WITNESS_UTXO,
                len: 3
            }
        );
    }

    #[test]
    fn wrong_prev_tx_is_rejected() {
        let prev_tx = Transaction {
            version: 1,
            input: vec![TxIn::default()],
            output: vec![TxOut {
                value: 90_000,
                script_pubkey: Script::new(),
            }],
            lock_time: 0,
        };
        // The unsigned tx's input prevout does not point at prev_tx
        let mut psbt = PartiallySignedTransaction::from_unsigned_tx(unsigned_tx(1));
        psbt.inputs[0].non_witness_utxo = Some(prev_tx);

        let err = PartiallySignedTransaction::deserialize(&psbt.to_vec()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UtxoMismatch);
    }

    #[test]
    fn stated_input_count_must_match() {
        let mut psbt = PartiallySignedTransaction::from_unsigned_tx(unsigned_tx(2));
        psbt.num_ins = 3;
        let err = PartiallySignedTransaction::deserialize(&psbt.to_vec()).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UnexpectedInputCount {
                stated: 3,
                parsed: 2
            }
        );
    }

    #[test]
    fn explicit_indexes_round_trip() {
        let mut psbt = PartiallySignedTransaction::from_unsigned_tx(unsigned_tx(2));
        psbt.use_in_index = true;
        for input in &mut psbt.inputs {
            input.use_in_index = true;
        }
        let decoded = PartiallySignedTransaction::deserialize(&psbt.to_vec()).unwrap();
        assert_eq!(decoded, psbt);
        assert!(decoded.use_in_index);
        assert_eq!(decoded.inputs[1].index, 1);
    }

    #[test]
    fn default_indexes_follow_section_order() {
        let psbt = PartiallySignedTransaction::from_unsigned_tx(unsigned_tx(3));
        let decoded = PartiallySignedTransaction::deserialize(&psbt.to_vec()).unwrap();
        let indexes: Vec<u64> = decoded.inputs.iter().map(|i| i.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn unindexed_input_after_indexed_is_rejected() {
        // Hand-build: globals, then input 0 with an index record, then a bare
        // input 1 without one.
        let tx = unsigned_tx(2);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PSBT_MAGIC_BYTES);
        bytes.push(PSBT_HEAD_BYTE);
        bytes.extend_from_slice(&[0x01, TYPE_TX_OR_PREV_TX]);
        let tx_bytes = encode::serialize(&tx);
        bytes.push(tx_bytes.len() as u8);
        bytes.extend_from_slice(&tx_bytes);
        bytes.push(PSBT_SEPARATOR);
        // input 0: explicit index 0
        bytes.extend_from_slice(&[0x01, TYPE_INPUT_COUNT_OR_INDEX, 0x01, 0x00]);
        bytes.push(PSBT_SEPARATOR);
        // input 1: no records at all
        bytes.push(PSBT_SEPARATOR);

        let err = PartiallySignedTransaction::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexPolicyViolation);
    }

    #[test]
    fn indexed_input_after_unindexed_is_rejected() {
        let tx = unsigned_tx(2);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PSBT_MAGIC_BYTES);
        bytes.push(PSBT_HEAD_BYTE);
        bytes.extend_from_slice(&[0x01, TYPE_TX_OR_PREV_TX]);
        let tx_bytes = encode::serialize(&tx);
        bytes.push(tx_bytes.len() as u8);
        bytes.extend_from_slice(&tx_bytes);
        bytes.push(PSBT_SEPARATOR);
        // input 0: no records
        bytes.push(PSBT_SEPARATOR);
        // input 1: explicit index 1
        bytes.extend_from_slice(&[0x01, TYPE_INPUT_COUNT_OR_INDEX, 0x01, 0x01]);
        bytes.push(PSBT_SEPARATOR);

        let err = PartiallySignedTransaction::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexPolicyViolation);
    }

    #[test]
    fn unknown_records_are_repeated_faithfully() {
        let mut psbt = PartiallySignedTransaction::from_unsigned_tx(unsigned_tx(1));
        psbt.unknown.insert(vec![0xF0, 0x01, 0x02], vec![0x00; 40]);
        psbt.inputs[0].unknown.insert(vec![0xF1], Vec::new());

        let bytes = psbt.to_vec();
        let decoded = PartiallySignedTransaction::deserialize(&bytes).unwrap();
        assert_eq!(decoded.unknown, psbt.unknown);
        assert_eq!(decoded.inputs[0].unknown, psbt.inputs[0].unknown);
        // and the bytes themselves are stable
        assert_eq!(decoded.to_vec(), bytes);
    }

    #[test]
    fn signed_inputs_carry_no_partial_state() {
        let mut tx = unsigned_tx(1);
        tx.input[0].script_sig = Script::from(vec![0x00, 0x01]);
        let mut psbt = PartiallySignedTransaction::from_unsigned_tx(tx);
        psbt.inputs[0].sighash_type = 1;
        psbt.inputs[0]
            .partial_sigs
            .insert(test_pubkey(0xCC), vec![0x30]);

        let decoded = PartiallySignedTransaction::deserialize(&psbt.to_vec()).unwrap();
        assert!(decoded.inputs[0].partial_sigs.is_empty());
        assert_eq!(decoded.inputs[0].sighash_type, 0);
    }

    #[test]
    fn combine_merges_partial_sigs() {
        let mut alice = rich_psbt();
        let mut bob = rich_psbt();
        bob.inputs[0]
            .partial_sigs
            .insert(test_pubkey(0xCC), vec![0x30, 0x44]);
        bob.hd_keypaths.insert(test_pubkey(0xDD), vec![1]);

        alice.combine(bob).unwrap();
        assert_eq!(alice.inputs[0].partial_sigs.len(), 2);
        assert_eq!(alice.hd_keypaths.len(), 2);
    }

    #[test]
    fn combine_serialized_folds_in_a_wire_copy() {
        let mut alice = rich_psbt();
        let mut bob = rich_psbt();
        bob.inputs[0]
            .partial_sigs
            .insert(test_pubkey(0xEE), vec![0x30, 0x43]);

        alice.combine_serialized(&bob.to_vec()).unwrap();
        assert_eq!(alice.inputs[0].partial_sigs.len(), 2);

        assert!(matches!(
            alice.combine_serialized(b"garbage"),
            Err(crate::error::Error::Psbt(Error {
                kind: ErrorKind::InvalidMagic,
                ..
            }))
        ));
    }

    #[test]
    fn combine_rejects_different_transactions() {
        let mut alice = rich_psbt();
        let bob = PartiallySignedTransaction::from_unsigned_tx(unsigned_tx(2));
        assert!(matches!(
            alice.combine(bob),
            Err(crate::error::Error::DifferentTransactions)
        ));
    }

    #[test]
    fn fee_accessors() {
        let psbt = rich_psbt();
        assert_eq!(
            psbt.get_utxo_for(0),
            Some(TxOut {
                value: 50_000,
                script_pubkey: Script::from(vec![0x00, 0x20]),
            })
        );
        assert_eq!(psbt.fee_amount(), Some(10_000));
        assert!(psbt.fee_rate().unwrap().as_sat_per_vb() > 0.0);

        let blank = PartiallySignedTransaction::from_unsigned_tx(unsigned_tx(1));
        assert_eq!(blank.fee_amount(), None);
        assert_eq!(blank.fee_rate(), None);
    }

    #[test]
    fn non_canonical_record_length_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PSBT_MAGIC_BYTES);
        bytes.push(PSBT_HEAD_BYTE);
        // key length 1 encoded in three bytes
        bytes.extend_from_slice(&[0xFD, 0x01, 0x00]);
        let err = PartiallySignedTransaction::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NonCanonicalCompactSize);
        assert_eq!(err.offset, 5);
    }
}
