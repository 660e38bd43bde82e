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

//! Transaction primitives
//!
//! The transaction, input, output and outpoint types together with their
//! consensus encoding, including the marker/flag witness form. Witness data
//! is carried as a stack of byte vectors per input.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::encode::{self, CompactSize, Decodable, Decoder, Encodable};
use crate::hash_types::Txid;
use crate::script::Script;

/// The sequence value that opts an input out of replacement and lock times.
pub const MAX_SEQUENCE: u32 = 0xFFFF_FFFF;

/// A reference to a particular output of a particular transaction.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct OutPoint {
    /// The id of the transaction holding the output
    pub txid: Txid,
    /// The index of the output in that transaction
    pub vout: u32,
}

impl OutPoint {
    /// Create a new outpoint.
    pub fn new(txid: Txid, vout: u32) -> Self {
        OutPoint { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// An error parsing an outpoint from its `txid:vout` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutPointError {
    /// The string is not `txid:vout`
    Format,
    /// The txid part is not valid hex
    Txid(bitcoin_hashes::hex::Error),
    /// The vout part is not a decimal u32
    Vout(std::num::ParseIntError),
}

impl fmt::Display for ParseOutPointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseOutPointError::Format => write!(f, "expected `txid:vout`"),
            ParseOutPointError::Txid(e) => write!(f, "invalid txid: {}", e),
            ParseOutPointError::Vout(e) => write!(f, "invalid vout: {}", e),
        }
    }
}

impl std::error::Error for ParseOutPointError {}

impl FromStr for OutPoint {
    type Err = ParseOutPointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ':');
        let txid = parts.next().ok_or(ParseOutPointError::Format)?;
        let vout = parts.next().ok_or(ParseOutPointError::Format)?;
        Ok(OutPoint {
            txid: Txid::from_str(txid).map_err(ParseOutPointError::Txid)?,
            vout: u32::from_str(vout).map_err(ParseOutPointError::Vout)?,
        })
    }
}

/// A transaction output: an amount locked behind a script condition.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxOut {
    /// Value in the smallest monetary unit
    pub value: i64,
    /// The script condition guarding the value
    pub script_pubkey: Script,
}

/// A transaction input spending a previous output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxIn {
    /// The output being spent
    pub previous_output: OutPoint,
    /// The script satisfying the spent output's condition
    pub script_sig: Script,
    /// Relative-locktime / replacement sequence number
    pub sequence: u32,
    /// Witness stack, one byte vector per stack element
    pub witness: Vec<Vec<u8>>,
}

impl Default for TxIn {
    fn default() -> Self {
        TxIn {
            previous_output: OutPoint::default(),
            script_sig: Script::new(),
            sequence: MAX_SEQUENCE,
            witness: Vec::new(),
        }
    }
}

/// A transaction: a list of inputs consumed and outputs created.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Transaction {
    /// Format version
    pub version: i32,
    /// Inputs being spent
    pub input: Vec<TxIn>,
    /// Outputs being created
    pub output: Vec<TxOut>,
    /// Earliest block height or time at which the transaction is final
    pub lock_time: u32,
}

impl Transaction {
    /// Whether the transaction has neither inputs nor outputs.
    pub fn is_null(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }

    /// Whether any input carries witness data.
    pub fn has_witness(&self) -> bool {
        self.input.iter().any(|txin| !txin.witness.is_empty())
    }

    /// The transaction id: double SHA256 over the legacy (witness-stripped)
    /// serialization.
    pub fn txid(&self) -> Txid {
        let mut buf = Vec::new();
        self.encode_legacy(&mut buf)
            .expect("writing to a Vec cannot fail");
        Txid::hash(&buf)
    }

    /// Size of the witness-stripped serialization, in bytes.
    pub fn base_size(&self) -> usize {
        let mut buf = Vec::new();
        self.encode_legacy(&mut buf)
            .expect("writing to a Vec cannot fail");
        buf.len()
    }

    /// Size of the full serialization, in bytes.
    pub fn total_size(&self) -> usize {
        encode::serialize(self).len()
    }

    /// Weight units: three times the base size plus the total size.
    pub fn weight(&self) -> usize {
        self.base_size() * 3 + self.total_size()
    }

    /// Virtual size: weight divided by four, rounded up.
    pub fn vsize(&self) -> usize {
        (self.weight() + 3) / 4
    }

    // Legacy form: no marker, no flag, no witness section.
    fn encode_legacy<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut written = self.version.consensus_encode(writer)?;
        written += self.input.consensus_encode(writer)?;
        written += self.output.consensus_encode(writer)?;
        written += self.lock_time.consensus_encode(writer)?;
        Ok(written)
    }
}

impl Encodable for OutPoint {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        writer.write_all(self.txid.as_byte_array())?;
        self.vout.consensus_encode(writer)?;
        Ok(36)
    }
}

impl Decodable for OutPoint {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, encode::Error> {
        let mut txid = [0u8; 32];
        txid.copy_from_slice(decoder.read_bytes(32)?);
        Ok(OutPoint {
            txid: Txid::from_byte_array(txid),
            vout: decoder.read_u32()?,
        })
    }
}

impl Encodable for TxOut {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut written = self.value.consensus_encode(writer)?;
        written += self.script_pubkey.consensus_encode(writer)?;
        Ok(written)
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, encode::Error> {
        Ok(TxOut {
            value: decoder.read_i64()?,
            script_pubkey: Script::consensus_decode(decoder)?,
        })
    }
}

impl Encodable for TxIn {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut written = self.previous_output.consensus_encode(writer)?;
        written += self.script_sig.consensus_encode(writer)?;
        written += self.sequence.consensus_encode(writer)?;
        Ok(written)
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, encode::Error> {
        Ok(TxIn {
            previous_output: OutPoint::consensus_decode(decoder)?,
            script_sig: Script::consensus_decode(decoder)?,
            sequence: decoder.read_u32()?,
            witness: Vec::new(),
        })
    }
}

macro_rules! impl_vec_codec {
    ($type:ty) => {
        impl Encodable for Vec<$type> {
            fn consensus_encode<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
                let mut written = CompactSize(self.len() as u64).consensus_encode(writer)?;
                for item in self {
                    written += item.consensus_encode(writer)?;
                }
                Ok(written)
            }
        }

        impl Decodable for Vec<$type> {
            fn consensus_decode(decoder: &mut Decoder) -> Result<Self, encode::Error> {
                let count = decoder.read_compact_size()?;
                // Every element takes at least one byte, so a count beyond the
                // remaining input can only be a lie.
                if count > decoder.remaining() as u64 {
                    return Err(encode::Error::UnexpectedEof {
                        offset: decoder.position() + decoder.remaining(),
                    });
                }
                let mut out = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    out.push(<$type>::consensus_decode(decoder)?);
                }
                Ok(out)
            }
        }
    };
}

impl_vec_codec!(TxIn);
impl_vec_codec!(TxOut);
impl_vec_codec!(Vec<u8>);

impl Encodable for Transaction {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> io::Result<usize> {
        if !self.has_witness() {
            return self.encode_legacy(writer);
        }

        let mut written = self.version.consensus_encode(writer)?;
        // BIP-144 marker and flag
        written += 0u8.consensus_encode(writer)?;
        written += 1u8.consensus_encode(writer)?;
        written += self.input.consensus_encode(writer)?;
        written += self.output.consensus_encode(writer)?;
        for txin in &self.input {
            written += txin.witness.consensus_encode(writer)?;
        }
        written += self.lock_time.consensus_encode(writer)?;
        Ok(written)
    }
}

impl Decodable for Transaction {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, encode::Error> {
        let version = decoder.read_i32()?;
        let input = Vec::<TxIn>::consensus_decode(decoder)?;

        // An empty input list here is the segwit marker: the actual input
        // list follows the flag byte.
        if input.is_empty() {
            let flag_offset = decoder.position();
            let flag = decoder.read_u8()?;
            if flag != 1 {
                return Err(encode::Error::UnsupportedSegwitFlag {
                    flag,
                    offset: flag_offset,
                });
            }
            let mut input = Vec::<TxIn>::consensus_decode(decoder)?;
            let output = Vec::<TxOut>::consensus_decode(decoder)?;
            for txin in input.iter_mut() {
                txin.witness = Vec::<Vec<u8>>::consensus_decode(decoder)?;
            }
            Ok(Transaction {
                version,
                input,
                output,
                lock_time: decoder.read_u32()?,
            })
        } else {
            Ok(Transaction {
                version,
                input,
                output: Vec::<TxOut>::consensus_decode(decoder)?,
                lock_time: decoder.read_u32()?,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode::{deserialize, serialize};

    fn dummy_outpoint(fill: u8, vout: u32) -> OutPoint {
        OutPoint::new(Txid::from_byte_array([fill; 32]), vout)
    }

    fn legacy_tx() -> Transaction {
        Transaction {
            version: 2,
            input: vec![TxIn {
                previous_output: dummy_outpoint(0x11, 1),
                script_sig: Script::from(vec![0x51]),
                sequence: MAX_SEQUENCE,
                witness: Vec::new(),
            }],
            output: vec![TxOut {
                value: 50_000,
                script_pubkey: Script::from(vec![0x00, 0x14]),
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn legacy_round_trip() {
        let tx = legacy_tx();
        let bytes = serialize(&tx);
        let decoded: Transaction = deserialize(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(tx.base_size(), tx.total_size());
        assert_eq!(tx.weight(), tx.total_size() * 4);
    }

    #[test]
    fn segwit_round_trip() {
        let mut tx = legacy_tx();
        tx.input[0].script_sig = Script::new();
        tx.input[0].witness = vec![vec![0x01, 0x02], vec![0x03]];
        let bytes = serialize(&tx);
        // marker and flag directly after the version
        assert_eq!(&bytes[4..6], &[0x00, 0x01]);
        let decoded: Transaction = deserialize(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert!(tx.base_size() < tx.total_size());
    }

    #[test]
    fn txid_ignores_witness() {
        let mut tx = legacy_tx();
        let txid = tx.txid();
        tx.input[0].witness = vec![vec![0xFF; 72]];
        assert_eq!(tx.txid(), txid);
    }

    #[test]
    fn unknown_segwit_flag_rejected() {
        let mut tx = legacy_tx();
        tx.input[0].witness = vec![vec![0x01]];
        let mut bytes = serialize(&tx);
        bytes[5] = 0x02;
        assert_eq!(
            deserialize::<Transaction>(&bytes),
            Err(encode::Error::UnsupportedSegwitFlag {
                flag: 0x02,
                offset: 5
            })
        );
    }

    #[test]
    fn outpoint_parses_from_string() {
        let outpoint = OutPoint::from_str(
            "ebd9813ecebc57ff8f30797de7c205e3c7498ca950ea4341ee51a685ff2fa30a:0",
        )
        .unwrap();
        assert_eq!(outpoint.vout, 0);
        assert_eq!(
            outpoint.to_string(),
            "ebd9813ecebc57ff8f30797de7c205e3c7498ca950ea4341ee51a685ff2fa30a:0"
        );
        assert_eq!(
            OutPoint::from_str("ebd9813e"),
            Err(ParseOutPointError::Format)
        );
    }
}
