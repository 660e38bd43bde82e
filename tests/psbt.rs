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

//! End-to-end exercises of the PSBT transport format through the public API.

use std::collections::BTreeMap;

use coinkit::psbt::ErrorKind;
use coinkit::{
    OutPoint, PartiallySignedTransaction, PsbtUtils, PublicKey, Script, Transaction, TxIn, TxOut,
    Txid,
};

fn unsigned_tx() -> Transaction {
    Transaction {
        version: 2,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([0x42; 32]), 0),
            ..Default::default()
        }],
        output: vec![TxOut {
            value: 25_000,
            script_pubkey: Script::from(vec![0x00, 0x14]),
        }],
        lock_time: 0,
    }
}

fn signer_psbt() -> PartiallySignedTransaction {
    let redeem_script = Script::from(vec![0x51]);
    let mut redeem_scripts = BTreeMap::new();
    redeem_scripts.insert(redeem_script.script_hash(), redeem_script);

    let tx = unsigned_tx();
    let mut psbt = PartiallySignedTransaction::from_unsigned_tx(tx);
    psbt.redeem_scripts = redeem_scripts;
    psbt.hd_keypaths.insert(
        PublicKey::from_slice(&[0x02; 33]).unwrap(),
        vec![0x8000_002C, 0x8000_0000, 0],
    );
    psbt.inputs[0].witness_utxo = Some(TxOut {
        value: 30_000,
        script_pubkey: Script::from(vec![0x00, 0x20]),
    });
    psbt
}

#[test]
fn stream_opens_with_magic_and_head_byte() {
    let bytes = signer_psbt().to_vec();
    assert_eq!(hex::encode(&bytes[..5]), "70736274ff");
}

#[test]
fn round_trip_and_hash_binding() {
    let psbt = signer_psbt();
    let decoded = PartiallySignedTransaction::deserialize(&psbt.to_vec()).unwrap();

    assert_eq!(decoded, psbt);
    for (hash, script) in &decoded.redeem_scripts {
        assert_eq!(&script.script_hash(), hash);
    }
    // and the table is keyed by HASH160(0x51) specifically
    let expected = Script::from(vec![0x51]).script_hash();
    assert!(decoded.redeem_scripts.contains_key(&expected));
}

#[test]
fn tampered_script_fails_hash_validation() {
    let mut bytes = signer_psbt().to_vec();
    let position = bytes
        .iter()
        .position(|&b| b == 0x51)
        .expect("redeem script byte present");
    bytes[position] ^= 0x01;

    let err = PartiallySignedTransaction::deserialize(&bytes).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::HashMismatch { tag: 0x01 }));
}

#[test]
fn garbage_input_fails_with_magic_error() {
    let err = PartiallySignedTransaction::deserialize(b"not a psbt stream").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidMagic);
    assert_eq!(err.offset, 0);
}

#[test]
fn two_signers_converge_through_combine() {
    let mut alice = signer_psbt();
    alice.inputs[0].partial_sigs.insert(
        PublicKey::from_slice(&[0x02; 33]).unwrap(),
        vec![0x30, 0x44, 0x02, 0x20],
    );

    let mut bob = signer_psbt();
    bob.inputs[0].partial_sigs.insert(
        PublicKey::from_slice(&[0x03; 33]).unwrap(),
        vec![0x30, 0x45, 0x02, 0x21],
    );

    // Bob's copy travels over the wire before being combined
    alice.combine_serialized(&bob.to_vec()).unwrap();
    assert_eq!(alice.inputs[0].partial_sigs.len(), 2);

    // combining is idempotent
    let again = PartiallySignedTransaction::deserialize(&alice.to_vec()).unwrap();
    let before = alice.clone();
    alice.combine(again).unwrap();
    assert_eq!(alice, before);
}

#[test]
fn combiner_surfaces_codec_errors() {
    let mut alice = signer_psbt();
    assert!(matches!(
        alice.combine_serialized(b"not a psbt stream"),
        Err(coinkit::Error::Psbt(_))
    ));
}

#[test]
fn fee_math_over_the_decoded_copy() {
    let decoded = PartiallySignedTransaction::deserialize(&signer_psbt().to_vec()).unwrap();
    assert_eq!(
        decoded.get_utxo_for(0).map(|utxo| utxo.value),
        Some(30_000)
    );
    assert_eq!(decoded.fee_amount(), Some(5_000));
    assert!(decoded.fee_rate().unwrap().as_sat_per_vb() > 0.0);
}
