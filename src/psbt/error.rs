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

use std::fmt;

use crate::encode;

/// What went wrong while decoding a partially signed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The stream does not start with the magic word and head byte
    InvalidMagic,
    /// A compact size was not encoded in its shortest form
    NonCanonicalCompactSize,
    /// The stream ended in the middle of a record
    UnexpectedEof,
    /// A typed key does not have the length its type requires
    BadKeyLength {
        /// The type tag of the offending record
        tag: u8,
        /// The key length found
        len: usize,
    },
    /// The hash carried in a script record's key does not match the hash of
    /// the script in its value
    HashMismatch {
        /// The type tag of the offending record
        tag: u8,
    },
    /// A previous transaction supplied for an input does not hash to that
    /// input's prevout
    UtxoMismatch,
    /// Indexed and unindexed inputs were mixed in one stream
    IndexPolicyViolation,
    /// The number of per-input sections does not match the stated input count
    UnexpectedInputCount {
        /// Input count carried in the global section
        stated: u64,
        /// Per-input sections actually found
        parsed: u64,
    },
    /// A transaction or output embedded in a record's value failed to decode
    /// or did not fill the value exactly
    MalformedEmbeddedTransaction,
}

/// An error detected while decoding a partially signed transaction, together
/// with the byte offset at which it was detected. Errors are fatal: the
/// partially decoded value is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    /// What went wrong
    pub kind: ErrorKind,
    /// Absolute offset into the input stream
    pub offset: usize,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, offset: usize) -> Self {
        Error { kind, offset }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::InvalidMagic => write!(f, "invalid PSBT magic bytes")?,
            ErrorKind::NonCanonicalCompactSize => write!(f, "non-canonical compact size")?,
            ErrorKind::UnexpectedEof => write!(f, "unexpected end of stream")?,
            ErrorKind::BadKeyLength { tag, len } => {
                write!(f, "key of length {} is invalid for type 0x{:02x}", len, tag)?
            }
            ErrorKind::HashMismatch { tag } => {
                write!(f, "script does not match the hash in its key (type 0x{:02x})", tag)?
            }
            ErrorKind::UtxoMismatch => {
                write!(f, "provided utxo does not match the input's prevout")?
            }
            ErrorKind::IndexPolicyViolation => {
                write!(f, "indexed and unindexed inputs cannot be mixed")?
            }
            ErrorKind::UnexpectedInputCount { stated, parsed } => write!(
                f,
                "stated input count {} does not match the {} inputs provided",
                stated, parsed
            )?,
            ErrorKind::MalformedEmbeddedTransaction => {
                write!(f, "embedded transaction failed to decode")?
            }
        }
        write!(f, " at byte {}", self.offset)
    }
}

impl std::error::Error for Error {}

// Plain reads inside the record stream surface their own taxonomy; anything
// else a bounded value decoder can produce is a malformed embedded payload.
impl From<encode::Error> for Error {
    fn from(err: encode::Error) -> Self {
        let offset = err.offset();
        let kind = match err {
            encode::Error::UnexpectedEof { .. } => ErrorKind::UnexpectedEof,
            encode::Error::NonCanonicalCompactSize { .. } => ErrorKind::NonCanonicalCompactSize,
            _ => ErrorKind::MalformedEmbeddedTransaction,
        };
        Error { kind, offset }
    }
}
