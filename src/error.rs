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

use crate::transaction::OutPoint;

/// Errors that can be thrown by this crate
#[derive(Debug)]
pub enum Error {
    /// Wire-format encoding or decoding failed
    Encode(crate::encode::Error),
    /// A partially signed transaction failed to decode or validate
    Psbt(crate::psbt::Error),
    /// Coin selection could not produce an input set
    CoinSelection(crate::wallet::coin_selection::SelectionError),
    /// Two partially signed transactions that were asked to be combined do
    /// not share the same unsigned transaction
    DifferentTransactions,
    /// Requested outpoint doesn't exist in the tx (vout greater than available outputs)
    InvalidOutpoint(OutPoint),
}

macro_rules! impl_error {
    ( $from:ty, $to:ident ) => {
        impl std::convert::From<$from> for Error {
            fn from(err: $from) -> Self {
                Error::$to(err)
            }
        }
    };
}

impl_error!(crate::encode::Error, Encode);
impl_error!(crate::psbt::Error, Psbt);
impl_error!(crate::wallet::coin_selection::SelectionError, CoinSelection);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Encode(err) => write!(f, "Encoding error: {}", err),
            Error::Psbt(err) => write!(f, "PSBT error: {}", err),
            Error::CoinSelection(err) => write!(f, "Coin selection error: {}", err),
            Error::DifferentTransactions => {
                write!(f, "Cannot combine PSBTs over different transactions")
            }
            Error::InvalidOutpoint(outpoint) => {
                write!(f, "Requested outpoint doesn't exist in the tx: {}", outpoint)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Encode(err) => Some(err),
            Error::Psbt(err) => Some(err),
            Error::CoinSelection(err) => Some(err),
            _ => None,
        }
    }
}
