// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! IEC 60870-5-104 wire format.
//!
//! ```text
//! APDU ┬─ APCI (start, length, control field)   apci.rs
//!      └─ ASDU (I-format only)                  asdu.rs
//!            └─ CP56Time2a time tags            time.rs
//! ```
//!
//! [`ApduCodec`] frames APDUs over a TCP stream.

pub mod apci;
pub mod asdu;
pub mod codec;
pub mod time;

pub use apci::{Apci, UFunction};
pub use asdu::{Asdu, Cot};
pub use codec::ApduCodec;

/// One application protocol data unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    /// Control information.
    pub apci: Apci,
    /// Data unit, present on I-format frames that decoded.
    pub asdu: Option<Asdu>,
}

impl Apdu {
    /// Creates an I-format APDU.
    pub fn i_frame(apci: Apci, asdu: Asdu) -> Self {
        Self { apci, asdu: Some(asdu) }
    }

    /// Creates an S-format APDU acknowledging up to `recv_seq`.
    pub fn s_frame(recv_seq: u16) -> Self {
        Self {
            apci: Apci::S { recv_seq },
            asdu: None,
        }
    }

    /// Creates a U-format APDU.
    pub fn u_frame(function: UFunction) -> Self {
        Self {
            apci: Apci::U(function),
            asdu: None,
        }
    }
}
