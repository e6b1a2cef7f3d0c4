// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application protocol control information.
//!
//! ```text
//! | 0x68 | length | ctrl1 | ctrl2 | ctrl3 | ctrl4 | ASDU (I-format only) |
//!
//! I-format: ctrl1 bit0 = 0     N(S) = ctrl1>>1 | ctrl2<<7, N(R) likewise
//! S-format: ctrl1 = 0x01       N(R) in ctrl3/ctrl4
//! U-format: ctrl1 bit0..1 = 11 function bits in ctrl1
//! ```

use std::fmt;

use crate::error::ProtocolError;

/// Start octet of every APDU.
pub const START_BYTE: u8 = 0x68;
/// Start octet plus length octet plus control field.
pub const APCI_SIZE: usize = 6;
/// Length of the control field.
pub const CONTROL_SIZE: usize = 4;
/// Largest APDU on the wire.
pub const APDU_SIZE_MAX: usize = 255;
/// Sequence numbers are 15 bits wide.
pub const SEQUENCE_MODULO: u16 = 32768;

/// U-format functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UFunction {
    /// STARTDT act.
    StartDtAct,
    /// STARTDT con.
    StartDtCon,
    /// STOPDT act.
    StopDtAct,
    /// STOPDT con.
    StopDtCon,
    /// TESTFR act.
    TestFrAct,
    /// TESTFR con.
    TestFrCon,
}

impl UFunction {
    const fn bits(self) -> u8 {
        match self {
            UFunction::StartDtAct => 0x04,
            UFunction::StartDtCon => 0x08,
            UFunction::StopDtAct => 0x10,
            UFunction::StopDtCon => 0x20,
            UFunction::TestFrAct => 0x40,
            UFunction::TestFrCon => 0x80,
        }
    }

    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x04 => Some(UFunction::StartDtAct),
            0x08 => Some(UFunction::StartDtCon),
            0x10 => Some(UFunction::StopDtAct),
            0x20 => Some(UFunction::StopDtCon),
            0x40 => Some(UFunction::TestFrAct),
            0x80 => Some(UFunction::TestFrCon),
            _ => None,
        }
    }
}

/// Decoded control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apci {
    /// Numbered information transfer.
    I {
        /// N(S).
        send_seq: u16,
        /// N(R).
        recv_seq: u16,
    },
    /// Numbered supervisory acknowledgement.
    S {
        /// N(R).
        recv_seq: u16,
    },
    /// Unnumbered control function.
    U(UFunction),
}

impl Apci {
    /// Encodes the four control octets.
    pub fn control(self) -> [u8; CONTROL_SIZE] {
        match self {
            Apci::I { send_seq, recv_seq } => [
                (send_seq << 1) as u8,
                (send_seq >> 7) as u8,
                (recv_seq << 1) as u8,
                (recv_seq >> 7) as u8,
            ],
            Apci::S { recv_seq } => [0x01, 0x00, (recv_seq << 1) as u8, (recv_seq >> 7) as u8],
            Apci::U(function) => [function.bits() | 0x03, 0x00, 0x00, 0x00],
        }
    }

    /// Decodes the four control octets.
    pub fn from_control(ctrl: [u8; CONTROL_SIZE]) -> Result<Self, ProtocolError> {
        let recv_seq = (u16::from(ctrl[2]) >> 1) + (u16::from(ctrl[3]) << 7);

        if ctrl[0] & 0x01 == 0 {
            return Ok(Apci::I {
                send_seq: (u16::from(ctrl[0]) >> 1) + (u16::from(ctrl[1]) << 7),
                recv_seq,
            });
        }
        if ctrl[0] & 0x03 == 0x01 {
            return Ok(Apci::S { recv_seq });
        }
        UFunction::from_bits(ctrl[0] & 0xFC)
            .map(Apci::U)
            .ok_or(ProtocolError::InvalidControl(ctrl))
    }
}

impl fmt::Display for Apci {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Apci::I { send_seq, recv_seq } => write!(f, "I(S={}, R={})", send_seq, recv_seq),
            Apci::S { recv_seq } => write!(f, "S(R={})", recv_seq),
            Apci::U(function) => write!(f, "U({:?})", function),
        }
    }
}

/// Returns `(later - earlier) mod 32768`.
#[inline]
pub fn seq_distance(later: u16, earlier: u16) -> u16 {
    (later + SEQUENCE_MODULO - earlier) % SEQUENCE_MODULO
}

/// Returns the sequence number following `seq`.
#[inline]
pub fn next_seq(seq: u16) -> u16 {
    (seq + 1) % SEQUENCE_MODULO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i_format() {
        let apci = Apci::from_control([0x02, 0x00, 0x03, 0x00]).unwrap();
        assert_eq!(apci, Apci::I { send_seq: 1, recv_seq: 1 });

        let big = Apci::I {
            send_seq: 300,
            recv_seq: 32767,
        };
        assert_eq!(Apci::from_control(big.control()).unwrap(), big);
    }

    #[test]
    fn test_s_and_u_format() {
        assert_eq!(
            Apci::from_control([0x01, 0x00, 0x02, 0x00]).unwrap(),
            Apci::S { recv_seq: 1 }
        );
        assert_eq!(
            Apci::from_control([0x07, 0x00, 0x00, 0x00]).unwrap(),
            Apci::U(UFunction::StartDtAct)
        );
        assert_eq!(Apci::U(UFunction::TestFrCon).control(), [0x83, 0, 0, 0]);
        assert!(Apci::from_control([0x0F, 0x00, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_sequence_arithmetic() {
        assert_eq!(next_seq(32767), 0);
        assert_eq!(seq_distance(2, 32766), 4);
        assert_eq!(seq_distance(5, 5), 0);
    }
}
