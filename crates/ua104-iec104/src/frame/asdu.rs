// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application service data units.
//!
//! ```text
//! | type id | SQ | count (7) | T | P/N | cause (6) | OA | CA (LE u16) | objects ... |
//! ```
//!
//! Monitoring objects are written with SQ = 0: every object carries its own
//! three-octet address followed by the type's information element.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use ua104_core::quality::QualityFlags;
use ua104_core::types::{CommonAddress, IoAddress};

use super::time::{encode_cp56, CP56_SIZE};
use crate::error::ProtocolError;
use crate::types::{PointType, PointValue, RuntimePoint};

/// Length of the data unit identifier.
pub const IDENTIFIER_SIZE: usize = 6;
/// Largest ASDU carried by one APDU.
pub const ASDU_SIZE_MAX: usize = 249;
/// Length of an information object address.
pub const IOA_SIZE: usize = 3;
/// Largest object count of the variable structure qualifier.
pub const MAX_OBJECTS: usize = 127;
/// Broadcast common address.
pub const GLOBAL_COMMON_ADDRESS: CommonAddress = 0xFFFF;

/// Interrogation command.
pub const C_IC_NA_1: u8 = 100;
/// Clock synchronisation command.
pub const C_CS_NA_1: u8 = 103;
/// Station interrogation qualifier.
pub const QOI_STATION: u8 = 20;

// =============================================================================
// Cause of transmission
// =============================================================================

/// Cause of transmission values used by the station.
pub mod cause {
    /// Periodic, cyclic.
    pub const PERIODIC: u8 = 1;
    /// Spontaneous.
    pub const SPONTANEOUS: u8 = 3;
    /// Activation.
    pub const ACTIVATION: u8 = 6;
    /// Activation confirmation.
    pub const ACTIVATION_CON: u8 = 7;
    /// Activation termination.
    pub const ACTIVATION_TERM: u8 = 10;
    /// Interrogated by station interrogation.
    pub const INTERROGATED: u8 = 20;
    /// Unknown type identification.
    pub const UNKNOWN_TYPE: u8 = 44;
    /// Unknown cause of transmission.
    pub const UNKNOWN_CAUSE: u8 = 45;
    /// Unknown common address of ASDU.
    pub const UNKNOWN_COMMON_ADDRESS: u8 = 46;
    /// Unknown information object address.
    pub const UNKNOWN_IOA: u8 = 47;
}

/// Cause of transmission octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cot {
    /// Cause, six bits.
    pub cause: u8,
    /// P/N bit: negative confirmation.
    pub negative: bool,
    /// T bit: test.
    pub test: bool,
}

impl Cot {
    /// Creates a positive, non-test cause.
    pub const fn new(cause: u8) -> Self {
        Self {
            cause,
            negative: false,
            test: false,
        }
    }

    /// Encodes the octet.
    pub fn raw(self) -> u8 {
        let mut raw = self.cause & 0x3F;
        if self.negative {
            raw |= 0x40;
        }
        if self.test {
            raw |= 0x80;
        }
        raw
    }

    /// Returns a copy with another cause, keeping the P/N and T bits.
    pub const fn with_cause(self, cause: u8) -> Self {
        Self { cause, ..self }
    }

    /// Decodes the octet.
    pub fn from_raw(raw: u8) -> Self {
        Self {
            cause: raw & 0x3F,
            negative: raw & 0x40 != 0,
            test: raw & 0x80 != 0,
        }
    }
}

// =============================================================================
// Asdu
// =============================================================================

/// A decoded data unit with its objects kept raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asdu {
    /// Type identification.
    pub type_id: u8,
    /// SQ bit of the variable structure qualifier.
    pub sequence: bool,
    /// Number of information objects.
    pub count: u8,
    /// Cause of transmission.
    pub cot: Cot,
    /// Originator address.
    pub originator: u8,
    /// Common address of ASDU.
    pub common_address: CommonAddress,
    /// Information objects.
    pub payload: Bytes,
}

impl Asdu {
    /// Returns the encoded length.
    pub fn len(&self) -> usize {
        IDENTIFIER_SIZE + self.payload.len()
    }

    /// Returns `true` if no objects are carried.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Writes the identifier and payload.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.type_id);
        let sq = if self.sequence { 0x80 } else { 0x00 };
        buf.put_u8((self.count & 0x7F) | sq);
        buf.put_u8(self.cot.raw());
        buf.put_u8(self.originator);
        buf.put_u16_le(self.common_address);
        buf.extend_from_slice(&self.payload);
    }

    /// Parses an ASDU.
    pub fn parse(bytes: Bytes) -> Result<Self, ProtocolError> {
        if bytes.len() < IDENTIFIER_SIZE {
            return Err(ProtocolError::truncated(IDENTIFIER_SIZE, bytes.len()));
        }
        Ok(Self {
            type_id: bytes[0],
            sequence: bytes[1] & 0x80 != 0,
            count: bytes[1] & 0x7F,
            cot: Cot::from_raw(bytes[2]),
            originator: bytes[3],
            common_address: u16::from_le_bytes([bytes[4], bytes[5]]),
            payload: bytes.slice(IDENTIFIER_SIZE..),
        })
    }

    /// Returns the address of the first information object.
    pub fn first_address(&self) -> Option<IoAddress> {
        let ioa = self.payload.get(..IOA_SIZE)?;
        Some(u32::from_le_bytes([ioa[0], ioa[1], ioa[2], 0]))
    }

    /// Returns the element octets following the first object address.
    pub fn first_element(&self) -> &[u8] {
        self.payload.get(IOA_SIZE..).unwrap_or_default()
    }

    /// Returns a copy carrying another cause, as used for confirmations.
    pub fn mirror(&self, cause: u8, negative: bool) -> Self {
        Self {
            cot: Cot {
                cause,
                negative,
                test: self.cot.test,
            },
            ..self.clone()
        }
    }
}

// =============================================================================
// Monitoring direction encoding
// =============================================================================

/// Returns the length of one information element of `point_type`,
/// including its time tag.
pub const fn element_size(point_type: PointType) -> usize {
    let base = match point_type {
        PointType::SinglePoint | PointType::SinglePointTime | PointType::DoublePoint | PointType::DoublePointTime => 1,
        PointType::Normalized | PointType::NormalizedTime | PointType::Scaled | PointType::ScaledTime => 3,
        PointType::ShortFloat | PointType::ShortFloatTime | PointType::Counter | PointType::CounterTime => 5,
    };
    if point_type.is_time_tagged() {
        base + CP56_SIZE
    } else {
        base
    }
}

/// Returns how many objects of `point_type` fit one ASDU.
pub const fn objects_per_asdu(point_type: PointType) -> usize {
    let fit = (ASDU_SIZE_MAX - IDENTIFIER_SIZE) / (IOA_SIZE + element_size(point_type));
    if fit < MAX_OBJECTS {
        fit
    } else {
        MAX_OBJECTS
    }
}

fn put_element(buf: &mut BytesMut, value: PointValue, quality: QualityFlags) {
    let qds = quality.bits();
    match value {
        PointValue::Single(on) => buf.put_u8((qds & 0xF0) | u8::from(on)),
        PointValue::Double(state) => buf.put_u8((qds & 0xF0) | state.bits()),
        PointValue::Normalized(v) => {
            let raw = (f64::from(v) * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            buf.put_i16_le(raw);
            buf.put_u8(qds & 0xF1);
        }
        PointValue::Scaled(v) => {
            buf.put_i16_le(v);
            buf.put_u8(qds & 0xF1);
        }
        PointValue::Float(v) => {
            buf.put_f32_le(v);
            buf.put_u8(qds & 0xF1);
        }
        // Sequence notation: sequence number, carry and adjusted stay zero.
        PointValue::Counter(v) => {
            buf.put_i32_le(v);
            buf.put_u8(qds & 0x80);
        }
    }
}

/// Builds monitoring ASDUs for `points`, which must all share one type.
///
/// Points are split over as many ASDUs as their size requires. Time-tagged
/// types carry `sent_at`.
pub fn monitoring_asdus(
    point_type: PointType,
    points: &[RuntimePoint],
    cause: u8,
    common_address: CommonAddress,
    sent_at: DateTime<Utc>,
) -> Vec<Asdu> {
    let tag = point_type.is_time_tagged().then(|| encode_cp56(sent_at));

    points
        .chunks(objects_per_asdu(point_type).max(1))
        .map(|chunk| {
            let mut payload = BytesMut::with_capacity(chunk.len() * (IOA_SIZE + element_size(point_type)));
            for point in chunk {
                let ioa = point.io_address.to_le_bytes();
                payload.extend_from_slice(&ioa[..IOA_SIZE]);
                put_element(&mut payload, point.value, point.quality);
                if let Some(tag) = &tag {
                    payload.extend_from_slice(tag);
                }
            }
            Asdu {
                type_id: point_type.type_id(),
                sequence: false,
                count: chunk.len() as u8,
                cot: Cot::new(cause),
                originator: 0,
                common_address,
                payload: payload.freeze(),
            }
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DoublePointState, PointConfig};

    fn point(ioa: IoAddress, point_type: PointType, value: PointValue, quality: QualityFlags) -> RuntimePoint {
        let mut p = RuntimePoint::from_config(&PointConfig::new(ioa, point_type));
        p.value = value;
        p.quality = quality;
        p
    }

    #[test]
    fn test_identifier_roundtrip() {
        let raw = Bytes::from_static(&[100, 0x01, 0x06, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 20]);
        let asdu = Asdu::parse(raw).unwrap();
        assert_eq!(asdu.type_id, C_IC_NA_1);
        assert_eq!(asdu.cot, Cot::new(cause::ACTIVATION));
        assert_eq!(asdu.common_address, 1);
        assert_eq!(asdu.first_address(), Some(0));
        assert_eq!(asdu.first_element(), &[QOI_STATION]);

        let negative = asdu.mirror(cause::UNKNOWN_TYPE, true);
        assert_eq!(negative.cot.raw(), 0x40 | 44);

        let mut buf = BytesMut::new();
        asdu.write_to(&mut buf);
        assert_eq!(&buf[..], &[100, 0x01, 0x06, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 20]);
    }

    #[test]
    fn test_parse_truncated() {
        assert_eq!(
            Asdu::parse(Bytes::from_static(&[1, 1, 3])),
            Err(ProtocolError::truncated(6, 3))
        );
    }

    #[test]
    fn test_single_point_element() {
        let points = [point(10, PointType::SinglePoint, PointValue::Single(true), QualityFlags::BLOCKED)];
        let asdus = monitoring_asdus(PointType::SinglePoint, &points, cause::SPONTANEOUS, 1, Utc::now());
        assert_eq!(asdus.len(), 1);
        assert_eq!(asdus[0].count, 1);
        assert_eq!(&asdus[0].payload[..], &[10, 0, 0, 0x11]);
    }

    #[test]
    fn test_measured_elements() {
        let points = [point(7, PointType::Scaled, PointValue::Scaled(-2), QualityFlags::OVERFLOW)];
        let asdus = monitoring_asdus(PointType::Scaled, &points, cause::PERIODIC, 1, Utc::now());
        assert_eq!(&asdus[0].payload[..], &[7, 0, 0, 0xFE, 0xFF, 0x01]);

        let points = [point(8, PointType::Normalized, PointValue::Normalized(0.5), QualityFlags::GOOD)];
        let asdus = monitoring_asdus(PointType::Normalized, &points, cause::PERIODIC, 1, Utc::now());
        assert_eq!(&asdus[0].payload[..], &[8, 0, 0, 0x00, 0x40, 0x00]);

        let points = [point(
            9,
            PointType::DoublePointTime,
            PointValue::Double(DoublePointState::On),
            QualityFlags::GOOD,
        )];
        let asdus = monitoring_asdus(PointType::DoublePointTime, &points, cause::SPONTANEOUS, 1, Utc::now());
        assert_eq!(asdus[0].type_id, 31);
        assert_eq!(asdus[0].payload.len(), IOA_SIZE + 1 + CP56_SIZE);
        assert_eq!(asdus[0].payload[3], 0x02);
    }

    #[test]
    fn test_large_sets_are_split() {
        let points: Vec<RuntimePoint> = (0..200)
            .map(|i| point(i, PointType::ShortFloat, PointValue::Float(1.0), QualityFlags::GOOD))
            .collect();
        let asdus = monitoring_asdus(PointType::ShortFloat, &points, cause::INTERROGATED, 1, Utc::now());
        let per = objects_per_asdu(PointType::ShortFloat);
        assert_eq!(per, 30);
        assert_eq!(asdus.len(), 7);
        assert!(asdus.iter().all(|a| a.len() <= ASDU_SIZE_MAX));
        assert_eq!(asdus.iter().map(|a| a.count as usize).sum::<usize>(), 200);
    }
}
