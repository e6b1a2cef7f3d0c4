// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CP56Time2a, the seven-octet binary time tag.
//!
//! ```text
//! | ms (LE u16, 0..59999)                 |
//! | IV | res | minute (6 bits)            |
//! | SU | res | hour (5 bits)              |
//! | weekday (3 bits) | day of month (5)   |
//! | res | month (4 bits)                  |
//! | res | year - 2000 (7 bits)            |
//! ```

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

/// Encoded length.
pub const CP56_SIZE: usize = 7;

/// Encodes a UTC time. Years outside 2000..=2127 are clamped into range.
pub fn encode_cp56(time: DateTime<Utc>) -> [u8; CP56_SIZE] {
    let millis = (time.second() * 1000 + time.nanosecond() / 1_000_000).min(59_999) as u16;
    let weekday = time.weekday().number_from_monday() as u8;
    let year = (time.year() - 2000).clamp(0, 127) as u8;

    let [ms_lo, ms_hi] = millis.to_le_bytes();
    [
        ms_lo,
        ms_hi,
        time.minute() as u8 & 0x3F,
        time.hour() as u8 & 0x1F,
        (weekday << 5) | (time.day() as u8 & 0x1F),
        time.month() as u8 & 0x0F,
        year & 0x7F,
    ]
}

/// Decodes a time tag. Returns `None` for invalid (IV set) or impossible
/// dates.
pub fn decode_cp56(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let bytes: &[u8; CP56_SIZE] = bytes.get(..CP56_SIZE)?.try_into().ok()?;
    if bytes[2] & 0x80 != 0 {
        return None;
    }

    let millis = u16::from_le_bytes([bytes[0], bytes[1]]);
    let minute = u32::from(bytes[2] & 0x3F);
    let hour = u32::from(bytes[3] & 0x1F);
    let day = u32::from(bytes[4] & 0x1F);
    let month = u32::from(bytes[5] & 0x0F);
    let year = 2000 + i32::from(bytes[6] & 0x7F);

    Utc.with_ymd_and_hms(year, month, day, hour, minute, u32::from(millis / 1000))
        .single()
        .map(|t| t + Duration::milliseconds(i64::from(millis % 1000)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_layout() {
        // 2024-03-15 (Friday) 13:45:30.250 UTC
        let time = Utc.with_ymd_and_hms(2024, 3, 15, 13, 45, 30).unwrap() + Duration::milliseconds(250);
        let bytes = encode_cp56(time);
        assert_eq!(bytes, [0x2A, 0x76, 45, 13, (5 << 5) | 15, 3, 24]);
        assert_eq!(decode_cp56(&bytes), Some(time));
    }

    #[test]
    fn test_invalid_flag_and_short_input() {
        let mut bytes = encode_cp56(Utc::now());
        bytes[2] |= 0x80;
        assert_eq!(decode_cp56(&bytes), None);
        assert_eq!(decode_cp56(&bytes[..4]), None);
    }
}
