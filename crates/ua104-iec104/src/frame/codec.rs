// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `tokio_util` codec turning a byte stream into [`Apdu`]s.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use super::apci::{Apci, APCI_SIZE, APDU_SIZE_MAX, CONTROL_SIZE, START_BYTE};
use super::asdu::{Asdu, ASDU_SIZE_MAX};
use super::Apdu;
use crate::error::{Iec104Error, ProtocolError};

/// Length-prefixed APDU framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApduCodec;

impl Encoder<Apdu> for ApduCodec {
    type Error = Iec104Error;

    fn encode(&mut self, apdu: Apdu, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let asdu_len = apdu.asdu.as_ref().map_or(0, Asdu::len);
        if asdu_len > ASDU_SIZE_MAX {
            return Err(ProtocolError::InvalidLength(asdu_len + CONTROL_SIZE).into());
        }

        buf.reserve(APCI_SIZE + asdu_len);
        buf.put_u8(START_BYTE);
        buf.put_u8((CONTROL_SIZE + asdu_len) as u8);
        buf.extend_from_slice(&apdu.apci.control());
        if let Some(asdu) = &apdu.asdu {
            asdu.write_to(buf);
        }
        Ok(())
    }
}

impl Decoder for ApduCodec {
    type Item = Apdu;
    type Error = Iec104Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if buf.len() < 2 {
            return Ok(None);
        }
        if buf[0] != START_BYTE {
            return Err(ProtocolError::InvalidStart(buf[0]).into());
        }
        let total = usize::from(buf[1]) + 2;
        if !(APCI_SIZE..=APDU_SIZE_MAX).contains(&total) {
            return Err(ProtocolError::InvalidLength(usize::from(buf[1])).into());
        }
        if buf.len() < total {
            buf.reserve(total - buf.len());
            return Ok(None);
        }

        let mut frame = buf.split_to(total);
        frame.advance(2);
        let control = [frame[0], frame[1], frame[2], frame[3]];
        frame.advance(CONTROL_SIZE);
        let apci = Apci::from_control(control)?;

        let asdu = match apci {
            Apci::I { .. } => match Asdu::parse(frame.freeze()) {
                Ok(asdu) => Some(asdu),
                Err(e) => {
                    warn!(error = %e, apci = %apci, "ASDU decode failed; dropping payload");
                    None
                }
            },
            _ => None,
        };
        Ok(Some(Apdu { apci, asdu }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::apci::UFunction;
    use crate::frame::asdu::{cause, Cot, C_IC_NA_1};
    use bytes::Bytes;

    #[test]
    fn test_decode_partial_then_complete() {
        let mut codec = ApduCodec;
        let mut buf = BytesMut::from(&[START_BYTE, 0x04, 0x07][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[0x00, 0x00, 0x00]);
        let apdu = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(apdu.apci, Apci::U(UFunction::StartDtAct));
        assert!(apdu.asdu.is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_interrogation() {
        let mut codec = ApduCodec;
        let mut buf = BytesMut::from(
            &[
                START_BYTE, 0x0E, 0x00, 0x00, 0x00, 0x00, 100, 0x01, 0x06, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 20,
            ][..],
        );
        let apdu = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(apdu.apci, Apci::I { send_seq: 0, recv_seq: 0 });
        let asdu = apdu.asdu.unwrap();
        assert_eq!(asdu.type_id, C_IC_NA_1);
        assert_eq!(asdu.cot, Cot::new(cause::ACTIVATION));
    }

    #[test]
    fn test_encode_i_frame() {
        let mut codec = ApduCodec;
        let asdu = Asdu {
            type_id: 1,
            sequence: false,
            count: 1,
            cot: Cot::new(cause::SPONTANEOUS),
            originator: 0,
            common_address: 1,
            payload: Bytes::from_static(&[10, 0, 0, 1]),
        };
        let mut buf = BytesMut::new();
        codec
            .encode(
                Apdu::i_frame(
                    Apci::I {
                        send_seq: 1,
                        recv_seq: 2,
                    },
                    asdu,
                ),
                &mut buf,
            )
            .unwrap();
        assert_eq!(
            &buf[..],
            &[START_BYTE, 14, 0x02, 0x00, 0x04, 0x00, 1, 1, 3, 0, 1, 0, 10, 0, 0, 1]
        );
    }

    #[test]
    fn test_rejects_garbage() {
        let mut codec = ApduCodec;
        let mut buf = BytesMut::from(&[0x10, 0x04, 0, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Iec104Error::Protocol(ProtocolError::InvalidStart(0x10)))
        ));

        let mut buf = BytesMut::from(&[START_BYTE, 0x02, 0, 0][..]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
