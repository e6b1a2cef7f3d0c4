// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Station Integration Tests
//!
//! Point updates, the station sink and a controlling station talking to the
//! server over TCP.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use ua104_core::{MappingId, QualityFlags, ServerId, Sink, SinkError, Value, ValueUpdate};
use ua104_iec104::frame::asdu::{cause, C_IC_NA_1, QOI_STATION};
use ua104_iec104::frame::{Apci, Apdu, ApduCodec, Asdu, Cot, UFunction};
use ua104_iec104::{
    Iec104Error, PointConfig, PointType, PointValue, StationManager, StationSink, StationState,
};
use ua104_tests::prelude::*;

fn running_station() -> (StationManager, SocketAddr) {
    init_test_logging();
    let station = StationManager::new();
    let addr = station.start(plant_station()).unwrap();
    (station, addr)
}

fn update(ioa: u32, value: Value) -> ValueUpdate {
    ValueUpdate {
        server_id: ServerId::new(PLANT),
        mapping_id: MappingId::new(1),
        node_id: "ns=2;s=Breaker".to_string(),
        target_address: ioa,
        value,
        quality: QualityFlags::GOOD,
        timestamp: Utc::now(),
    }
}

// =============================================================================
// Lifecycle and points
// =============================================================================

#[test]
fn test_lifecycle() {
    let (station, addr) = running_station();
    assert_ne!(addr.port(), 0);
    assert!(station.is_running());

    let status = station.status();
    assert_eq!(status.station_name.as_deref(), Some("rtu-test"));
    assert_eq!(status.common_address, Some(STATION_CA));
    assert_eq!(status.points_count, 3);
    assert_eq!(status.local_addr, Some(addr.to_string()));

    assert!(matches!(station.start(plant_station()), Err(Iec104Error::AlreadyRunning)));

    assert!(station.stop());
    assert_eq!(station.state(), StationState::Stopped);
    assert!(station.stop());

    // Restart on a fresh port.
    station.start(plant_station()).unwrap();
    assert!(station.is_running());
    station.stop();
}

#[test]
fn test_invalid_config_is_refused() {
    let station = StationManager::new();
    let config = plant_station().with_point(PointConfig::new(10, PointType::Scaled));

    assert!(matches!(station.start(config), Err(Iec104Error::InvalidConfig(_))));
    assert_eq!(station.state(), StationState::Stopped);
}

#[test]
fn test_points_start_invalid() {
    let (station, _) = running_station();
    let point = station.point(STATION_CA, 20).unwrap();
    assert!(point.quality.contains(QualityFlags::INVALID));
    assert!(point.updated_at.is_none());
    station.stop();
}

#[test]
fn test_single_point_update() {
    let (station, _) = running_station();

    let point = station
        .update_point(STATION_CA, 10, &Value::Bool(true), QualityFlags::GOOD, None)
        .unwrap();
    assert_eq!(point.value, PointValue::Single(true));
    assert!(point.quality.is_good());
    assert_eq!(station.point(STATION_CA, 10).unwrap().value, PointValue::Single(true));
    station.stop();
}

#[test]
fn test_update_drops_quality_bits_the_type_cannot_carry() {
    let (station, _) = running_station();

    let point = station
        .update_point(STATION_CA, 10, &Value::Bool(false), QualityFlags::OVERFLOW, None)
        .unwrap();
    assert!(point.quality.is_good());

    let point = station
        .update_point(STATION_CA, 20, &Value::Float(2.5), QualityFlags::OVERFLOW, None)
        .unwrap();
    assert!(point.quality.contains(QualityFlags::OVERFLOW));
    assert_eq!(point.value, PointValue::Float(2.5));
    station.stop();
}

#[test]
fn test_unconvertible_value_keeps_previous_state() {
    init_test_logging();
    let station = StationManager::new();
    station
        .start(plant_station().with_point(PointConfig::new(40, PointType::DoublePoint)))
        .unwrap();
    let before = station.point(STATION_CA, 40).unwrap();

    let err = station
        .update_point(STATION_CA, 40, &Value::Int(5), QualityFlags::GOOD, None)
        .unwrap_err();
    assert!(matches!(err, Iec104Error::InvalidValue { io_address: 40, .. }));
    assert_eq!(station.point(STATION_CA, 40).unwrap(), before);

    let err = station
        .update_point(STATION_CA, 30, &Value::Int(40_000), QualityFlags::GOOD, None)
        .unwrap_err();
    assert!(matches!(err, Iec104Error::InvalidValue { .. }));
    station.stop();
}

#[test]
fn test_update_errors() {
    let station = StationManager::new();
    assert!(matches!(
        station.update_point(STATION_CA, 10, &Value::Bool(true), QualityFlags::GOOD, None),
        Err(Iec104Error::StationNotRunning)
    ));

    let (station, _) = running_station();
    assert!(matches!(
        station.update_point(STATION_CA, 999, &Value::Bool(true), QualityFlags::GOOD, None),
        Err(Iec104Error::UnknownPoint { .. })
    ));
    assert!(matches!(
        station.update_point(7, 10, &Value::Bool(true), QualityFlags::GOOD, None),
        Err(Iec104Error::UnknownPoint { .. })
    ));
    station.stop();
}

// =============================================================================
// Station sink
// =============================================================================

#[test]
fn test_station_sink_writes_points() {
    let (station, _) = running_station();
    let sink = StationSink::new(station.clone(), STATION_CA);

    sink.on_value_changed(&update(30, Value::Int(7))).unwrap();
    assert_eq!(station.point(STATION_CA, 30).unwrap().value, PointValue::Scaled(7));

    let err = sink.on_value_changed(&update(999, Value::Int(7))).unwrap_err();
    assert!(matches!(err, SinkError::Rejected { address: 999, .. }));

    station.stop();
    let err = sink.on_value_changed(&update(30, Value::Int(8))).unwrap_err();
    assert!(matches!(err, SinkError::Delivery(_)));
}

// =============================================================================
// Controlling station
// =============================================================================

type Master = Framed<TcpStream, ApduCodec>;

async fn next_asdu(master: &mut Master) -> Asdu {
    loop {
        let apdu = tokio::time::timeout(WAIT, master.next())
            .await
            .expect("frame within timeout")
            .expect("connection open")
            .expect("valid frame");
        if let Some(asdu) = apdu.asdu {
            return asdu;
        }
    }
}

async fn start_data_transfer(addr: SocketAddr) -> Master {
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut master = Framed::new(stream, ApduCodec);
    master.send(Apdu::u_frame(UFunction::StartDtAct)).await.unwrap();

    let confirm = tokio::time::timeout(WAIT, master.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(confirm.apci, Apci::U(UFunction::StartDtCon));
    master
}

fn interrogation(common_address: u16) -> Apdu {
    Apdu::i_frame(
        Apci::I {
            send_seq: 0,
            recv_seq: 0,
        },
        Asdu {
            type_id: C_IC_NA_1,
            sequence: false,
            count: 1,
            cot: Cot::new(cause::ACTIVATION),
            originator: 0,
            common_address,
            payload: Bytes::from_static(&[0, 0, 0, QOI_STATION]),
        },
    )
}

#[test]
fn test_general_interrogation_and_spontaneous_updates() {
    let (station, addr) = running_station();
    station
        .update_point(STATION_CA, 10, &Value::Bool(true), QualityFlags::GOOD, None)
        .unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let mut master = start_data_transfer(addr).await;
        master.send(interrogation(STATION_CA)).await.unwrap();

        let confirm = next_asdu(&mut master).await;
        assert_eq!(confirm.type_id, C_IC_NA_1);
        assert_eq!(confirm.cot.cause, cause::ACTIVATION_CON);
        assert!(!confirm.cot.negative);

        let mut data = Vec::new();
        loop {
            let asdu = next_asdu(&mut master).await;
            if asdu.type_id == C_IC_NA_1 {
                assert_eq!(asdu.cot.cause, cause::ACTIVATION_TERM);
                break;
            }
            assert_eq!(asdu.cot.cause, cause::INTERROGATED);
            assert_eq!(asdu.common_address, STATION_CA);
            data.push(asdu);
        }

        let mut types: Vec<u8> = data.iter().map(|a| a.type_id).collect();
        types.sort();
        assert_eq!(types, vec![1, 11, 13]);

        let single = data.iter().find(|a| a.type_id == 1).unwrap();
        assert_eq!(single.first_address(), Some(10));
        assert_eq!(single.first_element(), &[0x01]);

        let float = data.iter().find(|a| a.type_id == 13).unwrap();
        assert_eq!(float.first_element()[4] & 0x80, 0x80, "untouched point reports invalid");

        assert!(wait_until(WAIT, || station.status().connections == 1));

        station
            .update_point(STATION_CA, 20, &Value::Float(1.5), QualityFlags::GOOD, None)
            .unwrap();
        let spontaneous = next_asdu(&mut master).await;
        assert_eq!(spontaneous.type_id, 13);
        assert_eq!(spontaneous.cot.cause, cause::SPONTANEOUS);
        assert_eq!(spontaneous.first_address(), Some(20));
        let element = spontaneous.first_element();
        assert_eq!(f32::from_le_bytes([element[0], element[1], element[2], element[3]]), 1.5);
        assert_eq!(element[4], 0);
    });

    station.stop();
}

#[test]
fn test_unknown_common_address_is_refused() {
    let (station, addr) = running_station();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let mut master = start_data_transfer(addr).await;
        master.send(interrogation(42)).await.unwrap();

        let reply = next_asdu(&mut master).await;
        assert_eq!(reply.cot.cause, cause::UNKNOWN_COMMON_ADDRESS);
        assert!(reply.cot.negative);
    });

    station.stop();
}

#[test]
fn test_stop_with_connected_master() {
    let (station, addr) = running_station();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut master = runtime.block_on(start_data_transfer(addr));

    assert!(station.stop());
    let closed = runtime.block_on(async {
        tokio::time::timeout(Duration::from_secs(2), master.next()).await
    });
    // The session ends with the station.
    assert!(matches!(closed, Ok(None) | Ok(Some(Err(_)))));
}

#[test]
fn test_cyclic_points_are_reported_periodically() {
    init_test_logging();
    let station = StationManager::new();
    let addr = station
        .start(plant_station().with_point(PointConfig::new(50, PointType::ShortFloat).with_report_interval(200)))
        .unwrap();
    station
        .update_point(STATION_CA, 50, &Value::Float(4.0), QualityFlags::GOOD, None)
        .unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let mut master = start_data_transfer(addr).await;
        let mut periodic = 0;
        while periodic < 2 {
            let asdu = next_asdu(&mut master).await;
            if asdu.cot.cause == cause::PERIODIC {
                assert_eq!(asdu.first_address(), Some(50));
                periodic += 1;
            }
        }
    });

    station.stop();
}
