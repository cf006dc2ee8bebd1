//! Integration tests for atomlink-common.

use atomlink_common::{
    BridgeStatistics, ConnectionInfo, ConnectionStatus, Covariance, Error, ErrorKind, Format,
    MediaPayload, Quaternion, TelemetrySample, decode, encode, parse_config,
};

#[test]
fn test_sample_survives_both_formats() {
    let sample = TelemetrySample::from_quaternion(
        u32::MAX,
        "m5atom_imu",
        Quaternion::new(0.9238, 0.0, 0.3827, 0.0),
    );

    for format in [Format::Json, Format::Cbor] {
        let bytes = encode(&sample, format).expect("encode failed");
        let decoded: TelemetrySample = decode(&bytes, format).expect("decode failed");
        assert_eq!(decoded.seq, u32::MAX);
        assert_eq!(decoded.orientation, sample.orientation);
        assert!(decoded.orientation_covariance.is_unknown());
    }
}

#[test]
fn test_known_covariance_is_preserved() {
    let mut sample = TelemetrySample::from_quaternion(1, "m5atom_imu", Quaternion::IDENTITY);
    sample.orientation_covariance = Covariance([0.0025, 0.0, 0.0, 0.0, 0.0025, 0.0, 0.0, 0.0, 0.0025]);

    let bytes = encode(&sample, Format::Cbor).unwrap();
    let decoded: TelemetrySample = decode(&bytes, Format::Cbor).unwrap();
    assert!(!decoded.orientation_covariance.is_unknown());
    assert_eq!(decoded.orientation_covariance, sample.orientation_covariance);
}

#[test]
fn test_media_payload_json_shape() {
    let frame = MediaPayload::new(5, "camera", "jpeg", vec![1, 2, 3, 4]);
    let json = String::from_utf8(encode(&frame, Format::Json).unwrap()).unwrap();
    assert!(json.contains("\"format\":\"jpeg\""));
    assert!(json.contains("\"frame_id\":\"camera\""));
}

#[test]
fn test_connection_info_from_json5() {
    let info: ConnectionInfo = parse_config(
        r#"{
            status: "connected",
            ssid: "ros2_atom_ap",
            rssi: -61,
            channel: 11,
            address: "192.168.4.20",
            gateway: "192.168.4.1",
            netmask: "255.255.255.0",
            connected_ms: 1500,
            retry_count: 0,
        }"#,
    )
    .expect("parse failed");

    assert_eq!(info.status, ConnectionStatus::Connected);
    assert_eq!(info.rssi, -61);
    assert_eq!(info.address.map(|a| a.to_string()), Some("192.168.4.20".to_string()));
}

#[test]
fn test_statistics_serialization() {
    let stats = BridgeStatistics {
        messages_published: 20,
        messages_received: 5,
        connection_attempts: 1,
        successful_connections: 1,
        uptime_ms: 30_000,
        ..Default::default()
    };
    let json = serde_json::to_string(&stats).unwrap();
    assert!(json.contains("\"messages_received\":5"));
    assert!(json.contains("\"uptime_ms\":30000"));
}

#[test]
fn test_error_kinds_cover_taxonomy() {
    let cases = [
        (Error::invalid_argument("x"), ErrorKind::InvalidArgument),
        (Error::invalid_state("x"), ErrorKind::InvalidState),
        (Error::OutOfMemory("x".into()), ErrorKind::OutOfMemory),
        (Error::timeout("x"), ErrorKind::Timeout),
        (Error::connection_failure("x"), ErrorKind::ConnectionFailure),
        (Error::not_found("x"), ErrorKind::NotFound),
    ];

    for (err, kind) in cases {
        assert_eq!(err.kind(), kind);
    }
}
