//! Integration tests for the modsight-common library.

use modsight_common::{Format, Reading, ReadingLog, encode, to_csv};

#[test]
fn test_full_log_export_workflow() {
    // Populate a log the way the poller does: one insertion per attempt.
    let log = ReadingLog::new();
    log.push(Reading::success(
        1_700_000_000_000,
        "plc01",
        "192.168.1.10",
        502,
        1,
        vec![42, 255],
    ));
    log.push(Reading::failure(
        1_700_000_001_000,
        "meter02",
        "192.168.1.20",
        1502,
        3,
        "192.168.1.20:1502 unit 3: connection failed: connection refused",
    ));

    let snapshot = log.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].device, "meter02");
    assert_eq!(snapshot[1].device, "plc01");

    // Structured export round-trips through serde.
    let json = encode(&snapshot, Format::Json).expect("JSON encode failed");
    let decoded: Vec<Reading> = serde_json::from_str(&json).expect("JSON decode failed");
    assert_eq!(decoded, snapshot);
    assert_eq!(decoded[1].registers(), Some(&[42u16, 255][..]));
    assert!(decoded[0].error().unwrap().contains("connection refused"));

    // Tabular export: header plus one row per reading, newest first.
    let csv = to_csv(&snapshot).expect("CSV encode failed");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("timestamp,device,host,port,unit_id,error,reg_0,reg_1"));
    assert!(lines[1].contains("meter02"));
    assert!(lines[2].contains("plc01"));
}

#[tokio::test]
async fn test_subscription_delivers_each_insertion() {
    let log = ReadingLog::new();
    let mut rx = log.subscribe();

    for n in 0..3u16 {
        log.push(Reading::success(
            1_700_000_000_000 + i64::from(n),
            format!("device{}", n),
            "127.0.0.1",
            502,
            1,
            vec![n],
        ));
    }

    for n in 0..3u16 {
        let reading = rx.recv().await.expect("notification missing");
        assert_eq!(reading.device, format!("device{}", n));
        assert_eq!(reading.registers(), Some(&[n][..]));
    }
}
