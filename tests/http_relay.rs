//! HTTP relay backend against an in-process fake board.

use junction_os::relay::{HttpRelay, RelayActuator, RelayError};
use junction_os::types::{ApproachKind, Phase, SignalState};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Request paths in arrival order.
type Hits = Arc<Mutex<Vec<String>>>;

/// Serve one request per connection, answering `status` to every GET.
async fn spawn_board(status: u16) -> (String, Hits) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits: Hits = Arc::new(Mutex::new(Vec::new()));
    let seen = hits.clone();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let seen = seen.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let text = String::from_utf8_lossy(&head);
                let path = text.split_whitespace().nth(1).unwrap_or_default().to_string();
                seen.lock().unwrap().push(path);

                let reason = if status == 200 { "OK" } else { "Internal Server Error" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK"
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (format!("http://{addr}/30000/"), hits)
}

fn codes(hits: &Hits) -> Vec<String> {
    hits.lock()
        .unwrap()
        .iter()
        .map(|p| p.trim_start_matches("/30000/").to_string())
        .collect()
}

fn take(hits: &Hits) -> Vec<String> {
    let out = codes(hits);
    hits.lock().unwrap().clear();
    out
}

fn as_set(codes: &[String]) -> HashSet<&str> {
    codes.iter().map(String::as_str).collect()
}

fn position(codes: &[String], code: &str) -> usize {
    codes
        .iter()
        .position(|c| c == code)
        .unwrap_or_else(|| panic!("{code} not sent: {codes:?}"))
}

#[tokio::test]
async fn first_phase_drives_every_relay() {
    let (base, hits) = spawn_board(200).await;
    let relay = HttpRelay::new(&base, &[ApproachKind::Vehicle, ApproachKind::Pedestrian], Duration::from_secs(2)).unwrap();

    relay
        .assert_phase(&Phase::new(vec![SignalState::Green, SignalState::RedPed]))
        .await
        .unwrap();

    // vehicle relays 1-3, pedestrian relays 4-5
    let sent = take(&hits);
    assert_eq!(as_set(&sent), HashSet::from(["00", "03", "04", "07", "08"]));
    // within the vehicle slot the offs precede the on
    assert!(position(&sent, "03") > position(&sent, "00"));
    assert!(position(&sent, "03") > position(&sent, "04"));
    // and in the pedestrian slot
    assert!(position(&sent, "07") > position(&sent, "08"));
}

#[tokio::test]
async fn only_changed_relays_are_sent() {
    let (base, hits) = spawn_board(200).await;
    let relay = HttpRelay::new(&base, &[ApproachKind::Vehicle, ApproachKind::Pedestrian], Duration::from_secs(2)).unwrap();

    relay
        .assert_phase(&Phase::new(vec![SignalState::Green, SignalState::RedPed]))
        .await
        .unwrap();
    take(&hits);

    relay
        .assert_phase(&Phase::new(vec![SignalState::Yellow, SignalState::GreenPed]))
        .await
        .unwrap();
    let sent = take(&hits);
    // relay 1 (red) was already off
    assert_eq!(as_set(&sent), HashSet::from(["02", "05", "06", "09"]));

    relay
        .assert_phase(&Phase::new(vec![SignalState::Yellow, SignalState::GreenPed]))
        .await
        .unwrap();
    assert!(take(&hits).is_empty());
}

#[tokio::test]
async fn all_off_is_forced() {
    let (base, hits) = spawn_board(200).await;
    let relay = HttpRelay::new(&base, &[ApproachKind::Vehicle, ApproachKind::Pedestrian], Duration::from_secs(2)).unwrap();

    relay.all_off().await.unwrap();
    relay.all_off().await.unwrap();
    let sent = take(&hits);
    assert_eq!(sent.len(), 10);
    assert_eq!(as_set(&sent), HashSet::from(["00", "02", "04", "06", "08"]));
}

#[tokio::test]
async fn failures_are_aggregated() {
    let (base, _hits) = spawn_board(500).await;
    let relay = HttpRelay::new(&base, &[ApproachKind::Vehicle], Duration::from_secs(2)).unwrap();

    let result = relay.assert_phase(&Phase::new(vec![SignalState::Red])).await;
    assert!(matches!(result, Err(RelayError::Partial { failed: 3, total: 3 })));

    // nothing stuck, so the same phase is retried in full
    let result = relay.assert_phase(&Phase::new(vec![SignalState::Red])).await;
    assert!(matches!(result, Err(RelayError::Partial { failed: 3, total: 3 })));
}

#[tokio::test]
async fn wrong_width_is_rejected_without_requests() {
    let (base, hits) = spawn_board(200).await;
    let relay = HttpRelay::new(&base, &[ApproachKind::Vehicle], Duration::from_secs(2)).unwrap();

    let result = relay
        .assert_phase(&Phase::new(vec![SignalState::Red, SignalState::Green]))
        .await;
    assert!(matches!(result, Err(RelayError::Topology { expected: 1, found: 2 })));
    assert!(take(&hits).is_empty());
}
