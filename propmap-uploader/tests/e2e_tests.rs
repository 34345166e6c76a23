//! End-to-end: uploader against a real propmap-server on an ephemeral port

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use propmap_common::events::EventBus;
use propmap_server::{build_router, db, AppState};
use propmap_uploader::scanner::LogScanner;
use propmap_uploader::state::SendStateStore;
use propmap_uploader::submitter::{HttpSubmitter, LogSubmitter, SubmitOutcome};
use propmap_uploader::{UploaderError, Watcher};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn start_server(temp: &TempDir) -> (SocketAddr, AppState) {
    let pool = db::init_database(&temp.path().join("propmap.db")).await.unwrap();
    let state = AppState::new(pool, EventBus::new(16));
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn write_log(dir: &Path, name: &str, station: &str, contacts: usize) {
    let contacts: Vec<_> = (0..contacts)
        .map(|i| {
            json!({
                "tx_callsign": format!("K{}XYZ", i + 1),
                "rx_callsign": station,
                "timestamp": (Utc::now() - chrono::Duration::minutes(i as i64 + 1)).to_rfc3339(),
                "snr_db": -10
            })
        })
        .collect();
    let body = json!({"station_callsign": station, "contacts": contacts});
    std::fs::write(dir.join(name), body.to_string()).unwrap();
}

fn submitter_for(addr: SocketAddr) -> HttpSubmitter {
    HttpSubmitter::new(&format!("http://{}", addr), None, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_two_directories_delivered_once() {
    let server_dir = TempDir::new().unwrap();
    let (addr, state) = start_server(&server_dir).await;

    let wsjtx = TempDir::new().unwrap();
    let jtdx = TempDir::new().unwrap();
    let uploader_dir = TempDir::new().unwrap();
    write_log(wsjtx.path(), "g4abc.json", "G4ABC", 2);
    write_log(jtdx.path(), "m0xyz.json", "M0XYZ", 3);

    let state_path = uploader_dir.path().join("uploader_state.json");
    let scanner = LogScanner::new(
        vec![wsjtx.path().to_path_buf(), jtdx.path().to_path_buf()],
        vec!["json".to_string()],
        false,
    );
    let send_state = SendStateStore::load(&state_path).await.unwrap();
    let mut watcher = Watcher::new(scanner, send_state, submitter_for(addr));
    let cancel = CancellationToken::new();

    let report = watcher.run_cycle(&cancel).await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(state.store.contact_count().await.unwrap(), 5);

    let report = watcher.run_cycle(&cancel).await.unwrap();
    assert_eq!(report.unchanged, 2);
    assert_eq!(state.ledger.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_lost_state_gets_duplicate_not_double_write() {
    let server_dir = TempDir::new().unwrap();
    let (addr, state) = start_server(&server_dir).await;
    let logs = TempDir::new().unwrap();
    write_log(logs.path(), "a.json", "G4ABC", 2);

    // Two uploaders with separate state files deliver the same file; the
    // second one is told duplicate and still bookkeeps the file
    for expect_duplicate in [false, true] {
        let uploader_dir = TempDir::new().unwrap();
        let state_path = uploader_dir.path().join("state.json");
        let scanner = LogScanner::new(vec![logs.path().to_path_buf()], vec!["json".into()], false);
        let send_state = SendStateStore::load(&state_path).await.unwrap();
        let mut watcher = Watcher::new(scanner, send_state, submitter_for(addr));
        let report = watcher.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.duplicates, usize::from(expect_duplicate));
        assert_eq!(report.sent, usize::from(!expect_duplicate));
        assert!(watcher.state().get(&logs.path().join("a.json")).is_some());
        assert!(state_path.exists());
    }

    assert_eq!(state.store.contact_count().await.unwrap(), 2);

    let body = std::fs::read(logs.path().join("a.json")).unwrap();
    let outcome = submitter_for(addr)
        .submit(&logs.path().join("a.json"), body)
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::Duplicate);
}

#[tokio::test]
async fn test_malformed_file_is_rejected_and_retried() {
    let server_dir = TempDir::new().unwrap();
    let (addr, _state) = start_server(&server_dir).await;
    let logs = TempDir::new().unwrap();
    std::fs::write(logs.path().join("broken.json"), b"{\"contacts\": []}").unwrap();

    let err = submitter_for(addr)
        .submit(&logs.path().join("broken.json"), b"{\"contacts\": []}".to_vec())
        .await
        .unwrap_err();
    match err {
        UploaderError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert!(message.starts_with("MALFORMED_PAYLOAD"));
        }
        other => panic!("expected Rejected, got {:?}", other),
    }

    let uploader_dir = TempDir::new().unwrap();
    let state_path = uploader_dir.path().join("state.json");
    let scanner = LogScanner::new(vec![logs.path().to_path_buf()], vec!["json".into()], false);
    let mut watcher = Watcher::new(
        scanner,
        SendStateStore::load(&state_path).await.unwrap(),
        submitter_for(addr),
    );
    let cancel = CancellationToken::new();
    assert_eq!(watcher.run_cycle(&cancel).await.unwrap().failed, 1);
    assert_eq!(watcher.run_cycle(&cancel).await.unwrap().failed, 1);
    assert!(watcher.state().is_empty());
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = submitter_for(addr)
        .submit(Path::new("a.json"), b"{}".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, UploaderError::Transport(_)));
    assert!(!err.is_fatal());
}
