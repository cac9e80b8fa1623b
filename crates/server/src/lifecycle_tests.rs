// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn env_override_wins() {
    let dir = tempfile::TempDir::new().unwrap();
    std::env::set_var("COMPASS_STATE_DIR", dir.path());
    let config = Config::load().unwrap();
    std::env::remove_var("COMPASS_STATE_DIR");

    assert_eq!(config.state_dir, dir.path());
    assert_eq!(config.data_dir, dir.path().join("projects"));
    assert_eq!(config.log_path, dir.path().join("server.log"));
}

#[test]
#[serial]
fn default_paths_live_under_a_state_dir() {
    std::env::remove_var("COMPASS_STATE_DIR");
    let config = Config::load().unwrap();
    assert!(config.state_dir.ends_with("compass"));
    assert!(config.data_dir.starts_with(&config.state_dir));
}

#[tokio::test]
#[serial]
async fn startup_creates_the_data_dir_and_answers() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = Config {
        state_dir: dir.path().to_path_buf(),
        data_dir: dir.path().join("projects"),
        log_path: dir.path().join("server.log"),
    };

    let (router, orchestrator) = startup(&config).unwrap();
    assert!(config.data_dir.is_dir());

    let response = router
        .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"compass.status"}"#)
        .await
        .unwrap();
    assert!(response.contains("\"isHealthy\""));

    orchestrator.shutdown().await;
}
