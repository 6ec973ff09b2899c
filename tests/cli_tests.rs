/// End-to-end tests of the binary's configuration failures (no network involved)
use std::process::Command;
use tempfile::TempDir;

fn log_query(dir: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_log-query"));
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("LOG_QUERY_METRICS_PORT")
        .env("AZURE_CLIENT_ID", "client-1")
        .env("AZURE_CLIENT_SECRET", "secret-1")
        .env("AZURE_TENANT_ID", "tenant-1")
        .env("LOG_QUERY_WORKSPACE_ID", "ws-1")
        // Any sign-in attempt would fail fast against a closed port
        .env("LOG_QUERY_AUTHORITY_HOST", "http://127.0.0.1:9");
    cmd
}

#[test]
fn test_invalid_timespan_aborts_before_network() {
    let dir = TempDir::new().unwrap();
    let output = log_query(&dir)
        .args(["--timespan", "banana"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid timespan"), "{}", stderr);
    assert!(stderr.contains("banana"), "{}", stderr);
    assert!(!stderr.contains("Requesting access token"), "{}", stderr);
    assert!(output.stdout.is_empty());
    assert!(!dir.path().join("logs.json").exists());
}

#[test]
fn test_missing_identity_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let output = log_query(&dir)
        .env_remove("AZURE_CLIENT_SECRET")
        .env_remove("AZURE_TENANT_ID")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("missing required identity settings: AZURE_CLIENT_SECRET, AZURE_TENANT_ID"),
        "{}",
        stderr
    );
    assert!(!dir.path().join("logs.json").exists());
}

#[test]
fn test_unreachable_identity_service_is_credential_error() {
    let dir = TempDir::new().unwrap();
    let output = log_query(&dir).args(["--timespan", "5m"]).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Credential error"), "{}", stderr);
    // The authority host override from the environment was honored
    assert!(stderr.contains("127.0.0.1:9"), "{}", stderr);
    assert!(!dir.path().join("logs.json").exists());
}
