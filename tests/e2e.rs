mod common;

use std::io::Write;
use std::process::Command;

use common::MockHost;
use tempfile::NamedTempFile;

fn write_config(port: u16) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "host = \"127.0.0.1\"\nport = {port}\nmin_connections = 1\nmax_connections = 2\n\
         retry_delay_ms = 10\nshutdown_grace_ms = 500\n"
    )
    .unwrap();
    file
}

fn run(fixture: &str, config: &NamedTempFile) -> (String, String, bool) {
    let path = format!("tests/fixtures/{fixture}");
    let output = Command::new(env!("CARGO_BIN_EXE_iso-gateway"))
        .arg(&path)
        .arg(config.path())
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// `(type, response_code, status)` per output row.
fn columns(stdout: &str) -> Vec<(String, String, String)> {
    let mut reader = csv::Reader::from_reader(stdout.as_bytes());
    reader
        .records()
        .map(|record| {
            let record = record.unwrap();
            (
                record[0].to_string(),
                record[7].to_string(),
                record[10].to_string(),
            )
        })
        .collect()
}

#[test]
fn valid_requests() {
    let host = MockHost::answering("00");
    let config = write_config(host.port());
    let (stdout, stderr, success) = run("valid.csv", &config);

    assert!(success, "{stderr}");
    assert!(stderr.is_empty(), "{stderr}");

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines[0],
        "type,card,amount,currency,rrn,stan,auth_code,response_code,response_message,approved,status,processing_time_ms"
    );
    let rows = columns(&stdout);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].0, "DEBIT");
    assert_eq!(rows[1].0, "CREDIT");
    assert_eq!(rows[2].0, "BALANCE");
    assert!(rows.iter().all(|(_, code, status)| code == "00" && status == "SUCCESS"));
    assert!(lines[1].starts_with("DEBIT,411111******1111,100.00,840,"));
    assert_eq!(host.request_count(), 3);
}

#[test]
fn errors_warn_but_do_not_block() {
    let host = MockHost::answering("00");
    let config = write_config(host.port());
    let (stdout, stderr, success) = run("with_errors.csv", &config);

    assert!(success);
    assert!(stderr.contains("unrecognized transaction type"));
    assert!(stderr.contains("invalid amount"));

    let rows = columns(&stdout);
    let codes: Vec<&str> = rows.iter().map(|(_, code, _)| code.as_str()).collect();
    // zero amount fails validation, unknown reversal target is not found
    assert_eq!(codes, ["00", "96", "25"]);
    assert_eq!(host.request_count(), 1);
}

#[test]
fn missing_config_file_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_iso-gateway"))
        .arg("tests/fixtures/valid.csv")
        .arg("tests/fixtures/does-not-exist.toml")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run binary");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load configuration"));
}
