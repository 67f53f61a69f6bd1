//! CLI integration tests.
//!
//! These tests verify argument parsing, configuration layering and the
//! behavior of the `cmdstream` binary itself.

use std::ffi::OsString;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

use cmdstream::cli::{parse_args_from, Args};
use cmdstream::config::Config;

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("cmdstream")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_full_options() {
    let result = parse_args_from(args(&[
        "-s", "-t", "1500", "-b", "8", "-l", "debug", "sh", "-c", "echo hi",
    ]))
    .unwrap();

    assert!(result.stream);
    assert_eq!(result.timeout_ms, Some(1500));
    assert_eq!(result.buffer, Some(8));
    assert_eq!(result.log_level, Some("debug".to_string()));
    assert_eq!(result.program.as_deref(), Some("sh"));
    assert_eq!(result.args, vec!["-c", "echo hi"]);
}

#[test]
fn test_cli_long_options() {
    let result = parse_args_from(args(&[
        "--stream",
        "--timeout",
        "10",
        "--buffer",
        "2",
        "--config",
        "/tmp/cmdstream.json",
        "true",
    ]))
    .unwrap();

    assert!(result.stream);
    assert_eq!(result.timeout_ms, Some(10));
    assert_eq!(result.buffer, Some(2));
    assert_eq!(
        result.config.unwrap().to_str().unwrap(),
        "/tmp/cmdstream.json"
    );
    assert_eq!(result.program.as_deref(), Some("true"));
}

#[test]
fn test_cli_invalid_buffer() {
    assert!(parse_args_from(args(&["-b", "lots"])).is_err());
    assert!(parse_args_from(args(&["-b", "0"])).is_err());
}

// ============================================================================
// Config Layering Tests
// ============================================================================

#[test]
fn test_config_priority_cli_over_file() {
    let json = r#"{
        "execution": {
            "streaming": false,
            "timeout_ms": 5000,
            "channel_capacity": 4
        },
        "logging": { "level": "error" }
    }"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let mut config = Config::from_file(file.path()).unwrap();
    let args = Args {
        stream: true,
        timeout_ms: Some(100),
        log_level: Some("trace".to_string()),
        ..Args::default()
    };
    config.apply_args(&args);

    assert!(config.execution.streaming);
    assert_eq!(config.timeout(), Some(Duration::from_millis(100)));
    assert_eq!(config.execution.channel_capacity, 4); // From file
    assert_eq!(config.log_filter(), "trace");
}

#[test]
fn test_config_env_between_file_and_cli() {
    let json = r#"{ "execution": { "channel_capacity": 4, "timeout_ms": 5000 } }"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let mut config = Config::from_file(file.path()).unwrap();
    config
        .apply_env_from(|key| match key {
            "CMDSTREAM_CHANNEL_CAPACITY" => Some("16".to_string()),
            "CMDSTREAM_TIMEOUT_MS" => Some("900".to_string()),
            _ => None,
        })
        .unwrap();
    config.apply_args(&Args {
        timeout_ms: Some(50),
        ..Args::default()
    });

    assert_eq!(config.execution.channel_capacity, 16); // Env beats file
    assert_eq!(config.execution.timeout_ms, Some(50)); // CLI beats env
}

#[test]
fn test_config_to_options() {
    let config: Config =
        serde_json::from_str(r#"{ "execution": { "streaming": true, "final_send_grace_ms": 5 } }"#)
            .unwrap();
    let options = config.to_options().unwrap();

    assert!(options.streaming);
    assert_eq!(options.channel_capacity, 1);
    assert_eq!(options.final_send_grace, Duration::from_millis(5));
}

#[test]
fn test_config_roundtrip() {
    let config = Config::default();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: Config = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.execution.channel_capacity, config.execution.channel_capacity);
    assert_eq!(parsed.log_filter(), config.log_filter());
}

// ============================================================================
// Binary Tests
// ============================================================================

#[cfg(unix)]
mod binary {
    use std::process::Command;

    fn cmdstream() -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_cmdstream"));
        command
            .env_remove("RUST_LOG")
            .env_remove("CMDSTREAM_STREAMING")
            .env_remove("CMDSTREAM_TIMEOUT_MS")
            .env_remove("CMDSTREAM_CHANNEL_CAPACITY")
            .env_remove("CMDSTREAM_LOG_LEVEL");
        command
    }

    #[test]
    fn test_binary_relays_output_and_exit_code() {
        let output = cmdstream()
            .args(["sh", "-c", "echo out; echo err >&2; exit 3"])
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "err\n");
    }

    #[test]
    fn test_binary_streaming_preserves_stdout_order() {
        let output = cmdstream()
            .args(["-s", "sh", "-c", "for i in 1 2 3 4 5; do echo $i; done"])
            .output()
            .unwrap();

        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "1\n2\n3\n4\n5\n");
    }

    #[test]
    fn test_binary_timeout_exits_with_failure() {
        let output = cmdstream()
            .args(["-t", "50", "sh", "-c", "sleep 5"])
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(1));
    }

    #[test]
    fn test_binary_missing_program() {
        let output = cmdstream().output().unwrap();
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_binary_version() {
        let output = cmdstream().arg("--version").output().unwrap();
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).starts_with("cmdstream "));
    }
}
