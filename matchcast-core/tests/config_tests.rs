//! Config loading: defaults, partial files, and parse errors with path context.

use assert_fs::prelude::*;
use matchcast_core::{config, Config, ConfigError};
use predicates::prelude::predicate;
use rstest::rstest;

// ---------------------------------------------------------------------------
// 1. Defaults
// ---------------------------------------------------------------------------

#[test]
fn missing_file_yields_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded, Config::default());
    assert_eq!(loaded.flush_interval_ms, 500);
    assert_eq!(loaded.score_path, "matchData.score");
}

#[test]
fn empty_file_yields_defaults() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".matchcast/config.yaml").write_str("\n").expect("write");
    assert_eq!(config::load_at(home.path()).expect("load"), Config::default());
}

// ---------------------------------------------------------------------------
// 2. Partial overrides
// ---------------------------------------------------------------------------

#[rstest]
#[case("flush_interval_ms: 250\n", 250, "matchData.score")]
#[case("score_path: matchData.summary\n", 500, "matchData.summary")]
#[case(
    "flush_interval_ms: 1000\nscore_path: overlays.score\n",
    1000,
    "overlays.score"
)]
fn partial_file_overrides_only_given_fields(
    #[case] yaml: &str,
    #[case] flush_ms: u64,
    #[case] score_path: &str,
) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".matchcast/config.yaml");
    file.write_str(yaml).expect("write");
    file.assert(predicate::str::contains(":"));

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.flush_interval_ms, flush_ms);
    assert_eq!(loaded.score_path, score_path);
    assert_eq!(loaded.max_line_bytes, Config::default().max_line_bytes);
}

// ---------------------------------------------------------------------------
// 3. Errors
// ---------------------------------------------------------------------------

#[test]
fn malformed_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".matchcast/config.yaml")
        .write_str("flush_interval_ms: [not, a, number\n")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"), "got: {err}");
}

#[test]
fn wrong_type_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".matchcast/config.yaml")
        .write_str("- a list\n- not a mapping\n")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}
