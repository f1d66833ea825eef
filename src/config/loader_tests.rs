//! Tests for configuration file loading.

use super::*;
use serial_test::serial;
use std::env;
use std::fs;

fn write_temp_config(name: &str, contents: &str) -> PathBuf {
    let path = env::temp_dir().join(name);
    fs::write(&path, contents).expect("Failed to write test config");
    path
}

// ===== Paths =====

#[test]
fn default_config_path_contains_logscope_config_toml() {
    let Some(path) = default_config_path() else {
        return;
    };
    let path_str = path.to_string_lossy();
    assert!(
        path_str.contains("logscope") && path_str.ends_with("config.toml"),
        "Path should contain 'logscope' and end with 'config.toml', got: {}",
        path_str
    );
}

#[test]
fn load_config_file_returns_ok_none_for_missing_file() {
    let result = load_config_file("/nonexistent/path/to/config.toml");
    assert_eq!(
        result,
        Ok(None),
        "Missing config file should return Ok(None), not an error"
    );
}

// ===== Parsing =====

#[test]
fn load_config_file_parses_valid_toml() {
    let config_path = write_temp_config(
        "logscope_test_config.toml",
        r#"
view_size = 42.5
initial_position = "streams_end"
highlight_cache_capacity = 64
center_on_bookmark = false
position_search_iterations = 20
log_file_path = "/tmp/logscope-test.log"
"#,
    );

    let config = load_config_file(&config_path)
        .expect("Should successfully parse valid TOML")
        .expect("Should return Some(ConfigFile) for existing file");

    assert_eq!(config.view_size, Some(42.5));
    assert_eq!(config.initial_position, Some(InitialBufferPosition::StreamsEnd));
    assert_eq!(config.highlight_cache_capacity, Some(64));
    assert_eq!(config.center_on_bookmark, Some(false));
    assert_eq!(config.position_search_iterations, Some(20));
    assert_eq!(config.log_file_path, Some(PathBuf::from("/tmp/logscope-test.log")));

    fs::remove_file(config_path).ok();
}

#[test]
fn load_config_file_returns_error_for_invalid_toml() {
    let config_path = write_temp_config("logscope_test_invalid.toml", "this is not valid TOML ][}{");

    let result = load_config_file(&config_path);
    match result {
        Err(ConfigError::ParseError { path, reason: _ }) => {
            assert_eq!(path, config_path);
        }
        _ => panic!("Expected ParseError, got {:?}", result),
    }

    fs::remove_file(config_path).ok();
}

#[test]
fn load_config_file_rejects_unknown_fields() {
    let config_path = write_temp_config("logscope_test_unknown.toml", "theme = \"dark\"\n");

    let result = load_config_file(&config_path);
    assert!(
        matches!(result, Err(ConfigError::ParseError { .. })),
        "Unknown keys should be rejected, got {:?}",
        result
    );

    fs::remove_file(config_path).ok();
}

#[test]
fn load_config_file_rejects_unknown_initial_position() {
    let config_path =
        write_temp_config("logscope_test_bad_position.toml", "initial_position = \"middle\"\n");

    let result = load_config_file(&config_path);
    assert!(matches!(result, Err(ConfigError::ParseError { .. })));

    fs::remove_file(config_path).ok();
}

#[test]
fn load_config_file_handles_partial_config() {
    let config_path = write_temp_config(
        "logscope_test_partial.toml",
        r#"
view_size = 12
# Other fields omitted
"#,
    );

    let config = load_config_file(&config_path).unwrap().unwrap();
    assert_eq!(config.view_size, Some(12.0));
    assert_eq!(config.initial_position, None);

    fs::remove_file(config_path).ok();
}

// ===== Merging =====

#[test]
fn merge_config_uses_defaults_when_none() {
    let resolved = merge_config(None).unwrap();
    assert_eq!(resolved, ResolvedConfig::default());
    assert_eq!(resolved.view_size, DEFAULT_VIEW_SIZE);
    assert_eq!(resolved.initial_position, InitialBufferPosition::StreamsBegin);
    assert_eq!(resolved.highlight_cache_capacity, 1000);
    assert!(resolved.center_on_bookmark);
    assert_eq!(resolved.position_search_iterations, 64);
}

#[test]
fn merge_config_overrides_with_config_file_values() {
    let config_file = ConfigFile {
        view_size: Some(8.0),
        initial_position: Some(InitialBufferPosition::Nowhere),
        highlight_cache_capacity: Some(10),
        center_on_bookmark: Some(false),
        position_search_iterations: Some(5),
        log_file_path: None,
    };

    let resolved = merge_config(Some(config_file)).unwrap();
    assert_eq!(resolved.view_size, 8.0);
    assert_eq!(resolved.initial_position, InitialBufferPosition::Nowhere);
    assert_eq!(resolved.highlight_cache_capacity, 10);
    assert!(!resolved.center_on_bookmark);
    assert_eq!(resolved.position_search_iterations, 5);
    assert_eq!(resolved.log_file_path, default_log_path());
}

#[test]
fn merge_config_rejects_non_positive_view_size() {
    for bad in [0.0, -3.0, f64::INFINITY, f64::NAN] {
        let config_file = ConfigFile {
            view_size: Some(bad),
            ..ConfigFile::default()
        };
        let result = merge_config(Some(config_file));
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { field: "view_size", .. })),
            "view_size {} should be rejected",
            bad
        );
    }
}

#[test]
fn merge_config_rejects_zero_search_iterations() {
    let config_file = ConfigFile {
        position_search_iterations: Some(0),
        ..ConfigFile::default()
    };
    assert!(matches!(
        merge_config(Some(config_file)),
        Err(ConfigError::InvalidValue {
            field: "position_search_iterations",
            ..
        })
    ));
}

// ===== Environment =====

#[test]
#[serial(logscope_env)]
fn precedence_explicit_path_beats_env_var() {
    let explicit = write_temp_config("logscope_test_explicit.toml", "view_size = 3\n");
    let from_env = write_temp_config("logscope_test_env.toml", "view_size = 4\n");
    env::set_var(CONFIG_PATH_ENV, &from_env);

    let config = load_config_with_precedence(Some(explicit.clone())).unwrap().unwrap();
    assert_eq!(config.view_size, Some(3.0));

    env::remove_var(CONFIG_PATH_ENV);
    fs::remove_file(explicit).ok();
    fs::remove_file(from_env).ok();
}

#[test]
#[serial(logscope_env)]
fn precedence_env_var_is_used_without_explicit_path() {
    let from_env = write_temp_config("logscope_test_env_only.toml", "view_size = 4\n");
    env::set_var(CONFIG_PATH_ENV, &from_env);

    let config = load_config_with_precedence(None).unwrap().unwrap();
    assert_eq!(config.view_size, Some(4.0));

    env::remove_var(CONFIG_PATH_ENV);
    fs::remove_file(from_env).ok();
}

#[test]
#[serial(logscope_env)]
fn empty_env_path_is_invalid() {
    env::set_var(CONFIG_PATH_ENV, "  ");
    let result = load_config_with_precedence(None);
    env::remove_var(CONFIG_PATH_ENV);
    assert!(matches!(result, Err(ConfigError::InvalidPath(_))));
}

#[test]
#[serial(logscope_env)]
fn env_override_sets_initial_position() {
    env::set_var(INITIAL_POSITION_ENV, "end");
    let config = apply_env_overrides(ResolvedConfig::default());
    env::remove_var(INITIAL_POSITION_ENV);

    assert_eq!(config.unwrap().initial_position, InitialBufferPosition::StreamsEnd);
}

#[test]
#[serial(logscope_env)]
fn env_override_rejects_unknown_position() {
    env::set_var(INITIAL_POSITION_ENV, "sideways");
    let config = apply_env_overrides(ResolvedConfig::default());
    env::remove_var(INITIAL_POSITION_ENV);

    assert!(matches!(
        config,
        Err(ConfigError::InvalidValue {
            field: "initial_position",
            ..
        })
    ));
}

#[test]
#[serial(logscope_env)]
fn load_config_chains_file_and_env() {
    let path = write_temp_config(
        "logscope_test_chain.toml",
        "view_size = 9\ninitial_position = \"streams_begin\"\n",
    );
    env::set_var(INITIAL_POSITION_ENV, "nowhere");

    let config = load_config(Some(path.clone()));
    env::remove_var(INITIAL_POSITION_ENV);
    fs::remove_file(path).ok();

    let config = config.unwrap();
    assert_eq!(config.view_size, 9.0);
    assert_eq!(config.initial_position, InitialBufferPosition::Nowhere);
}
