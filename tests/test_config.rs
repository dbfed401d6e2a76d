/// Environment-driven configuration. These tests mutate process-wide env
/// vars, so they are serialized.
use lodestone::config::{IndexStorage, SearchConfig};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn scrub_env() {
    for var in [
        "LODESTONE_INDEX_MODE",
        "LODESTONE_INDEX_PATH",
        "LODESTONE_REINDEX_BATCH",
        "LODESTONE_MAX_CLAUSES",
        "LODESTONE_WRITER_BUFFER_BYTES",
    ] {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_unset_environment_falls_back_to_defaults() {
    scrub_env();

    let config = SearchConfig::from_env();

    assert_eq!(config.storage.root(), Some(Path::new("./index")));
    assert!(config.storage.is_enabled());
    assert_eq!(config.reindex_batch_size, 200);
    assert_eq!(config.max_clause_count, 500);
}

#[test]
#[serial]
fn test_disabled_mode_turns_storage_off() {
    scrub_env();
    env::set_var("LODESTONE_INDEX_MODE", "disabled");

    let config = SearchConfig::from_env();

    assert_eq!(config.storage, IndexStorage::Disabled);
    assert!(!config.storage.is_enabled());
    assert!(config.storage.root().is_none());
}

#[test]
#[serial]
fn test_custom_mode_uses_the_exact_path() {
    scrub_env();
    env::set_var("LODESTONE_INDEX_MODE", "custom");
    env::set_var("LODESTONE_INDEX_PATH", "/srv/lodestone/assets");

    let config = SearchConfig::from_env();

    assert_eq!(
        config.storage,
        IndexStorage::Custom {
            path: PathBuf::from("/srv/lodestone/assets"),
        }
    );
}

#[test]
#[serial]
fn test_unrecognized_mode_is_treated_as_default() {
    scrub_env();
    env::set_var("LODESTONE_INDEX_MODE", "s3");
    env::set_var("LODESTONE_INDEX_PATH", "/data/idx");

    let config = SearchConfig::from_env();

    assert_eq!(
        config.storage,
        IndexStorage::Default {
            root: PathBuf::from("/data/idx"),
        }
    );
}

#[test]
#[serial]
fn test_numeric_overrides_apply() {
    scrub_env();
    env::set_var("LODESTONE_REINDEX_BATCH", "64");
    env::set_var("LODESTONE_MAX_CLAUSES", "100");
    env::set_var("LODESTONE_WRITER_BUFFER_BYTES", "5000000");

    let config = SearchConfig::from_env();

    assert_eq!(config.reindex_batch_size, 64);
    assert_eq!(config.max_clause_count, 100);
    assert_eq!(config.writer_buffer_bytes, 5_000_000);
}

#[test]
#[serial]
fn test_unparseable_numbers_fall_back_to_defaults() {
    scrub_env();
    env::set_var("LODESTONE_REINDEX_BATCH", "many");

    let config = SearchConfig::from_env();

    assert_eq!(config.reindex_batch_size, 200);
}

#[test]
#[serial]
fn test_save_then_load_round_trips_through_a_file() {
    scrub_env();
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("search.json");

    let config = SearchConfig {
        storage: IndexStorage::Custom {
            path: tmp.path().join("index"),
        },
        reindex_batch_size: 32,
        ..SearchConfig::default()
    };
    config.save(&path).unwrap();

    let loaded = SearchConfig::load(&path).unwrap();
    assert_eq!(loaded.storage, config.storage);
    assert_eq!(loaded.reindex_batch_size, 32);
    assert_eq!(loaded.max_query_depth, config.max_query_depth);
}

#[test]
#[serial]
fn test_loading_a_missing_file_is_an_error() {
    scrub_env();
    let tmp = TempDir::new().unwrap();

    let result = SearchConfig::load(tmp.path().join("absent.json"));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_malformed_file_reports_a_config_error() {
    scrub_env();
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("search.json");
    std::fs::write(&path, "{ \"storage\": 12 }").unwrap();

    let err = SearchConfig::load(&path).unwrap_err();
    assert!(matches!(err, lodestone::error::LodestoneError::Config(_)));
}
