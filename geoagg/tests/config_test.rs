//! Tests for config module

mod common;

use geoagg::config::{BackendKind, Config};
use geoagg::engine::MemoryBackend;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

#[test]
fn test_load_or_create_writes_defaults() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("conf").join("geoagg.toml");

    let config = Config::load_or_create(&path).unwrap();
    assert_eq!(config.server.bind_addr, "127.0.0.1:9999");
    assert!(path.exists());

    let reloaded = Config::load(&path).unwrap();
    assert_eq!(reloaded.backend.timeout_ms, 30_000);
    assert_eq!(reloaded.logging.format, "pretty");
}

#[test]
fn test_load_or_create_reports_unusable_directory() {
    let blocker = NamedTempFile::new().unwrap();
    let path = blocker.path().join("geoagg.toml");

    let err = Config::load_or_create(&path).unwrap_err();
    assert!(err.to_string().contains("Cannot create"), "{}", err);
}

#[test]
fn test_save_and_load() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("geoagg.toml");

    let mut config = Config::default();
    config.server.bind_addr = "0.0.0.0:8000".to_string();
    config.backend.kind = BackendKind::Memory;
    config.backend.memory_data = Some(temp.path().join("data.jsonl"));
    config.observability.metrics_addr = Some("127.0.0.1:9100".to_string());
    config.collections.push(common::collection());
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.server.bind_addr, "0.0.0.0:8000");
    assert_eq!(loaded.backend.kind, BackendKind::Memory);
    assert_eq!(loaded.backend.memory_data, config.backend.memory_data);
    assert_eq!(loaded.observability.metrics_addr.as_deref(), Some("127.0.0.1:9100"));
    assert_eq!(loaded.collections, vec![common::collection()]);
}

#[test]
fn test_load_rejects_bad_files() {
    let temp = tempdir().unwrap();
    assert!(Config::load(&temp.path().join("missing.toml")).is_err());

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[backend]\ntimeout_ms = \"soon\"").unwrap();
    assert!(Config::load(file.path()).is_err());

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[backend]\ntimeout_ms = 0").unwrap();
    assert!(Config::load(file.path()).is_err());
}

#[test]
fn test_memory_data_file() {
    let mut file = NamedTempFile::new().unwrap();
    for doc in common::dataset() {
        writeln!(file, "{}", doc).unwrap();
    }
    writeln!(file).unwrap();

    let docs = MemoryBackend::read_jsonl(file.path()).unwrap();
    assert_eq!(docs.len(), 595);

    let backend = MemoryBackend::new();
    backend.insert(common::INDEX, docs);
    assert_eq!(backend.doc_count(common::INDEX), 595);
}
