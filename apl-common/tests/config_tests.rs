//! Configuration resolution and graceful degradation
//!
//! Uses serial_test: tests that touch APL_CONFIG or the working directory
//! are marked #[serial] so they do not race.

use apl_common::config::{load_config, resolve_config_path, TomlConfig, CONFIG_ENV_VAR};
use apl_common::merge::{MergePolicy, OrphanPolicy};
use apl_common::store::StoreKind;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_arg() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "env.toml", "[merge]\npolicy = \"skip\"\n");

    env::set_var(CONFIG_ENV_VAR, &path);
    let resolved = resolve_config_path(None);
    let config = load_config(None).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(path));
    assert_eq!(config.merge.policy, MergePolicy::Skip);
}

#[test]
#[serial]
fn test_cli_arg_beats_env_var() {
    let dir = TempDir::new().unwrap();
    let env_path = write_config(&dir, "env.toml", "[merge]\npolicy = \"skip\"\n");
    let cli_path = write_config(&dir, "cli.toml", "[merge]\npolicy = \"replace\"\n");

    env::set_var(CONFIG_ENV_VAR, &env_path);
    let config = load_config(Some(&cli_path)).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.merge.policy, MergePolicy::Replace);
}

#[test]
#[serial]
fn test_missing_file_degrades_to_defaults() {
    env::set_var(CONFIG_ENV_VAR, "/nonexistent/apl-config.toml");
    let config = load_config(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.unwrap(), TomlConfig::default());
}

#[test]
#[serial]
fn test_malformed_file_is_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "broken.toml", "[store\npath = ");

    let err = load_config(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
#[serial]
fn test_working_directory_config_found() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "apl.toml", "[store]\npath = \"list.csv\"\n");

    let previous = env::current_dir().unwrap();
    env::remove_var(CONFIG_ENV_VAR);
    env::set_current_dir(dir.path()).unwrap();
    let config = load_config(None);
    env::set_current_dir(previous).unwrap();

    let config = config.unwrap();
    assert_eq!(config.store.path, Path::new("list.csv"));
    assert_eq!(config.store.resolved_kind(), StoreKind::Csv);
}

#[test]
fn test_full_config_builds_engine_settings() {
    let config = TomlConfig::from_toml_str(
        r#"
        [store]
        kind = "json"
        path = "papers.json"

        [merge]
        policy = "mark"
        conflict_marker_token = "<<dup>>"
        default_contributor = "curator"
        orphan_shadows = "fail"

        [[categories]]
        unique_name = "vision"
        display_name = "Vision"
        order = 0
        "#,
    )
    .unwrap();

    let resolver = config.identity_resolver();
    assert_eq!(resolver.conflict_marker_token(), "<<dup>>");

    let options = config.merge_options();
    assert_eq!(options.default_contributor, "curator");
    assert_eq!(options.orphan_policy, OrphanPolicy::Fail);

    let registry = config.schema_registry().unwrap();
    assert_eq!(registry.active_categories().len(), 1);
}
