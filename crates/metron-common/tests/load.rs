//! ---
//! metron_section: "04-configuration-logging"
//! metron_subsection: "tests"
//! metron_type: "test"
//! metron_scope: "code"
//! metron_description: "Configuration discovery from candidate paths and the env override."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::fs;

use metron_common::HarnessConfig;

// Both cases live in one test because they share the process environment.
#[test]
fn loads_from_candidates_then_env_override() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let local = dir.path().join("metron.toml");
    fs::write(&local, "[job]\nname = \"from-candidate\"\n").unwrap();

    std::env::remove_var(HarnessConfig::ENV_CONFIG_PATH);
    let loaded = HarnessConfig::load_with_source(&[&missing, &local]).unwrap();
    assert_eq!(loaded.source, local);
    assert_eq!(loaded.config.job.name, "from-candidate");

    let err = HarnessConfig::load(&[&missing]).unwrap_err();
    assert!(err.to_string().contains("no configuration files found"));

    let overridden = dir.path().join("override.toml");
    fs::write(&overridden, "[job]\nname = \"from-env\"\n").unwrap();
    std::env::set_var(HarnessConfig::ENV_CONFIG_PATH, &overridden);
    let loaded = HarnessConfig::load_with_source(&[&local]).unwrap();
    std::env::remove_var(HarnessConfig::ENV_CONFIG_PATH);
    assert_eq!(loaded.source, overridden);
    assert_eq!(loaded.config.job.name, "from-env");
}

#[test]
fn invalid_files_report_their_path() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[job]\nname = \"\"\n").unwrap();
    let err = HarnessConfig::from_path(&broken).unwrap_err();
    assert!(err.to_string().contains("job name must not be empty"));
}
