//! ---
//! metron_section: "15-testing-qa-runbook"
//! metron_subsection: "integration-tests"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Repository layout and front matter checks."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..")
}

fn rust_sources(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = fs::read_dir(dir)
        .unwrap_or_else(|err| panic!("failed to list {}: {}", dir.display(), err));
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            rust_sources(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
}

#[test]
fn sources_carry_front_matter() {
    let root = workspace_root();
    let mut files = Vec::new();
    for dir in ["crates", "bin"] {
        rust_sources(&root.join(dir), &mut files);
    }
    assert!(!files.is_empty());
    for file in files {
        let content = fs::read_to_string(&file).unwrap();
        assert!(
            content.starts_with("//! ---\n//! metron_section:"),
            "{} must include frontmatter header",
            file.display()
        );
    }
}

#[test]
fn library_crates_warn_on_missing_docs() {
    let root = workspace_root();
    for krate in ["metron-core", "metron-sinks", "metron-metrics", "metron-sources"] {
        let lib = root.join("crates").join(krate).join("src/lib.rs");
        let content = fs::read_to_string(&lib).unwrap();
        assert!(
            content.contains("#![warn(missing_docs)]"),
            "{} must warn on missing docs",
            lib.display()
        );
    }
}

#[test]
fn manifests_carry_front_matter() {
    let root = workspace_root();
    let mut manifests = vec![root.join("Cargo.toml"), root.join("tests/Cargo.toml")];
    for dir in ["crates", "bin"] {
        for entry in fs::read_dir(root.join(dir)).unwrap() {
            let manifest = entry.unwrap().path().join("Cargo.toml");
            if manifest.exists() {
                manifests.push(manifest);
            }
        }
    }
    for manifest in manifests {
        let content = fs::read_to_string(&manifest).unwrap();
        assert!(
            content.starts_with("# ---"),
            "{} must include frontmatter header",
            manifest.display()
        );
    }
}

#[test]
fn sample_config_parses() {
    let path = workspace_root().join("configs/metron.toml");
    let config = metron_common::HarnessConfig::from_path(&path)
        .unwrap_or_else(|err| panic!("failed to load {}: {:#}", path.display(), err));
    assert_eq!(config.job.name, "sample-batch");
    assert!(config.console.enabled && config.log_sink.enabled);
    assert!(!config.prometheus.enabled);
}
