//! Layered configuration loading: defaults, project file, local overrides,
//! and environment.

use std::fs;
use std::path::Path;

use kypria::infrastructure::config::{ConfigLoader, CONFIG_DIR};
use tempfile::TempDir;

fn write(root: &Path, file: &str, contents: &str) {
    let dir = root.join(CONFIG_DIR);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file), contents).unwrap();
}

const NO_ENV: [(&str, Option<&str>); 3] = [
    ("KYPRIA_CYCLE__INTERVAL_MS", None),
    ("KYPRIA_RITUALS__MAX_CONCURRENT", None),
    ("KYPRIA_CYCLE__CONVERGENCE_THRESHOLD", None),
];

#[test]
fn test_defaults_without_files() {
    let root = TempDir::new().unwrap();
    temp_env::with_vars(NO_ENV, || {
        let config = ConfigLoader::load_in(root.path()).unwrap();
        assert_eq!(config.cycle.interval_ms, 5000);
        assert_eq!(config.rituals.max_concurrent, 5);
        assert_eq!(config.echoes.capacity, 10);
        assert!(config.components.is_empty());
    });
}

#[test]
fn test_local_overrides_project_file() {
    let root = TempDir::new().unwrap();
    write(
        root.path(),
        "config.yaml",
        r#"
cycle:
  interval_ms: 2000
  convergence_threshold: 0.9
components:
  - name: warden
    kind: guard
    initial_alignment: 0.7
  - name: codex
    kind: chronicler
"#,
    );
    write(root.path(), "local.yaml", "cycle:\n  interval_ms: 250\n");

    temp_env::with_vars(NO_ENV, || {
        let config = ConfigLoader::load_in(root.path()).unwrap();
        assert_eq!(config.cycle.interval_ms, 250);
        assert!((config.cycle.convergence_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.components.len(), 2);
        assert!((config.components[1].initial_alignment - 0.5).abs() < f64::EPSILON);
    });
}

#[test]
fn test_environment_wins() {
    let root = TempDir::new().unwrap();
    write(root.path(), "config.yaml", "cycle:\n  interval_ms: 2000\n");
    write(root.path(), "local.yaml", "rituals:\n  max_concurrent: 2\n");

    temp_env::with_vars(
        [
            ("KYPRIA_CYCLE__INTERVAL_MS", Some("750")),
            ("KYPRIA_RITUALS__MAX_CONCURRENT", Some("9")),
            ("KYPRIA_CYCLE__CONVERGENCE_THRESHOLD", None),
        ],
        || {
            let config = ConfigLoader::load_in(root.path()).unwrap();
            assert_eq!(config.cycle.interval_ms, 750);
            assert_eq!(config.rituals.max_concurrent, 9);
        },
    );
}

#[test]
fn test_invalid_threshold_from_environment_is_rejected() {
    let root = TempDir::new().unwrap();
    temp_env::with_vars(
        [
            ("KYPRIA_CYCLE__INTERVAL_MS", None),
            ("KYPRIA_RITUALS__MAX_CONCURRENT", None),
            ("KYPRIA_CYCLE__CONVERGENCE_THRESHOLD", Some("1.5")),
        ],
        || {
            let err = ConfigLoader::load_in(root.path()).unwrap_err();
            assert!(err.to_string().contains("convergence threshold"));
        },
    );
}

#[test]
fn test_duplicate_components_rejected() {
    let root = TempDir::new().unwrap();
    write(
        root.path(),
        "config.yaml",
        "components:\n  - name: warden\n    kind: guard\n  - name: warden\n    kind: bot\n",
    );

    temp_env::with_vars(NO_ENV, || {
        let err = ConfigLoader::load_in(root.path()).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    });
}

#[test]
fn test_explicit_file() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("kypria.yaml");
    fs::write(&path, "echoes:\n  capacity: 3\n").unwrap();

    temp_env::with_vars(NO_ENV, || {
        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.echoes.capacity, 3);

        let missing = ConfigLoader::load_from_file(root.path().join("absent.yaml")).unwrap_err();
        assert!(missing.to_string().contains("not found"));
    });
}
