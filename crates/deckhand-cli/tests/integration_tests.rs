//! Integration tests for CLI commands

use std::process::Command;

/// Helper to run deckhand command
fn deckhand(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_deckhand"))
        .args(args)
        .env_remove("DECKHAND_NAMESPACE")
        .env_remove("DECKHAND_LOG")
        .output()
        .expect("Failed to execute deckhand")
}

/// Get the fixtures path
fn fixtures_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures")
}

fn fixture(name: &str) -> String {
    format!("{}/{}", fixtures_path(), name)
}

mod validate_command {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        let output = deckhand(&["validate", &fixture("deckhand.yaml")]);

        assert!(output.status.success(), "Expected success for valid config");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Validation passed"));
        assert!(stdout.contains("api"));
        assert!(stdout.contains("worker"));
    }

    #[test]
    fn test_validate_invalid_config() {
        let output = deckhand(&["validate", &fixture("invalid.yaml")]);

        assert_eq!(output.status.code(), Some(2));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("redsi"));
        assert!(stdout.contains("did you mean 'redis'?"));
        assert!(stdout.contains("db-secret.password"));
    }

    #[test]
    fn test_validate_json_output() {
        let output = deckhand(&["validate", &fixture("deckhand.yaml"), "--json"]);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json: serde_json::Value =
            serde_json::from_str(&stdout).expect("Output should be valid JSON");

        assert_eq!(json["valid"], true);
        assert_eq!(json["namespace"], "shop");
        assert_eq!(json["workloads"], serde_json::json!(["api", "worker"]));
    }

    #[test]
    fn test_validate_json_output_with_errors() {
        let output = deckhand(&["validate", &fixture("invalid.yaml"), "--json"]);

        assert_eq!(output.status.code(), Some(2));
        let stdout = String::from_utf8_lossy(&output.stdout);
        let json: serde_json::Value =
            serde_json::from_str(&stdout).expect("Output should be valid JSON");

        assert_eq!(json["valid"], false);
        let codes: Vec<&str> = json["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["dangling_reference", "dangling_reference"]);
    }

    #[test]
    fn test_validate_set_override() {
        let output = deckhand(&[
            "validate",
            &fixture("deckhand.yaml"),
            "--set",
            "workloads.api.replicas=-1",
        ]);

        assert_eq!(output.status.code(), Some(2));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("replicas cannot be negative"));
    }

    #[test]
    fn test_validate_missing_file() {
        let output = deckhand(&["validate", &fixture("does-not-exist.yaml")]);
        assert_eq!(output.status.code(), Some(5));
    }

    #[test]
    fn test_validate_unknown_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.yaml");
        std::fs::write(
            &path,
            "apiVersion: deckhand/v1\nworkloads:\n  test:\n    image: x\n    replica: 2\n",
        )
        .unwrap();

        let output = deckhand(&["validate", path.to_str().unwrap()]);
        assert_eq!(output.status.code(), Some(4));
    }
}

mod template_command {
    use super::*;

    #[test]
    fn test_template_all_workloads() {
        let output = deckhand(&[
            "template",
            &fixture("deckhand.yaml"),
            "--secrets",
            &fixture("secrets.yaml"),
        ]);

        assert!(
            output.status.success(),
            "{}",
            String::from_utf8_lossy(&output.stderr)
        );
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("# Source: api-deployment.yaml"));
        assert!(stdout.contains("# Source: api-hpa.yaml"));
        assert!(stdout.contains("# Source: api-ingress.yaml"));
        assert!(stdout.contains("# Source: worker-networkpolicy.yaml"));
        assert!(stdout.contains("deckhand.io/secret-checksum"));
        assert!(stdout.contains("namespace: shop"));
    }

    #[test]
    fn test_template_single_workload() {
        let output = deckhand(&["template", &fixture("deckhand.yaml"), "--workload", "worker"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("worker-deployment.yaml"));
        assert!(!stdout.contains("api-deployment.yaml"));
        assert!(stdout.contains("wait-for-deps"));
    }

    #[test]
    fn test_template_is_deterministic() {
        let config = fixture("deckhand.yaml");
        let secrets = fixture("secrets.yaml");
        let args = ["template", config.as_str(), "--secrets", secrets.as_str()];
        let first = deckhand(&args);
        let second = deckhand(&args);
        assert_eq!(first.stdout, second.stdout);
    }

    #[test]
    fn test_template_without_secret_content() {
        let output = deckhand(&["template", &fixture("deckhand.yaml"), "--workload", "api"]);

        assert_eq!(output.status.code(), Some(3));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("db-secret"));
    }

    #[test]
    fn test_template_unknown_workload() {
        let output = deckhand(&["template", &fixture("deckhand.yaml"), "--workload", "wroker"]);

        assert_eq!(output.status.code(), Some(3));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("did you mean 'worker'?"));
    }

    #[test]
    fn test_template_upgrade_omits_replicas() {
        let install = deckhand(&[
            "template",
            &fixture("deckhand.yaml"),
            "--workload",
            "api",
            "--secrets",
            &fixture("secrets.yaml"),
        ]);
        let upgrade = deckhand(&[
            "template",
            &fixture("deckhand.yaml"),
            "--workload",
            "api",
            "--secrets",
            &fixture("secrets.yaml"),
            "--upgrade",
        ]);

        let install = String::from_utf8_lossy(&install.stdout);
        let upgrade = String::from_utf8_lossy(&upgrade.stdout);
        assert!(install.contains("replicas: 2"));
        assert!(!upgrade.contains("  replicas: 2"));
        assert!(upgrade.contains("minReplicas: 2"));
    }

    #[test]
    fn test_template_namespace_override() {
        let output = deckhand(&[
            "template",
            &fixture("deckhand.yaml"),
            "--workload",
            "worker",
            "-n",
            "staging",
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("namespace: staging"));
        assert!(!stdout.contains("namespace: shop"));
    }

    #[test]
    fn test_template_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = deckhand(&[
            "template",
            &fixture("deckhand.yaml"),
            "--secrets",
            &fixture("secrets.yaml"),
            "--output-dir",
            dir.path().to_str().unwrap(),
        ]);

        assert!(output.status.success());
        for name in [
            "api-serviceaccount.yaml",
            "api-service.yaml",
            "api-deployment.yaml",
            "api-pdb.yaml",
            "api-hpa.yaml",
            "api-ingress.yaml",
            "api-networkpolicy.yaml",
            "worker-deployment.yaml",
        ] {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }
        assert!(!dir.path().join("worker-ingress.yaml").exists());
    }
}

mod fingerprint_command {
    use super::*;

    fn fingerprint(secrets: &str) -> std::process::Output {
        deckhand(&[
            "fingerprint",
            &fixture("deckhand.yaml"),
            "--workload",
            "api",
            "--secrets",
            secrets,
        ])
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let original = fingerprint(&fixture("secrets.yaml"));
        assert!(original.status.success());
        let original = String::from_utf8_lossy(&original.stdout).trim().to_string();
        assert_eq!(original.len(), 64);
        assert!(original.chars().all(|c| c.is_ascii_hexdigit()));

        let dir = tempfile::tempdir().unwrap();
        let rotated = dir.path().join("secrets.yaml");
        std::fs::write(&rotated, "db-secret:\n  user: shop\n  pass: newpass\n").unwrap();

        let changed = fingerprint(rotated.to_str().unwrap());
        let changed = String::from_utf8_lossy(&changed.stdout).trim().to_string();
        assert_ne!(original, changed);
    }

    #[test]
    fn test_fingerprint_matches_rendered_annotation() {
        let digest = fingerprint(&fixture("secrets.yaml"));
        let digest = String::from_utf8_lossy(&digest.stdout).trim().to_string();

        let rendered = deckhand(&[
            "template",
            &fixture("deckhand.yaml"),
            "--workload",
            "api",
            "--secrets",
            &fixture("secrets.yaml"),
        ]);
        let rendered = String::from_utf8_lossy(&rendered.stdout);
        assert!(rendered.contains(&format!("deckhand.io/secret-checksum: {}", digest)));
    }
}

mod diff_command {
    use super::*;

    #[test]
    fn test_diff_rendered_streams() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.yaml");
        let new = dir.path().join("new.yaml");

        let config = fixture("deckhand.yaml");
        let render = |extra: &[&str]| {
            let mut args = vec!["template", config.as_str(), "--workload", "worker"];
            args.extend_from_slice(extra);
            deckhand(&args).stdout
        };
        std::fs::write(&old, render(&[])).unwrap();
        std::fs::write(&new, render(&["--set", "workloads.worker.replicas=3"])).unwrap();

        let output = deckhand(&["diff", old.to_str().unwrap(), new.to_str().unwrap()]);
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("Deployment/worker"));
        assert!(stdout.contains("+  replicas: 3"));
        assert!(stdout.contains("1 modified"));
        assert!(!stdout.contains("NetworkPolicy/worker"));
    }
}

mod usage {
    use super::*;

    #[test]
    fn test_unknown_subcommand() {
        let output = deckhand(&["install"]);
        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_apply_secret_sources_conflict() {
        let output = deckhand(&[
            "apply",
            &fixture("deckhand.yaml"),
            "--secrets",
            &fixture("secrets.yaml"),
            "--cluster-secrets",
        ]);
        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_help() {
        let output = deckhand(&["--help"]);
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("template"));
        assert!(stdout.contains("apply"));
    }
}
