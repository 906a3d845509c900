//! Dependency readiness gate
//!
//! Required dependencies are polled from an init container before the
//! workload's own containers start. The poll loop is a small POSIX shell
//! script rendered with MiniJinja.

use deckhand_core::{DependencyRef, GateSettings, ReadinessCheck};
use k8s_openapi::api::core::v1::{Container, SecurityContext};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::error::Result;

/// Name of the rendered init container
pub const GATE_CONTAINER_NAME: &str = "wait-for-deps";

const SCRIPT_NAME: &str = "wait-for-deps.sh";

const SCRIPT_TEMPLATE: &str = r#"set -eu
{%- for step in steps %}
attempt=0
until {% if step.http_path is not none %}wget -q --spider -T {{ timeout }} "http://{{ step.host }}:{{ step.port }}{{ step.http_path }}"{% else %}nc -z -w {{ timeout }} {{ step.host }} {{ step.port }}{% endif %}; do
  attempt=$((attempt + 1))
  if [ "$attempt" -ge {{ max_attempts }} ]; then
    echo "{{ step.host }}:{{ step.port }} not ready after {{ max_attempts }} attempts" >&2
    exit 1
  fi
  echo "waiting for {{ step.host }}:{{ step.port }} ($attempt/{{ max_attempts }})"
  sleep {{ interval }}
done
echo "{{ step.host }}:{{ step.port }} is ready"
{%- endfor %}
"#;

/// One blocking check in the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateStep {
    pub host: String,
    pub port: u16,
    /// Set for HTTP checks
    pub http_path: Option<String>,
}

/// The full pre-start check of a workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreStartCheck {
    pub steps: Vec<GateStep>,
    pub settings: GateSettings,
}

/// Build the gate for a workload's dependencies.
///
/// Only required dependencies with a check method are included.
pub fn gate(deps: &[DependencyRef], settings: &GateSettings) -> PreStartCheck {
    let steps = deps
        .iter()
        .filter(|d| d.required)
        .filter_map(|d| {
            let http_path = match &d.check {
                ReadinessCheck::None => return None,
                ReadinessCheck::Tcp => None,
                ReadinessCheck::Http { path } => Some(path.clone()),
            };
            Some(GateStep {
                host: d.host(),
                port: d.port,
                http_path,
            })
        })
        .collect();

    PreStartCheck {
        steps,
        settings: settings.clone(),
    }
}

impl PreStartCheck {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Render the poll script
    pub fn script(&self) -> Result<String> {
        let mut env = Environment::new();
        env.add_template(SCRIPT_NAME, SCRIPT_TEMPLATE)?;
        let script = env.get_template(SCRIPT_NAME)?.render(context! {
            steps => &self.steps,
            max_attempts => self.settings.max_attempts,
            interval => self.settings.interval_seconds,
            // A single probe never outlasts the interval between attempts
            timeout => self.settings.interval_seconds.max(1),
        })?;
        Ok(script)
    }

    /// The init container running the script, or `None` for an empty gate
    pub fn init_container(&self, security: &SecurityContext) -> Result<Option<Container>> {
        if self.is_empty() {
            return Ok(None);
        }

        Ok(Some(Container {
            name: GATE_CONTAINER_NAME.to_string(),
            image: Some(self.settings.image.clone()),
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                self.script()?,
            ]),
            security_context: Some(security.clone()),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::Protocol;

    fn dep(target: &str, port: u16, check: ReadinessCheck, required: bool) -> DependencyRef {
        DependencyRef {
            target: target.to_string(),
            port,
            protocol: Protocol::Tcp,
            namespace: None,
            check,
            required,
        }
    }

    #[test]
    fn test_gate_polls_required_dependency() {
        let check = gate(
            &[dep("redis", 6379, ReadinessCheck::Tcp, true)],
            &GateSettings::default(),
        );
        assert_eq!(check.steps.len(), 1);

        let script = check.script().unwrap();
        assert!(script.contains("nc -z -w 2 redis 6379"));
        assert!(script.contains("-ge 30"));
        assert!(script.contains("sleep 2"));
        assert!(script.contains("exit 1"));
    }

    #[test]
    fn test_optional_and_unchecked_dependencies_omitted() {
        let check = gate(
            &[
                dep("cache", 6379, ReadinessCheck::Tcp, false),
                dep("dns", 53, ReadinessCheck::None, true),
            ],
            &GateSettings::default(),
        );
        assert!(check.is_empty());
        assert_eq!(
            check.init_container(&SecurityContext::default()).unwrap(),
            None
        );
    }

    #[test]
    fn test_http_check_and_namespaced_host() {
        let mut api = dep(
            "api",
            8080,
            ReadinessCheck::Http {
                path: "/ready".to_string(),
            },
            true,
        );
        api.namespace = Some("backend".to_string());

        let script = gate(&[api], &GateSettings::default()).script().unwrap();
        assert!(script.contains(r#"wget -q --spider -T 2 "http://api.backend:8080/ready""#));
    }

    #[test]
    fn test_init_container_uses_settings() {
        let settings = GateSettings {
            image: "busybox:1.37".to_string(),
            max_attempts: 5,
            interval_seconds: 3,
        };
        let security = SecurityContext {
            run_as_non_root: Some(true),
            ..Default::default()
        };
        let container = gate(&[dep("redis", 6379, ReadinessCheck::Tcp, true)], &settings)
            .init_container(&security)
            .unwrap()
            .unwrap();

        assert_eq!(container.name, GATE_CONTAINER_NAME);
        assert_eq!(container.image.as_deref(), Some("busybox:1.37"));
        assert_eq!(container.security_context, Some(security));
        let command = container.command.unwrap();
        assert!(command[2].contains("-ge 5"));
        assert!(command[2].contains("sleep 3"));
    }
}
