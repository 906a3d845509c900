//! Default-deny network policy derived from the dependency graph

use std::collections::BTreeMap;

use deckhand_core::identity::namespace_selector;
use deckhand_core::{DependencyGraph, ExposureSpec, IdentityLabels, Peer, Protocol, WorkloadSpec};
use k8s_openapi::api::networking::v1::{
    IPBlock, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::error::{RenderError, Result};

/// Build the workload's NetworkPolicy.
///
/// Egress allows exactly the declared dependencies; ingress allows the
/// workloads that declare a dependency on this one, plus the ingress
/// controller when the workload is exposed. No dependencies means no egress.
///
/// DNS is not implied: a workload that reaches dependencies by name (the
/// readiness gate does) needs its own dependency on the cluster DNS service,
/// otherwise lookups are dropped. Validation warns about gated workloads
/// without one.
pub fn emit(
    spec: &WorkloadSpec,
    identity: &IdentityLabels,
    graph: &DependencyGraph,
    exposure: Option<&ExposureSpec>,
) -> Result<NetworkPolicy> {
    let mut egress = Vec::new();
    for dep in &spec.dependencies {
        let peer = graph
            .peer_for(dep)
            .ok_or_else(|| RenderError::UnresolvedDependency {
                workload: spec.name.clone(),
                target: dep.target.clone(),
            })?;
        egress.push((peer, dep.port, dep.protocol));
    }
    egress.sort();
    egress.dedup();

    let mut ingress: Vec<(Peer, u16, Protocol)> = graph
        .callers_of(&spec.name)
        .into_iter()
        .filter_map(|edge| {
            graph
                .peer_for_caller(&edge.caller)
                .map(|peer| (peer, edge.dependency.port, edge.dependency.protocol))
        })
        .collect();
    ingress.sort();
    ingress.dedup();

    let mut ingress_rules: Vec<NetworkPolicyIngressRule> = ingress
        .into_iter()
        .map(|(peer, port, protocol)| NetworkPolicyIngressRule {
            from: Some(vec![to_peer(peer)]),
            ports: Some(vec![to_port(port, protocol)]),
        })
        .collect();

    if let Some(exposure) = exposure {
        if let Some(port) = spec.port_named(&exposure.service_port) {
            ingress_rules.push(NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    namespace_selector: Some(LabelSelector {
                        match_labels: Some(namespace_selector(&exposure.controller_namespace)),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ports: Some(vec![to_port(port.port, port.protocol)]),
            });
        }
    }

    let egress_rules: Vec<NetworkPolicyEgressRule> = egress
        .into_iter()
        .map(|(peer, port, protocol)| NetworkPolicyEgressRule {
            to: Some(vec![to_peer(peer)]),
            ports: Some(vec![to_port(port, protocol)]),
        })
        .collect();

    tracing::debug!(
        workload = %spec.name,
        egress = egress_rules.len(),
        ingress = ingress_rules.len(),
        "emitted network policy"
    );

    Ok(NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(identity.metadata_labels()),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector {
                match_labels: Some(identity.to_map()),
                ..Default::default()
            }
            .into(),
            policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
            ingress: Some(ingress_rules),
            egress: Some(egress_rules),
        }),
        ..Default::default()
    })
}

fn to_peer(peer: Peer) -> NetworkPolicyPeer {
    match peer {
        Peer::Cidr(cidr) => NetworkPolicyPeer {
            ip_block: Some(IPBlock { cidr, except: None }),
            ..Default::default()
        },
        Peer::Pods {
            namespace,
            selector,
        } => NetworkPolicyPeer {
            pod_selector: Some(LabelSelector {
                match_labels: Some(selector.to_map()),
                ..Default::default()
            }),
            namespace_selector: namespace.map(|ns| LabelSelector {
                match_labels: Some(namespace_selector(&ns)),
                ..Default::default()
            }),
            ..Default::default()
        },
    }
}

fn to_port(port: u16, protocol: Protocol) -> NetworkPolicyPort {
    NetworkPolicyPort {
        port: Some(IntOrString::Int(i32::from(port))),
        protocol: Some(protocol.as_str().to_string()),
        end_port: None,
    }
}

/// Pod labels a policy applies to, read back from the rendered object
pub(crate) fn pod_selector_labels(policy: &NetworkPolicy) -> Option<BTreeMap<String, String>> {
    let value = serde_json::to_value(policy).ok()?;
    serde_json::from_value(value.pointer("/spec/podSelector/matchLabels")?.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_core::{parse_document, validate};

    const DOC: &str = r#"
apiVersion: deckhand/v1
external:
  redis:
    ports:
      - port: 6379
  kube-dns:
    namespace: kube-system
    selector:
      k8s-app: kube-dns
    ports:
      - port: 53
        protocol: UDP
  billing:
    cidr: 10.20.0.0/16
    ports:
      - port: 443
workloads:
  test:
    image: test:1
    ports:
      - name: http
        port: 3000
    dependencies:
      - target: redis
        port: 6379
        required: true
  web:
    image: web:1
    ports:
      - port: 8080
    dependencies:
      - target: test
        port: 3000
      - target: kube-dns
        port: 53
        protocol: UDP
      - target: billing
        port: 443
  lonely:
    image: lonely:1
    ports:
      - port: 9000
"#;

    fn policy_for(name: &str, exposure: Option<&ExposureSpec>) -> serde_json::Value {
        let doc = validate(&parse_document(DOC).unwrap()).unwrap();
        let workload = doc.workload(name).unwrap();
        let identity = IdentityLabels::for_workload(name);
        serde_json::to_value(emit(&workload.spec, &identity, &doc.graph, exposure).unwrap())
            .unwrap()
    }

    #[test]
    fn test_egress_to_dependency_only() {
        let policy = policy_for("test", None);
        let egress = policy["spec"]["egress"].as_array().unwrap();
        assert_eq!(egress.len(), 1);
        assert_eq!(
            egress[0]["to"][0]["podSelector"]["matchLabels"]["app.kubernetes.io/name"],
            "redis"
        );
        assert_eq!(egress[0]["ports"][0]["port"], 6379);
        assert_eq!(egress[0]["ports"][0]["protocol"], "TCP");
        assert!(egress[0]["to"][0].get("namespaceSelector").is_none());
    }

    #[test]
    fn test_ingress_from_callers() {
        let policy = policy_for("test", None);
        let ingress = policy["spec"]["ingress"].as_array().unwrap();
        assert_eq!(ingress.len(), 1);
        assert_eq!(
            ingress[0]["from"][0]["podSelector"]["matchLabels"]["app.kubernetes.io/name"],
            "web"
        );
        assert_eq!(ingress[0]["ports"][0]["port"], 3000);
    }

    #[test]
    fn test_default_deny() {
        let policy = policy_for("lonely", None);
        assert_eq!(policy["spec"]["egress"].as_array().unwrap().len(), 0);
        assert_eq!(policy["spec"]["ingress"].as_array().unwrap().len(), 0);
        assert_eq!(policy["spec"]["policyTypes"], serde_json::json!(["Ingress", "Egress"]));
    }

    #[test]
    fn test_cross_namespace_and_cidr_peers() {
        let policy = policy_for("web", None);
        let egress = policy["spec"]["egress"].as_array().unwrap();
        assert_eq!(egress.len(), 3);

        let dns = egress
            .iter()
            .find(|r| r["ports"][0]["port"] == 53)
            .unwrap();
        assert_eq!(dns["ports"][0]["protocol"], "UDP");
        assert_eq!(
            dns["to"][0]["namespaceSelector"]["matchLabels"]["kubernetes.io/metadata.name"],
            "kube-system"
        );
        assert_eq!(dns["to"][0]["podSelector"]["matchLabels"]["k8s-app"], "kube-dns");

        let billing = egress
            .iter()
            .find(|r| r["ports"][0]["port"] == 443)
            .unwrap();
        assert_eq!(billing["to"][0]["ipBlock"]["cidr"], "10.20.0.0/16");
    }

    #[test]
    fn test_exposure_admits_controller_namespace() {
        let exposure = ExposureSpec {
            host: "test.example.com".to_string(),
            paths: vec!["/".to_string()],
            tls_issuer: None,
            ingress_class: None,
            service_port: "http".to_string(),
            controller_namespace: "ingress-nginx".to_string(),
        };
        let policy = policy_for("test", Some(&exposure));
        let ingress = policy["spec"]["ingress"].as_array().unwrap();
        assert_eq!(ingress.len(), 2);
        assert_eq!(
            ingress[1]["from"][0]["namespaceSelector"]["matchLabels"]["kubernetes.io/metadata.name"],
            "ingress-nginx"
        );
        assert_eq!(ingress[1]["ports"][0]["port"], 3000);
    }

    #[test]
    fn test_selector_matches_identity() {
        let doc = validate(&parse_document(DOC).unwrap()).unwrap();
        let identity = IdentityLabels::for_workload("test");
        let policy = emit(&doc.workload("test").unwrap().spec, &identity, &doc.graph, None).unwrap();
        assert_eq!(pod_selector_labels(&policy), Some(identity.to_map()));
    }
}
