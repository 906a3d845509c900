//! Dependency graph between workloads and external services
//!
//! Nodes are the workloads of a document plus its declared external
//! services; edges are the workloads' [`DependencyRef`]s. Network policy is
//! derived from this graph alone, so the resulting rules can be audited by
//! reading the configuration.

use std::collections::BTreeMap;

use crate::identity::IdentityLabels;
use crate::model::{DependencyRef, ExternalService, Port, Protocol, WorkloadSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Rendered by this document
    Workload,
    /// Declared in `external:`
    External,
}

/// A node in the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNode {
    pub name: String,
    pub kind: NodeKind,
    /// Namespace the node lives in, when pinned
    pub namespace: Option<String>,
    /// Pod labels, for in-cluster nodes
    pub selector: Option<IdentityLabels>,
    /// Address range, for out-of-cluster nodes
    pub cidr: Option<String>,
    pub ports: Vec<Port>,
}

impl ServiceNode {
    /// Whether the node declares `port` over `protocol`
    pub fn exposes(&self, port: u16, protocol: Protocol) -> bool {
        self.ports
            .iter()
            .any(|p| p.port == port && p.protocol == protocol)
    }
}

/// A resolved edge: `caller` depends on `dependency`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub caller: String,
    pub dependency: DependencyRef,
}

/// Where traffic for an edge goes to (or comes from)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Peer {
    /// Pods matching `selector`, in `namespace` when it differs from the
    /// graph's own namespace
    Pods {
        namespace: Option<String>,
        selector: IdentityLabels,
    },
    /// An address block outside the cluster
    Cidr(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    namespace: String,
    nodes: BTreeMap<String, ServiceNode>,
    edges: Vec<Edge>,
}

impl DependencyGraph {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn add_workload(&mut self, spec: &WorkloadSpec) {
        self.nodes.insert(
            spec.name.clone(),
            ServiceNode {
                name: spec.name.clone(),
                kind: NodeKind::Workload,
                namespace: None,
                selector: Some(IdentityLabels::for_workload(&spec.name)),
                cidr: None,
                ports: spec.ports.clone(),
            },
        );
    }

    pub fn add_external(&mut self, external: &ExternalService) {
        // Externals without a CIDR are selected by their declared labels, or
        // by the conventional name label when none are given
        let selector = match (&external.cidr, &external.selector) {
            (Some(_), _) => None,
            (None, Some(selector)) => Some(IdentityLabels::from_selector(selector.clone())),
            (None, None) => Some(IdentityLabels::from_selector(BTreeMap::from([(
                crate::identity::NAME_LABEL.to_string(),
                external.name.clone(),
            )]))),
        };

        self.nodes.insert(
            external.name.clone(),
            ServiceNode {
                name: external.name.clone(),
                kind: NodeKind::External,
                namespace: external.namespace.clone(),
                selector,
                cidr: external.cidr.clone(),
                ports: external.ports.clone(),
            },
        );
    }

    pub fn add_edge(&mut self, caller: impl Into<String>, dependency: DependencyRef) {
        self.edges.push(Edge {
            caller: caller.into(),
            dependency,
        });
    }

    pub fn node(&self, name: &str) -> Option<&ServiceNode> {
        self.nodes.get(name)
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Find the node a dependency points at.
    ///
    /// A dependency pinned to a foreign namespace can only be satisfied by an
    /// external service, since workloads are rendered into this graph's
    /// namespace.
    pub fn resolve(&self, dependency: &DependencyRef) -> Option<&ServiceNode> {
        let node = self.nodes.get(&dependency.target)?;
        let foreign = dependency
            .namespace
            .as_deref()
            .is_some_and(|ns| ns != self.namespace);

        match node.kind {
            NodeKind::Workload if foreign => None,
            NodeKind::Workload => Some(node),
            NodeKind::External => match (&node.namespace, &dependency.namespace) {
                (Some(declared), Some(requested)) if declared != requested => None,
                _ => Some(node),
            },
        }
    }

    /// Outbound edges of `name`
    pub fn dependencies_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DependencyRef> {
        self.edges
            .iter()
            .filter(move |e| e.caller == name)
            .map(|e| &e.dependency)
    }

    /// Inbound edges of `name`, sorted by caller then port
    pub fn callers_of(&self, name: &str) -> Vec<&Edge> {
        let mut callers: Vec<&Edge> = self
            .edges
            .iter()
            .filter(|e| e.dependency.target == name && self.resolve(&e.dependency).is_some_and(|n| n.kind == NodeKind::Workload))
            .collect();
        callers.sort_by(|a, b| {
            (a.caller.as_str(), a.dependency.port).cmp(&(b.caller.as_str(), b.dependency.port))
        });
        callers
    }

    /// Network peer for the target of `dependency`
    pub fn peer_for(&self, dependency: &DependencyRef) -> Option<Peer> {
        let node = self.resolve(dependency)?;
        if let Some(cidr) = &node.cidr {
            return Some(Peer::Cidr(cidr.clone()));
        }
        let namespace = dependency
            .namespace
            .clone()
            .or_else(|| node.namespace.clone())
            .filter(|ns| *ns != self.namespace);
        Some(Peer::Pods {
            namespace,
            selector: node.selector.clone()?,
        })
    }

    /// Network peer for a calling workload of this graph
    pub fn peer_for_caller(&self, caller: &str) -> Option<Peer> {
        let node = self.nodes.get(caller)?;
        Some(Peer::Pods {
            namespace: None,
            selector: node.selector.clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Protocol, ReadinessCheck};

    fn dep(target: &str, port: u16) -> DependencyRef {
        DependencyRef {
            target: target.to_string(),
            port,
            protocol: Protocol::Tcp,
            namespace: None,
            check: ReadinessCheck::Tcp,
            required: true,
        }
    }

    fn external(name: &str, namespace: Option<&str>, port: u16) -> ExternalService {
        ExternalService {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            selector: None,
            cidr: None,
            ports: vec![Port {
                name: format!("port-{}", port),
                port,
                protocol: Protocol::Tcp,
            }],
        }
    }

    #[test]
    fn test_resolve_external_in_other_namespace() {
        let mut graph = DependencyGraph::new("default");
        graph.add_external(&external("redis", Some("cache"), 6379));

        let peer = graph.peer_for(&dep("redis", 6379)).unwrap();
        match peer {
            Peer::Pods {
                namespace,
                selector,
            } => {
                assert_eq!(namespace.as_deref(), Some("cache"));
                assert_eq!(selector.as_map()[crate::identity::NAME_LABEL], "redis");
            }
            Peer::Cidr(_) => panic!("expected pod peer"),
        }
    }

    #[test]
    fn test_namespace_mismatch_does_not_resolve() {
        let mut graph = DependencyGraph::new("default");
        graph.add_external(&external("redis", Some("cache"), 6379));

        let mut pinned = dep("redis", 6379);
        pinned.namespace = Some("other".to_string());
        assert!(graph.resolve(&pinned).is_none());
    }

    #[test]
    fn test_cidr_peer() {
        let mut graph = DependencyGraph::new("default");
        let mut billing = external("billing", None, 443);
        billing.cidr = Some("10.20.0.0/16".to_string());
        graph.add_external(&billing);

        assert_eq!(
            graph.peer_for(&dep("billing", 443)),
            Some(Peer::Cidr("10.20.0.0/16".to_string()))
        );
    }

    #[test]
    fn test_callers_sorted() {
        let mut graph = DependencyGraph::new("default");
        graph.add_external(&external("ignored", None, 1));
        for name in ["zeta", "alpha", "cache"] {
            graph.nodes.insert(
                name.to_string(),
                ServiceNode {
                    name: name.to_string(),
                    kind: NodeKind::Workload,
                    namespace: None,
                    selector: Some(IdentityLabels::for_workload(name)),
                    cidr: None,
                    ports: vec![],
                },
            );
        }
        graph.add_edge("zeta", dep("cache", 6379));
        graph.add_edge("alpha", dep("cache", 6379));

        let callers: Vec<&str> = graph
            .callers_of("cache")
            .iter()
            .map(|e| e.caller.as_str())
            .collect();
        assert_eq!(callers, vec!["alpha", "zeta"]);
        assert_eq!(graph.dependencies_of("alpha").count(), 1);
        assert!(graph.callers_of("alpha").is_empty());
    }
}
