//! Operation dependency graph.
//!
//! Nodes are [`OperationKind`]s; an edge `A -> B` means `B` requires `A` to
//! be complete. The graph is built once per process and its topological
//! order is reused for every server.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use crate::config::{ClientConfig, SecurityServerConfig};
use crate::status::StatusSnapshot;

/// Every operation the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Import anchor and initialize server identity and token.
    Init,
    /// Log in to the software token.
    TokenLogin,
    /// Configure a timestamping service.
    TimestampEnable,
    /// Generate auth and sign keys with CSRs.
    KeysAndCsrs,
    /// Import signed certificates.
    CertImport,
    /// Register the auth certificate.
    CertRegister,
    /// Activate the auth certificate.
    CertActivate,
    /// Milestone: global configuration is current.
    GlobalConfOk,
    /// Add declared clients.
    ClientAdd,
    /// Register declared clients.
    ClientRegister,
    /// Add declared service descriptions.
    ServiceDescAdd,
    /// Enable declared service descriptions.
    ServiceDescEnable,
    /// Grant declared service access rights.
    ServiceAccessAdd,
    /// Add declared REST endpoints.
    EndpointAdd,
}

impl OperationKind {
    /// Every operation, in registration order.
    pub const ALL: [Self; 14] = [
        Self::Init,
        Self::TokenLogin,
        Self::TimestampEnable,
        Self::KeysAndCsrs,
        Self::CertImport,
        Self::CertRegister,
        Self::CertActivate,
        Self::GlobalConfOk,
        Self::ClientAdd,
        Self::ClientRegister,
        Self::ServiceDescAdd,
        Self::ServiceDescEnable,
        Self::ServiceAccessAdd,
        Self::EndpointAdd,
    ];

    /// Symbolic identifier used in logs.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::TokenLogin => "TOKEN_LOGIN",
            Self::TimestampEnable => "TIMESTAMP_ENABLE",
            Self::KeysAndCsrs => "KEYS_AND_CSRS",
            Self::CertImport => "CERT_IMPORT",
            Self::CertRegister => "CERT_REGISTER",
            Self::CertActivate => "CERT_ACTIVATE",
            Self::GlobalConfOk => "GLOBAL_CONF_OK",
            Self::ClientAdd => "CLIENT_ADD",
            Self::ClientRegister => "CLIENT_REGISTER",
            Self::ServiceDescAdd => "SERVICE_DESC_ADD",
            Self::ServiceDescEnable => "SERVICE_DESC_ENABLE",
            Self::ServiceAccessAdd => "SERVICE_ACCESS_ADD",
            Self::EndpointAdd => "ENDPOINT_ADD",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Init => "Import anchor and initialize server",
            Self::TokenLogin => "Log in to software token",
            Self::TimestampEnable => "Configure timestamping service",
            Self::KeysAndCsrs => "Generate keys and CSRs",
            Self::CertImport => "Import certificates",
            Self::CertRegister => "Register authentication certificate",
            Self::CertActivate => "Activate authentication certificate",
            Self::GlobalConfOk => "Wait for current global configuration",
            Self::ClientAdd => "Add clients",
            Self::ClientRegister => "Register clients",
            Self::ServiceDescAdd => "Add service descriptions",
            Self::ServiceDescEnable => "Enable service descriptions",
            Self::ServiceAccessAdd => "Grant service access rights",
            Self::EndpointAdd => "Add REST endpoints",
        }
    }

    /// Milestones are evaluated for completion but never executed.
    #[must_use]
    pub fn has_handler(self) -> bool {
        self != Self::GlobalConfOk
    }

    /// Declarative-item operations run on every invocation to pick up newly
    /// declared items; their handlers only write what is missing.
    #[must_use]
    pub fn reapplies(self) -> bool {
        matches!(
            self,
            Self::TimestampEnable
                | Self::ClientAdd
                | Self::ClientRegister
                | Self::ServiceDescAdd
                | Self::ServiceDescEnable
                | Self::ServiceAccessAdd
                | Self::EndpointAdd
        )
    }

    /// Whether the server declares anything for this operation to do.
    ///
    /// Identity, token and certificate steps always apply; declarative-item
    /// operations apply only when their section is present.
    #[must_use]
    pub fn is_configured(self, server: &SecurityServerConfig) -> bool {
        let descriptions = || {
            server
                .clients()
                .iter()
                .flat_map(ClientConfig::service_descriptions)
        };
        match self {
            Self::ClientAdd | Self::ClientRegister => !server.clients().is_empty(),
            Self::ServiceDescAdd | Self::ServiceDescEnable => descriptions().next().is_some(),
            Self::ServiceAccessAdd => descriptions().any(|d| {
                d.access.as_ref().is_some_and(|a| !a.is_empty())
                    || d.services
                        .iter()
                        .flatten()
                        .any(|s| s.access.as_ref().is_some_and(|a| !a.is_empty()))
            }),
            Self::EndpointAdd => {
                descriptions().any(|d| d.endpoints.as_ref().is_some_and(|e| !e.is_empty()))
            }
            _ => true,
        }
    }

    /// Whether the operation's effect is visible in `status`.
    ///
    /// Re-applied operations have no snapshot-visible completion and always
    /// count as done once they have been reached.
    #[must_use]
    pub fn is_done(self, status: &StatusSnapshot) -> bool {
        match self {
            Self::Init => status.init.is_complete(),
            Self::TokenLogin => status.token.logged_in,
            Self::TimestampEnable => !status.timestamping.is_empty(),
            Self::KeysAndCsrs => status.keys.toolkit.auth > 0 && status.keys.toolkit.sign > 0,
            Self::CertImport => status.certs.all.auth > 0 && status.certs.all.sign > 0,
            Self::CertRegister => status.certs.auth_registered > 0,
            Self::CertActivate => status.certs.auth_active > 0,
            Self::GlobalConfOk => status.global_conf.is_ok(),
            Self::ClientAdd
            | Self::ClientRegister
            | Self::ServiceDescAdd
            | Self::ServiceDescEnable
            | Self::ServiceAccessAdd
            | Self::EndpointAdd => true,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Graph construction errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// An edge references a node that was not registered.
    #[error("Edge {from} -> {to} references an unregistered operation")]
    UnknownNode {
        from: OperationKind,
        to: OperationKind,
    },

    /// The edges form a cycle.
    #[error("Operation graph has a cycle through: {}", .0.iter().map(|k| k.id()).collect::<Vec<_>>().join(", "))]
    Cycle(Vec<OperationKind>),
}

/// Directed acyclic graph of operations with a precomputed topological order.
#[derive(Debug, Clone)]
pub struct OperationGraph {
    nodes: Vec<OperationKind>,
    edges: Vec<(OperationKind, OperationKind)>,
    order: Vec<OperationKind>,
}

impl OperationGraph {
    /// Build the toolkit's operation graph.
    ///
    /// # Panics
    ///
    /// Panics if the built-in edges contain a cycle, which is a programming error.
    #[must_use]
    pub fn build() -> Self {
        use OperationKind::{
            CertActivate, CertImport, CertRegister, ClientAdd, ClientRegister, EndpointAdd,
            GlobalConfOk, Init, KeysAndCsrs, ServiceAccessAdd, ServiceDescAdd, ServiceDescEnable,
            TimestampEnable, TokenLogin,
        };

        let edges = [
            (Init, TokenLogin),
            (Init, TimestampEnable),
            (TokenLogin, KeysAndCsrs),
            (KeysAndCsrs, CertImport),
            (CertImport, CertRegister),
            (CertRegister, CertActivate),
            (CertActivate, GlobalConfOk),
            (TimestampEnable, GlobalConfOk),
            (GlobalConfOk, ClientAdd),
            (ClientAdd, ClientRegister),
            (ClientAdd, ServiceDescAdd),
            (ServiceDescAdd, ServiceDescEnable),
            (ServiceDescAdd, ServiceAccessAdd),
            (ServiceDescAdd, EndpointAdd),
        ];

        Self::from_edges(&OperationKind::ALL, &edges)
            .unwrap_or_else(|e| panic!("invalid built-in operation graph: {e}"))
    }

    /// Build a graph from explicit nodes and edges.
    ///
    /// The topological order is computed with Kahn's algorithm; ties are
    /// broken by node registration order so the result is deterministic.
    ///
    /// # Errors
    ///
    /// Returns an error if an edge references an unknown node or the edges form a cycle.
    pub fn from_edges(
        nodes: &[OperationKind],
        edges: &[(OperationKind, OperationKind)],
    ) -> Result<Self, GraphError> {
        let index: HashMap<OperationKind, usize> =
            nodes.iter().enumerate().map(|(i, k)| (*k, i)).collect();

        let mut in_degree = vec![0usize; nodes.len()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

        for &(from, to) in edges {
            let (Some(&f), Some(&t)) = (index.get(&from), index.get(&to)) else {
                return Err(GraphError::UnknownNode { from, to });
            };
            successors[f].push(t);
            in_degree[t] += 1;
        }

        let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(nodes.len());

        while let Some(i) = queue.pop_front() {
            order.push(nodes[i]);
            for &s in &successors[i] {
                in_degree[s] -= 1;
                if in_degree[s] == 0 {
                    queue.push_back(s);
                }
            }
        }

        if order.len() < nodes.len() {
            let cycle = nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .map(|(_, k)| *k)
                .collect();
            return Err(GraphError::Cycle(cycle));
        }

        Ok(Self {
            nodes: nodes.to_vec(),
            edges: edges.to_vec(),
            order,
        })
    }

    /// Registered nodes.
    #[must_use]
    pub fn nodes(&self) -> &[OperationKind] {
        &self.nodes
    }

    /// Precondition edges.
    #[must_use]
    pub fn edges(&self) -> &[(OperationKind, OperationKind)] {
        &self.edges
    }

    /// Topological order, identical for every server.
    #[must_use]
    pub fn topological_order(&self) -> &[OperationKind] {
        &self.order
    }

    /// Direct preconditions of `kind`.
    pub fn predecessors(&self, kind: OperationKind) -> impl Iterator<Item = OperationKind> + '_ {
        self.edges
            .iter()
            .filter(move |(_, to)| *to == kind)
            .map(|(from, _)| *from)
    }
}
