//! Auto-configuration engine.
//!
//! Walks the operation graph for each server in turn. Before every step the
//! server's status is probed, and after every step it is probed again; a
//! step whose effect cannot be observed yet ends the walk for that server,
//! and the next invocation picks up from there.

use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ss_admin::{AdminClient, ClientOptions, RateLimiter};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{Config, SecurityServerConfig, WalkMode};
use crate::graph::{OperationGraph, OperationKind};
use crate::operations::OperationContext;
use crate::poll::{poll_until, PollError};
use crate::probe::probe;
use crate::status::StatusSnapshot;
use crate::ui;
use crate::validator::{validate, ValidationError};

/// How a server's walk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Not processed: no credential or not reachable.
    Skipped { reason: String },
    /// The API key lacks a required role; nothing was attempted.
    Denied { reason: String },
    /// Every configured operation is done.
    Complete,
    /// Stopped at a step whose effect is not observed yet.
    Pending { operation: OperationKind },
    /// Finished, but some operations could not run because of invalid configuration.
    Blocked { operations: Vec<OperationKind> },
    /// A handler failed locally.
    Failed {
        operation: OperationKind,
        error: String,
    },
    /// Interrupted.
    Cancelled,
}

impl fmt::Display for WalkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped { .. } => f.write_str("SKIPPED"),
            Self::Denied { .. } => f.write_str("DENIED"),
            Self::Complete => f.write_str("COMPLETE"),
            Self::Pending { operation } => write!(f, "PENDING {operation}"),
            Self::Blocked { operations } => write!(
                f,
                "BLOCKED {}",
                operations
                    .iter()
                    .map(|o| o.id())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Self::Failed { operation, .. } => write!(f, "FAILED {operation}"),
            Self::Cancelled => f.write_str("CANCELLED"),
        }
    }
}

/// Result of processing one server.
#[derive(Debug, Clone)]
pub struct ServerRun {
    /// Server name.
    pub name: String,
    /// Last observed status, `None` when the server was skipped.
    pub snapshot: Option<StatusSnapshot>,
    /// How processing ended.
    pub outcome: WalkOutcome,
    /// Operations whose handlers were invoked, in order.
    pub attempted: Vec<OperationKind>,
    /// Validation problems found along the way.
    pub validation_errors: Vec<ValidationError>,
}

impl ServerRun {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            snapshot: None,
            outcome: WalkOutcome::Complete,
            attempted: Vec::new(),
            validation_errors: Vec::new(),
        }
    }

    fn skipped(name: &str, reason: String) -> Self {
        ui::print_skipped(name, &reason);
        Self {
            outcome: WalkOutcome::Skipped { reason },
            ..Self::new(name)
        }
    }

    /// Run ending at a permission-denied probe.
    fn denied(name: &str, snapshot: StatusSnapshot) -> Self {
        let reason = snapshot
            .roles
            .error
            .clone()
            .unwrap_or_else(|| "API key lacks a required role".to_string());
        ui::print_skipped(name, &format!("permission denied: {reason}"));
        Self {
            outcome: WalkOutcome::Denied { reason },
            snapshot: Some(snapshot),
            ..Self::new(name)
        }
    }
}

/// Results for every processed server, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct AutoReport {
    pub runs: Vec<ServerRun>,
}

impl AutoReport {
    /// Run for a server.
    #[must_use]
    pub fn run(&self, name: &str) -> Option<&ServerRun> {
        self.runs.iter().find(|r| r.name == name)
    }

    /// Number of servers whose processing failed or was denied.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    WalkOutcome::Failed { .. } | WalkOutcome::Denied { .. }
                )
            })
            .count()
    }
}

/// Whether an awaited effect showed up.
enum Observation {
    Observed,
    NotYet,
    Cancelled,
}

/// Drives servers towards their declared state.
#[derive(Debug)]
pub struct AutoConfigEngine {
    graph: OperationGraph,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
}

impl AutoConfigEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(graph: OperationGraph, limiter: Arc<RateLimiter>, cancel: CancellationToken) -> Self {
        Self {
            graph,
            limiter,
            cancel,
        }
    }

    /// The operation graph.
    #[must_use]
    pub fn graph(&self) -> &OperationGraph {
        &self.graph
    }

    /// Auto-configure every server, one at a time.
    pub async fn auto(&self, config: &Config) -> AutoReport {
        self.for_each_server(config, |view| self.single_server_auto(view))
            .await
    }

    /// Probe every server and report the next step it is waiting for.
    pub async fn status(&self, config: &Config) -> AutoReport {
        self.for_each_server(config, |view| self.single_server_status(view))
            .await
    }

    /// Run one operation on every server (or one, when `only` is given).
    pub async fn apply(
        &self,
        config: &Config,
        operation: OperationKind,
        only: Option<&str>,
    ) -> AutoReport {
        self.for_each_server(config, |view| async move {
            let skip = only.is_some_and(|name| view.security_server[0].name != name);
            if skip {
                None
            } else {
                Some(self.single_server_apply(view, operation).await)
            }
        })
        .await
    }

    async fn for_each_server<F, Fut, R>(&self, config: &Config, mut run: F) -> AutoReport
    where
        F: FnMut(Config) -> Fut,
        Fut: std::future::Future<Output = R>,
        R: Into<Option<ServerRun>>,
    {
        let mut report = AutoReport::default();
        for name in config.server_names() {
            if self.cancel.is_cancelled() {
                warn!("Cancelled, not processing remaining servers");
                break;
            }
            let Some(view) = config.single_server_view(&name) else {
                continue;
            };
            if let Some(server_run) = run(view).await.into() {
                report.runs.push(server_run);
            }
        }
        report
    }

    /// Connect to the only server of a single-server view.
    ///
    /// Returns the skip reason when the server has no usable credential or
    /// cannot be reached. No HTTP request is made here.
    async fn connect(&self, view: &Config) -> Result<AdminClient, String> {
        let server = &view.security_server[0];
        let (Some(url), Some(api_key)) = (server.api_url(), server.credential()) else {
            return Err("no API key or URL configured".to_string());
        };

        let connect_timeout = Duration::from_secs(view.connection.connect_timeout_secs);
        reachable(url, connect_timeout).await?;

        let options = ClientOptions {
            timeout: Duration::from_secs(view.connection.timeout_secs),
            verify_tls: view.connection.verify_tls,
        };
        AdminClient::new(url, api_key, Arc::clone(&self.limiter), options).map_err(|e| e.to_string())
    }

    /// Walk the graph for the only server of `view`.
    pub async fn single_server_auto(&self, view: Config) -> ServerRun {
        let server = &view.security_server[0];
        let name = server.name.as_str();

        let client = match self.connect(&view).await {
            Ok(client) => client,
            Err(reason) => return ServerRun::skipped(name, reason),
        };

        let mut snapshot = probe(&client, server).await;
        if !snapshot.roles.permitted {
            return ServerRun::denied(name, snapshot);
        }

        let mut run = ServerRun::new(name);
        run.outcome = self
            .walk(&view, &client, &mut snapshot, &mut run)
            .await;

        ui::print_info(&format!("'{name}' {}", snapshot.summary()));
        run.snapshot = Some(snapshot);
        run
    }

    async fn walk(
        &self,
        view: &Config,
        client: &AdminClient,
        snapshot: &mut StatusSnapshot,
        run: &mut ServerRun,
    ) -> WalkOutcome {
        let server = &view.security_server[0];
        let name = server.name.as_str();
        let mut blocked: Vec<OperationKind> = Vec::new();
        let mut blocked_set: HashSet<OperationKind> = HashSet::new();

        for &operation in self.graph.topological_order() {
            if self.cancel.is_cancelled() {
                return WalkOutcome::Cancelled;
            }
            if !operation.is_configured(server) {
                continue;
            }
            if self
                .graph
                .predecessors(operation)
                .any(|p| blocked_set.contains(&p))
            {
                debug!(server = name, operation = %operation, "Blocked by an earlier operation");
                blocked_set.insert(operation);
                blocked.push(operation);
                continue;
            }

            let done = operation.is_done(snapshot);
            if done && !operation.reapplies() {
                debug!(server = name, operation = %operation, "Already done");
                continue;
            }

            if !operation.has_handler() {
                if done {
                    continue;
                }
                info!(server = name, operation = %operation, "Waiting for milestone");
                match self.await_effect(view, client, operation, snapshot).await {
                    Observation::Observed => continue,
                    Observation::NotYet => {
                        ui::print_pending(name, operation);
                        return WalkOutcome::Pending { operation };
                    }
                    Observation::Cancelled => return WalkOutcome::Cancelled,
                }
            }

            ui::print_intent(operation, name, done);

            let errors = validate(server, operation);
            if !errors.is_empty() {
                for error in &errors {
                    warn!(server = name, operation = %operation, key = %error.key, "{}", error.message);
                    ui::print_warning(&error.to_string());
                }
                run.validation_errors.extend(errors);
                if !done {
                    blocked_set.insert(operation);
                    blocked.push(operation);
                }
                continue;
            }

            run.attempted.push(operation);
            let ctx = OperationContext {
                server,
                client,
                status: &*snapshot,
            };
            if let Err(e) = operation.execute(&ctx).await {
                let error = format!("{e:#}");
                ui::print_error(&format!("'{name}' {operation} failed: {error}"));
                return WalkOutcome::Failed { operation, error };
            }

            *snapshot = probe(client, server).await;
            if operation.is_done(snapshot) {
                continue;
            }

            info!(server = name, operation = %operation, "Effect not yet observed");
            match self.await_effect(view, client, operation, snapshot).await {
                Observation::Observed => {}
                Observation::NotYet => {
                    ui::print_pending(name, operation);
                    return WalkOutcome::Pending { operation };
                }
                Observation::Cancelled => return WalkOutcome::Cancelled,
            }
        }

        if blocked.is_empty() {
            WalkOutcome::Complete
        } else {
            WalkOutcome::Blocked { operations: blocked }
        }
    }

    /// In poll mode, re-probe with backoff until `operation` is done.
    async fn await_effect(
        &self,
        view: &Config,
        client: &AdminClient,
        operation: OperationKind,
        snapshot: &mut StatusSnapshot,
    ) -> Observation {
        if view.auto.mode == WalkMode::SingleShot {
            return Observation::NotYet;
        }

        let server = &view.security_server[0];
        let latest: Cell<Option<StatusSnapshot>> = Cell::new(None);
        let latest_ref = &latest;

        let result = poll_until(&view.auto.poll, &self.cancel, operation.id(), move || async move {
            let status = probe(client, server).await;
            let done = operation.is_done(&status);
            latest_ref.set(Some(status));
            done
        })
        .await;

        if let Some(status) = latest.into_inner() {
            *snapshot = status;
        }

        match result {
            Ok(_) => Observation::Observed,
            Err(PollError::Exhausted { .. }) => Observation::NotYet,
            Err(PollError::Cancelled { .. }) => Observation::Cancelled,
        }
    }

    /// Probe the only server of `view` and name its next step.
    pub async fn single_server_status(&self, view: Config) -> ServerRun {
        let server = &view.security_server[0];
        let name = server.name.as_str();

        let client = match self.connect(&view).await {
            Ok(client) => client,
            Err(reason) => return ServerRun::skipped(name, reason),
        };

        let snapshot = probe(&client, server).await;
        if !snapshot.roles.permitted {
            return ServerRun::denied(name, snapshot);
        }

        let mut run = ServerRun::new(name);
        run.outcome = match self.next_step(server, &snapshot) {
            Some(operation) => WalkOutcome::Pending { operation },
            None => WalkOutcome::Complete,
        };
        run.snapshot = Some(snapshot);
        run
    }

    /// First configured operation that is not done.
    ///
    /// `None` when everything is done, and also when the snapshot shows the
    /// API key was denied, since no step can run then.
    #[must_use]
    pub fn next_step(
        &self,
        server: &SecurityServerConfig,
        snapshot: &StatusSnapshot,
    ) -> Option<OperationKind> {
        if !snapshot.roles.permitted {
            return None;
        }
        self.graph
            .topological_order()
            .iter()
            .copied()
            .find(|op| op.is_configured(server) && !op.is_done(snapshot))
    }

    /// Run a single operation on the only server of `view`, ignoring the graph.
    pub async fn single_server_apply(&self, view: Config, operation: OperationKind) -> ServerRun {
        let server = &view.security_server[0];
        let name = server.name.as_str();

        let client = match self.connect(&view).await {
            Ok(client) => client,
            Err(reason) => return ServerRun::skipped(name, reason),
        };

        let before = probe(&client, server).await;
        if !before.roles.permitted {
            return ServerRun::denied(name, before);
        }

        let mut run = ServerRun::new(name);
        let errors = validate(server, operation);
        if !errors.is_empty() {
            for error in &errors {
                ui::print_warning(&error.to_string());
            }
            run.validation_errors = errors;
            run.outcome = WalkOutcome::Blocked {
                operations: vec![operation],
            };
            run.snapshot = Some(before);
            return run;
        }

        ui::print_intent(operation, name, operation.is_done(&before));
        run.attempted.push(operation);

        let ctx = OperationContext {
            server,
            client: &client,
            status: &before,
        };
        if let Err(e) = operation.execute(&ctx).await {
            run.outcome = WalkOutcome::Failed {
                operation,
                error: format!("{e:#}"),
            };
            run.snapshot = Some(before);
            return run;
        }

        let after = probe(&client, server).await;
        run.outcome = if operation.is_done(&after) {
            WalkOutcome::Complete
        } else {
            WalkOutcome::Pending { operation }
        };
        run.snapshot = Some(after);
        run
    }
}

/// Check that the URL's host accepts TCP connections.
async fn reachable(url: &str, timeout: Duration) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|e| format!("invalid URL '{url}': {e}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| format!("URL '{url}' has no host"))?;
    let port = parsed
        .port_or_known_default()
        .ok_or_else(|| format!("URL '{url}' has no port"))?;

    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("{host}:{port} is not reachable: {e}")),
        Err(_) => Err(format!("{host}:{port} did not answer within {timeout:?}")),
    }
}
