//! Remote status probe.
//!
//! Queries a server's admin API in a fixed order and assembles a
//! [`StatusSnapshot`]. The probe never fails: remote errors are logged and
//! leave the affected fields at their defaults.
//!
//! The order short-circuits:
//! 1. roles: a key without the required roles stops the probe here;
//! 2. version and global configuration diagnostics;
//! 3. initialization status;
//! 4. timestamping and token details, only once the anchor is imported.

use ss_admin::{AdminClient, ApiError};
use tracing::{debug, warn};

use crate::config::SecurityServerConfig;
use crate::status::{GlobalConfStatus, RolesStatus, StatusSnapshot};

/// Roles the API key must hold for auto-configuration.
pub const REQUIRED_ROLES: [&str; 4] = [
    "XROAD_SYSTEM_ADMINISTRATOR",
    "XROAD_SECURITY_OFFICER",
    "XROAD_REGISTRATION_OFFICER",
    "XROAD_SERVICE_ADMINISTRATOR",
];

fn log_failure(server: &str, what: &str, err: &ApiError) {
    warn!(
        server,
        error = %err,
        hint = err.explain().unwrap_or(""),
        "Status query for {what} failed"
    );
}

async fn probe_roles(client: &AdminClient, server: &str) -> RolesStatus {
    match client.user().await {
        Ok(user) => {
            let missing: Vec<&str> = REQUIRED_ROLES
                .iter()
                .copied()
                .filter(|required| !user.roles.iter().any(|r| r == required))
                .collect();
            RolesStatus {
                permitted: missing.is_empty(),
                error: (!missing.is_empty()).then(|| format!("missing roles: {}", missing.join(", "))),
                roles: user.roles,
            }
        }
        Err(err) => {
            log_failure(server, "roles", &err);
            RolesStatus {
                permitted: false,
                roles: Vec::new(),
                error: Some(err.to_string()),
            }
        }
    }
}

/// Probe a server and build its status snapshot.
pub async fn probe(client: &AdminClient, server: &SecurityServerConfig) -> StatusSnapshot {
    let name = server.name.as_str();
    let mut snapshot = StatusSnapshot::new(name);

    snapshot.roles = probe_roles(client, name).await;
    if !snapshot.roles.permitted {
        debug!(server = name, "API key lacks required roles, probe stopped");
        return snapshot;
    }

    match client.version().await {
        Ok(version) => snapshot.version = Some(version.info),
        Err(err) => log_failure(name, "version", &err),
    }

    match client.global_conf_diagnostics().await {
        Ok(diag) => {
            snapshot.global_conf = GlobalConfStatus {
                status_class: diag.status_class,
                status_code: diag.status_code,
            };
        }
        Err(err) => log_failure(name, "global configuration", &err),
    }

    match client.initialization_status().await {
        Ok(init) => snapshot.init = init.into(),
        Err(err) => log_failure(name, "initialization status", &err),
    }

    if !snapshot.init.anchor_imported {
        debug!(server = name, "Anchor not imported, skipping token queries");
        return snapshot;
    }

    match client.configured_timestamping_services().await {
        Ok(services) => snapshot.timestamping = services.into_iter().map(|s| s.name).collect(),
        Err(err) => log_failure(name, "timestamping services", &err),
    }

    match client.token(server.software_token_id).await {
        Ok(token) => {
            snapshot.apply_token(&token, &[server.auth_key_label(), server.sign_key_label()]);
        }
        Err(err) => log_failure(name, "token", &err),
    }

    snapshot
}
