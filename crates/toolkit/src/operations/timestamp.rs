use anyhow::Result;
use tracing::{info, warn};

use super::OperationContext;

/// Add the wanted timestamping services that are approved but not yet configured.
///
/// Without an explicit list, the first approved service is used.
pub(super) async fn enable(ctx: &OperationContext<'_>) -> Result<()> {
    let server = ctx.server;

    let approved = match ctx.client.approved_timestamping_services().await {
        Ok(approved) => approved,
        Err(e) => {
            ctx.report("list approved timestamping services", &e);
            return Ok(());
        }
    };

    let wanted: Vec<&str> = match server.timestamping_services.as_deref() {
        Some(names) => names.iter().map(String::as_str).collect(),
        None => approved.iter().take(1).map(|s| s.name.as_str()).collect(),
    };
    if wanted.is_empty() {
        warn!(server = %server.name, "No approved timestamping service available");
        return Ok(());
    }

    for name in wanted {
        if ctx.status.timestamping.iter().any(|configured| configured == name) {
            continue;
        }
        let Some(service) = approved.iter().find(|s| s.name == name) else {
            warn!(server = %server.name, tsa = name, "Timestamping service is not approved");
            continue;
        };
        match ctx.client.add_timestamping_service(service).await {
            Ok(()) => info!(server = %server.name, tsa = name, "Timestamping service added"),
            Err(e) => ctx.report(&format!("add timestamping service {name}"), &e),
        }
    }
    Ok(())
}
