use anyhow::Result;
use ss_admin::models::{Client, ClientAdd, NewClient};
use tracing::{debug, info};

use super::OperationContext;
use crate::config::{non_blank, ClientConfig};

/// Registration status of a client that was added but not yet registered.
const SAVED: &str = "SAVED";

/// Find the server-side client for a declared one.
pub(super) fn find<'a>(existing: &'a [Client], declared: &ClientConfig) -> Option<&'a Client> {
    let class = non_blank(declared.member_class.as_deref())?;
    let code = non_blank(declared.member_code.as_deref())?;
    let subsystem = non_blank(declared.subsystem_code.as_deref());
    existing.iter().find(|c| c.matches(class, code, subsystem))
}

/// List clients, logging a failure.
pub(super) async fn list(ctx: &OperationContext<'_>) -> Option<Vec<Client>> {
    match ctx.client.clients().await {
        Ok(clients) => Some(clients),
        Err(e) => {
            ctx.report("list clients", &e);
            None
        }
    }
}

/// Add declared clients that the server does not have yet.
pub(super) async fn add(ctx: &OperationContext<'_>) -> Result<()> {
    let Some(existing) = list(ctx).await else {
        return Ok(());
    };

    for declared in ctx.server.clients() {
        if find(&existing, declared).is_some() {
            continue;
        }
        let (Some(class), Some(code)) = (
            non_blank(declared.member_class.as_deref()),
            non_blank(declared.member_code.as_deref()),
        ) else {
            continue;
        };
        let subsystem = non_blank(declared.subsystem_code.as_deref());

        let request = ClientAdd {
            client: NewClient {
                member_class: class.to_string(),
                member_code: code.to_string(),
                subsystem_code: subsystem.map(str::to_string),
                connection_type: declared.connection_type.clone(),
            },
            ignore_warnings: true,
        };
        match ctx.client.add_client(&request).await {
            Ok(()) => info!(
                server = %ctx.server.name,
                member = %format!("{class}:{code}"),
                subsystem = subsystem.unwrap_or("-"),
                "Client added"
            ),
            Err(e) => ctx.report(&format!("add client {class}:{code}"), &e),
        }
    }
    Ok(())
}

/// Submit registration for declared clients still in `SAVED` state.
pub(super) async fn register(ctx: &OperationContext<'_>) -> Result<()> {
    let Some(existing) = list(ctx).await else {
        return Ok(());
    };

    for declared in ctx.server.clients() {
        let Some(client) = find(&existing, declared) else {
            continue;
        };
        if client.owner || client.status != SAVED {
            debug!(server = %ctx.server.name, client = %client.id, status = %client.status, "Client needs no registration");
            continue;
        }
        match ctx.client.register_client(&client.id).await {
            Ok(()) => info!(server = %ctx.server.name, client = %client.id, "Client registration submitted"),
            Err(e) => ctx.report(&format!("register client {}", client.id), &e),
        }
    }
    Ok(())
}
