use anyhow::{Context, Result};
use ss_admin::models::{InitialServerConf, TokenInitStatus};
use tracing::{debug, info};

use super::{required, OperationContext};

/// Upload the anchor if missing, then initialize identity and token.
pub(super) async fn initialize(ctx: &OperationContext<'_>) -> Result<()> {
    let server = ctx.server;
    let init = &ctx.status.init;

    if init.anchor_imported {
        debug!(server = %server.name, "Anchor already imported");
    } else {
        let path = server
            .configuration_anchor
            .as_deref()
            .context("security_server.configuration_anchor is not set")?;
        let anchor = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read anchor {}", path.display()))?;

        if let Err(e) = ctx.client.upload_anchor(anchor).await {
            ctx.report("upload configuration anchor", &e);
            return Ok(());
        }
        info!(server = %server.name, "Configuration anchor imported");
    }

    if init.server_code_initialized
        && init.owner_initialized
        && init.token_init_status == TokenInitStatus::Initialized
    {
        debug!(server = %server.name, "Server already initialized");
        return Ok(());
    }

    let conf = InitialServerConf {
        owner_member_class: required(server.owner_member_class.as_deref(), "owner_member_class")?
            .to_string(),
        owner_member_code: required(server.owner_member_code.as_deref(), "owner_member_code")?
            .to_string(),
        security_server_code: required(
            server.security_server_code.as_deref(),
            "security_server_code",
        )?
        .to_string(),
        software_token_pin: required(server.software_token_pin.as_deref(), "software_token_pin")?
            .to_string(),
        ignore_warnings: true,
    };

    if let Err(e) = ctx.client.initialize(&conf).await {
        ctx.report("initialize server", &e);
    }
    Ok(())
}
