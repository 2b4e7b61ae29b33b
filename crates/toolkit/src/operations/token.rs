use anyhow::Result;
use tracing::info;

use super::{required, OperationContext};

/// Log in to the software token with the configured PIN.
pub(super) async fn login(ctx: &OperationContext<'_>) -> Result<()> {
    let server = ctx.server;
    let pin = required(server.software_token_pin.as_deref(), "software_token_pin")?;

    match ctx.client.login_token(server.software_token_id, pin).await {
        Ok(()) => info!(server = %server.name, token = server.software_token_id, "Token logged in"),
        Err(e) => ctx.report("log in to software token", &e),
    }
    Ok(())
}
