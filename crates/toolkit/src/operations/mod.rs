//! Operation handlers.
//!
//! Each handler performs one admin action against one server. Remote errors
//! are logged at the call site and the handler moves on to the next item;
//! only local failures (unreadable files, missing keys) are returned as
//! errors.

mod certs;
mod clients;
mod init;
mod services;
mod timestamp;
mod token;

use anyhow::{Context, Result};
use ss_admin::{AdminClient, ApiError};
use tracing::warn;

use crate::config::{non_blank, SecurityServerConfig};
use crate::graph::OperationKind;
use crate::status::StatusSnapshot;

/// Everything a handler needs.
#[derive(Debug, Clone, Copy)]
pub struct OperationContext<'a> {
    /// Desired state of the server.
    pub server: &'a SecurityServerConfig,
    /// Admin API client for the server.
    pub client: &'a AdminClient,
    /// Status observed right before the operation.
    pub status: &'a StatusSnapshot,
}

impl OperationContext<'_> {
    /// Log a failed remote call.
    pub(crate) fn report(&self, action: &str, err: &ApiError) {
        warn!(
            server = %self.server.name,
            error = %err,
            hint = err.explain().unwrap_or(""),
            "Failed to {action}"
        );
    }
}

impl OperationKind {
    /// Run the operation's handler.
    ///
    /// Milestones have no handler and succeed without doing anything.
    ///
    /// # Errors
    ///
    /// Returns an error on local failures only; remote errors are logged.
    pub async fn execute(self, ctx: &OperationContext<'_>) -> Result<()> {
        match self {
            Self::Init => init::initialize(ctx).await,
            Self::TokenLogin => token::login(ctx).await,
            Self::TimestampEnable => timestamp::enable(ctx).await,
            Self::KeysAndCsrs => certs::generate_keys(ctx).await,
            Self::CertImport => certs::import(ctx).await,
            Self::CertRegister => certs::register(ctx).await,
            Self::CertActivate => certs::activate(ctx).await,
            Self::GlobalConfOk => Ok(()),
            Self::ClientAdd => clients::add(ctx).await,
            Self::ClientRegister => clients::register(ctx).await,
            Self::ServiceDescAdd => services::add_descriptions(ctx).await,
            Self::ServiceDescEnable => services::enable_descriptions(ctx).await,
            Self::ServiceAccessAdd => services::grant_access(ctx).await,
            Self::EndpointAdd => services::add_endpoints(ctx).await,
        }
    }
}

/// A configuration value the validator should already have checked.
fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    non_blank(value).with_context(|| format!("security_server.{key} is not set"))
}
