//! Key, CSR and certificate handlers.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use ss_admin::models::{
    CertificateAuthority, CertificateStatus, CsrGenerate, KeyLabelWithCsrGenerate, KeyUsage, Token,
    TokenCertificate,
};
use tracing::{debug, info, warn};

use super::{required, OperationContext};

/// CSR format requested from the server.
const CSR_FORMAT: &str = "DER";

async fn fetch_token(ctx: &OperationContext<'_>) -> Option<Token> {
    match ctx.client.token(ctx.server.software_token_id).await {
        Ok(token) => Some(token),
        Err(e) => {
            ctx.report("read software token", &e);
            None
        }
    }
}

fn auth_certificates(token: &Token) -> impl Iterator<Item = &TokenCertificate> {
    token
        .keys
        .iter()
        .filter(|k| k.usage == KeyUsage::Authentication)
        .flat_map(|k| k.certificates.iter())
}

/// Generate the toolkit's auth and sign keys, each with a CSR.
pub(super) async fn generate_keys(ctx: &OperationContext<'_>) -> Result<()> {
    let server = ctx.server;
    let country = required(server.owner_dn_country.as_deref(), "owner_dn_country")?;
    let org = required(server.owner_dn_org.as_deref(), "owner_dn_org")?;
    let member_class = required(server.owner_member_class.as_deref(), "owner_member_class")?;
    let member_code = required(server.owner_member_code.as_deref(), "owner_member_code")?;
    let server_code = required(server.security_server_code.as_deref(), "security_server_code")?;

    let instance = match ctx.client.xroad_instances().await {
        Ok(instances) => instances.into_iter().next(),
        Err(e) => {
            ctx.report("list instances", &e);
            return Ok(());
        }
    };
    let Some(instance) = instance else {
        warn!(server = %server.name, "Server reports no instance identifier");
        return Ok(());
    };

    let authorities = match ctx.client.certificate_authorities().await {
        Ok(authorities) => authorities,
        Err(e) => {
            ctx.report("list certification authorities", &e);
            return Ok(());
        }
    };
    let auth_ca = authorities.first();
    let sign_ca = authorities.iter().find(|ca| !ca.authentication_only);

    let Some(token) = fetch_token(ctx).await else {
        return Ok(());
    };

    let subject: BTreeMap<String, String> = [
        ("C", country.to_string()),
        ("O", org.to_string()),
        ("serialNumber", format!("{instance}/{server_code}/{member_class}")),
        ("CN", member_code.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let requests = [
        (KeyUsage::Authentication, server.auth_key_label(), auth_ca, None),
        (
            KeyUsage::Signing,
            server.sign_key_label(),
            sign_ca,
            Some(format!("{instance}:{member_class}:{member_code}")),
        ),
    ];

    for (usage, label, ca, member_id) in requests {
        if token.keys.iter().any(|k| k.label == label) {
            debug!(server = %server.name, label = %label, "Key already exists");
            continue;
        }
        let Some(CertificateAuthority { name: ca_name, .. }) = ca else {
            warn!(server = %server.name, usage = ?usage, "No suitable certification authority");
            continue;
        };

        let request = KeyLabelWithCsrGenerate {
            key_label: label.clone(),
            csr_generate_request: CsrGenerate {
                key_usage_type: usage,
                ca_name: ca_name.clone(),
                csr_format: CSR_FORMAT.to_string(),
                member_id,
                subject_field_values: subject.clone(),
            },
        };
        match ctx
            .client
            .add_key_with_csr(server.software_token_id, &request)
            .await
        {
            Ok(()) => info!(server = %server.name, label = %label, "Key and CSR generated"),
            Err(e) => ctx.report(&format!("generate key {label}"), &e),
        }
    }
    Ok(())
}

/// Import every configured certificate file.
pub(super) async fn import(ctx: &OperationContext<'_>) -> Result<()> {
    let server = ctx.server;
    let files = server
        .certificates
        .as_deref()
        .context("security_server.certificates is not set")?;

    for file in files {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read certificate {}", file.display()))?;

        match ctx.client.import_certificate(bytes).await {
            Ok(()) => info!(server = %server.name, file = %file.display(), "Certificate imported"),
            Err(e) if e.is_conflict() => {
                debug!(server = %server.name, file = %file.display(), "Certificate already imported");
            }
            Err(e) => ctx.report(&format!("import certificate {}", file.display()), &e),
        }
    }
    Ok(())
}

/// Submit registration for saved auth certificates.
pub(super) async fn register(ctx: &OperationContext<'_>) -> Result<()> {
    let server = ctx.server;
    let address = required(server.fqdn.as_deref(), "fqdn")?;

    let Some(token) = fetch_token(ctx).await else {
        return Ok(());
    };

    for cert in auth_certificates(&token).filter(|c| c.status == CertificateStatus::Saved) {
        let hash = &cert.certificate_details.hash;
        match ctx.client.register_certificate(hash, address).await {
            Ok(()) => info!(server = %server.name, hash = %hash, "Auth certificate registration submitted"),
            Err(e) => ctx.report(&format!("register certificate {hash}"), &e),
        }
    }
    Ok(())
}

/// Activate registered, inactive auth certificates.
pub(super) async fn activate(ctx: &OperationContext<'_>) -> Result<()> {
    let server = ctx.server;

    let Some(token) = fetch_token(ctx).await else {
        return Ok(());
    };

    for cert in auth_certificates(&token)
        .filter(|c| c.status == CertificateStatus::Registered && !c.active)
    {
        let hash = &cert.certificate_details.hash;
        match ctx.client.activate_certificate(hash).await {
            Ok(()) => info!(server = %server.name, hash = %hash, "Auth certificate activated"),
            Err(e) => ctx.report(&format!("activate certificate {hash}"), &e),
        }
    }
    Ok(())
}
