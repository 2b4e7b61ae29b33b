//! Service description, access right and endpoint handlers.
//!
//! All handlers read the server's current state first and only write what
//! is missing, so running them again is harmless.

use std::collections::BTreeMap;

use anyhow::Result;
use ss_admin::models::{
    Client, EndpointAdd, Service, ServiceClient, ServiceDescription, ServiceDescriptionAdd,
};
use tracing::{debug, info};

use super::{clients, OperationContext};
use crate::config::{non_blank, ClientConfig, ServiceDescriptionConfig};

const SUBSYSTEM: &str = "SUBSYSTEM";
const MEMBER: &str = "MEMBER";

/// Declared clients paired with their server-side counterpart.
async fn resolved_clients<'a>(
    ctx: &OperationContext<'a>,
) -> Vec<(&'a ClientConfig, Client)> {
    let Some(existing) = clients::list(ctx).await else {
        return Vec::new();
    };
    ctx.server
        .clients()
        .iter()
        .filter(|declared| !declared.service_descriptions().is_empty())
        .filter_map(|declared| match clients::find(&existing, declared) {
            Some(client) => Some((declared, client.clone())),
            None => {
                debug!(
                    server = %ctx.server.name,
                    member_code = declared.member_code.as_deref().unwrap_or("-"),
                    "Client not on server yet, skipping its services"
                );
                None
            }
        })
        .collect()
}

async fn descriptions(ctx: &OperationContext<'_>, client: &Client) -> Option<Vec<ServiceDescription>> {
    match ctx.client.service_descriptions(&client.id).await {
        Ok(descriptions) => Some(descriptions),
        Err(e) => {
            ctx.report(&format!("list service descriptions of {}", client.id), &e);
            None
        }
    }
}

fn find_description<'a>(
    existing: &'a [ServiceDescription],
    declared: &ServiceDescriptionConfig,
) -> Option<&'a ServiceDescription> {
    let url = non_blank(declared.url.as_deref())?;
    existing.iter().find(|d| d.url == url)
}

/// Access subject for an access entry.
///
/// Entries with `:` are full identifiers (`INSTANCE:CLASS:CODE[:SUBSYSTEM]`);
/// anything else names a subsystem of the owning member.
fn subject(owner: &Client, entry: &str) -> ServiceClient {
    let entry = entry.trim();
    if entry.contains(':') {
        let kind = if entry.split(':').count() >= 4 {
            SUBSYSTEM
        } else {
            MEMBER
        };
        ServiceClient {
            id: entry.to_string(),
            service_client_type: kind.to_string(),
        }
    } else {
        ServiceClient {
            id: format!(
                "{}:{}:{}:{entry}",
                owner.instance_id, owner.member_class, owner.member_code
            ),
            service_client_type: SUBSYSTEM.to_string(),
        }
    }
}

fn subjects<'a>(owner: &'a Client, access: Option<&'a Vec<String>>) -> impl Iterator<Item = ServiceClient> + 'a {
    access
        .into_iter()
        .flatten()
        .filter(|entry| !entry.trim().is_empty())
        .map(move |entry| subject(owner, entry))
}

fn missing(wanted: Vec<ServiceClient>, existing: &[ServiceClient]) -> Vec<ServiceClient> {
    let mut result: Vec<ServiceClient> = Vec::new();
    for s in wanted {
        if !existing.iter().any(|e| e.id == s.id) && !result.iter().any(|r| r.id == s.id) {
            result.push(s);
        }
    }
    result
}

/// Add declared service descriptions missing on the server.
pub(super) async fn add_descriptions(ctx: &OperationContext<'_>) -> Result<()> {
    for (declared_client, client) in resolved_clients(ctx).await {
        let Some(existing) = descriptions(ctx, &client).await else {
            continue;
        };

        for declared in declared_client.service_descriptions() {
            if find_description(&existing, declared).is_some() {
                continue;
            }
            let (Some(url), Some(kind)) = (
                non_blank(declared.url.as_deref()),
                non_blank(declared.description_type.as_deref()),
            ) else {
                continue;
            };

            let request = ServiceDescriptionAdd {
                url: url.to_string(),
                description_type: kind.to_string(),
                rest_service_code: non_blank(declared.rest_service_code.as_deref())
                    .map(str::to_string),
                ignore_warnings: true,
            };
            match ctx.client.add_service_description(&client.id, &request).await {
                Ok(()) => info!(server = %ctx.server.name, client = %client.id, url, "Service description added"),
                Err(e) => ctx.report(&format!("add service description {url}"), &e),
            }
        }
    }
    Ok(())
}

/// Enable declared service descriptions that are disabled.
pub(super) async fn enable_descriptions(ctx: &OperationContext<'_>) -> Result<()> {
    for (declared_client, client) in resolved_clients(ctx).await {
        let Some(existing) = descriptions(ctx, &client).await else {
            continue;
        };

        for declared in declared_client.service_descriptions() {
            let Some(description) = find_description(&existing, declared) else {
                continue;
            };
            if !description.disabled {
                continue;
            }
            match ctx.client.enable_service_description(&description.id).await {
                Ok(()) => info!(server = %ctx.server.name, url = %description.url, "Service description enabled"),
                Err(e) => ctx.report(&format!("enable service description {}", description.url), &e),
            }
        }
    }
    Ok(())
}

/// Grant declared access rights on services.
///
/// Description-level access applies to every service of the description;
/// service-level access to the named service only.
pub(super) async fn grant_access(ctx: &OperationContext<'_>) -> Result<()> {
    for (declared_client, client) in resolved_clients(ctx).await {
        let Some(existing) = descriptions(ctx, &client).await else {
            continue;
        };

        let mut wanted: BTreeMap<&str, Vec<ServiceClient>> = BTreeMap::new();
        for declared in declared_client.service_descriptions() {
            let Some(description) = find_description(&existing, declared) else {
                continue;
            };
            for service in &description.services {
                wanted
                    .entry(service.id.as_str())
                    .or_default()
                    .extend(subjects(&client, declared.access.as_ref()));
            }
            for declared_service in declared.services.iter().flatten() {
                let code = non_blank(declared_service.service_code.as_deref());
                let Some(service) = description
                    .services
                    .iter()
                    .find(|s| Some(s.service_code.as_str()) == code)
                else {
                    debug!(server = %ctx.server.name, service_code = code.unwrap_or("-"), "Service not found");
                    continue;
                };
                wanted
                    .entry(service.id.as_str())
                    .or_default()
                    .extend(subjects(&client, declared_service.access.as_ref()));
            }
        }

        for (service_id, requested) in wanted {
            if requested.is_empty() {
                continue;
            }
            let current = match ctx.client.service_clients(service_id).await {
                Ok(current) => current,
                Err(e) => {
                    ctx.report(&format!("list access rights of {service_id}"), &e);
                    continue;
                }
            };
            let items = missing(requested, &current);
            if items.is_empty() {
                continue;
            }
            let count = items.len();
            match ctx.client.add_service_clients(service_id, items).await {
                Ok(()) => info!(server = %ctx.server.name, service = service_id, count, "Access rights granted"),
                Err(e) => ctx.report(&format!("grant access to {service_id}"), &e),
            }
        }
    }
    Ok(())
}

fn rest_service<'a>(description: &'a ServiceDescription, declared: &ServiceDescriptionConfig) -> Option<&'a Service> {
    let code = non_blank(declared.rest_service_code.as_deref());
    description
        .services
        .iter()
        .find(|s| Some(s.service_code.as_str()) == code)
        .or_else(|| description.services.first())
}

/// Add declared REST endpoints and grant their access rights.
pub(super) async fn add_endpoints(ctx: &OperationContext<'_>) -> Result<()> {
    for (declared_client, client) in resolved_clients(ctx).await {
        let Some(existing) = descriptions(ctx, &client).await else {
            continue;
        };

        for declared in declared_client.service_descriptions() {
            let endpoints = declared.endpoints.as_deref().unwrap_or_default();
            if endpoints.is_empty() {
                continue;
            }
            let Some(service) = find_description(&existing, declared)
                .and_then(|description| rest_service(description, declared))
            else {
                continue;
            };

            for endpoint in endpoints {
                let (Some(path), Some(method)) = (
                    non_blank(endpoint.path.as_deref()),
                    non_blank(endpoint.method.as_deref()),
                ) else {
                    continue;
                };
                let method = method.to_uppercase();

                let endpoint_id = match service
                    .endpoints
                    .iter()
                    .find(|e| e.path == path && e.method == method)
                {
                    Some(found) => found.id.clone(),
                    None => {
                        let request = EndpointAdd {
                            service_code: service.service_code.clone(),
                            method: method.clone(),
                            path: path.to_string(),
                            generated: false,
                        };
                        match ctx.client.add_endpoint(&service.id, &request).await {
                            Ok(added) => {
                                info!(server = %ctx.server.name, service = %service.id, method = %method, path, "Endpoint added");
                                added.id
                            }
                            Err(e) => {
                                ctx.report(&format!("add endpoint {method} {path}"), &e);
                                continue;
                            }
                        }
                    }
                };

                let wanted: Vec<ServiceClient> = subjects(&client, endpoint.access.as_ref()).collect();
                if wanted.is_empty() {
                    continue;
                }
                let current = match ctx.client.endpoint_service_clients(&endpoint_id).await {
                    Ok(current) => current,
                    Err(e) => {
                        ctx.report(&format!("list access rights of endpoint {endpoint_id}"), &e);
                        continue;
                    }
                };
                let items = missing(wanted, &current);
                if items.is_empty() {
                    continue;
                }
                if let Err(e) = ctx.client.add_endpoint_service_clients(&endpoint_id, items).await {
                    ctx.report(&format!("grant access to endpoint {method} {path}"), &e);
                }
            }
        }
    }
    Ok(())
}
