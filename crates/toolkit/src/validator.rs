//! Configuration validation per operation.
//!
//! Checks that the keys an operation needs are present and sane before the
//! engine lets it run. Errors are collected, never fatal on their own.

use std::path::Path;

use thiserror::Error;

use crate::config::{non_blank, SecurityServerConfig};
use crate::graph::OperationKind;

const CONNECTION_TYPES: [&str; 3] = ["HTTP", "HTTPS", "HTTPS_NO_AUTH"];
const DESCRIPTION_TYPES: [&str; 3] = ["WSDL", "REST", "OPENAPI3"];
const ENDPOINT_METHODS: [&str; 9] = [
    "*", "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "TRACE",
];

/// One problem found in a server's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{server} [{operation}] {key}: {message}")]
pub struct ValidationError {
    /// Server name.
    pub server: String,
    /// Operation that needs the key.
    pub operation: OperationKind,
    /// Path of the offending key, e.g. `security_server.clients[0].member_code`.
    pub key: String,
    /// What is wrong with it.
    pub message: String,
}

struct Collector<'a> {
    server: &'a SecurityServerConfig,
    operation: OperationKind,
    errors: Vec<ValidationError>,
}

impl<'a> Collector<'a> {
    fn new(server: &'a SecurityServerConfig, operation: OperationKind) -> Self {
        Self {
            server,
            operation,
            errors: Vec::new(),
        }
    }

    fn push(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            server: self.server.name.clone(),
            operation: self.operation,
            key: format!("security_server.{}", key.into()),
            message: message.into(),
        });
    }

    fn require(&mut self, key: &str, value: Option<&str>) {
        if non_blank(value).is_none() {
            self.push(key, "missing or blank");
        }
    }

    fn require_one_of(&mut self, key: &str, value: Option<&str>, allowed: &[&str]) {
        match non_blank(value) {
            None => self.push(key, "missing or blank"),
            Some(v) if !allowed.contains(&v) => {
                self.push(key, format!("'{v}' is not one of {}", allowed.join(", ")));
            }
            Some(_) => {}
        }
    }

    fn require_readable(&mut self, key: &str, path: Option<&Path>) {
        match path {
            None => self.push(key, "missing"),
            Some(path) => {
                if let Err(e) = std::fs::File::open(path) {
                    self.push(key, format!("cannot read {}: {e}", path.display()));
                }
            }
        }
    }

    fn require_subjects(&mut self, key: &str, access: Option<&Vec<String>>) {
        for (i, subject) in access.into_iter().flatten().enumerate() {
            if subject.trim().is_empty() {
                self.push(format!("{key}[{i}]"), "blank access subject");
            }
        }
    }

    fn connection(&mut self) {
        let server = self.server;
        self.require("url", server.url.as_deref());
        self.require("api_key", server.api_key.as_deref());
    }
}

/// Validate `server` for `operation`.
///
/// Only file existence and readability touch the outside world.
#[must_use]
pub fn validate(server: &SecurityServerConfig, operation: OperationKind) -> Vec<ValidationError> {
    let mut c = Collector::new(server, operation);

    match operation {
        OperationKind::Init => {
            c.connection();
            c.require_readable("configuration_anchor", server.configuration_anchor.as_deref());
            c.require("owner_member_class", server.owner_member_class.as_deref());
            c.require("owner_member_code", server.owner_member_code.as_deref());
            c.require("security_server_code", server.security_server_code.as_deref());
            c.require("software_token_pin", server.software_token_pin.as_deref());
        }
        OperationKind::TokenLogin => {
            c.connection();
            c.require("software_token_pin", server.software_token_pin.as_deref());
        }
        OperationKind::TimestampEnable | OperationKind::CertActivate => c.connection(),
        OperationKind::KeysAndCsrs => {
            c.connection();
            c.require("owner_dn_country", server.owner_dn_country.as_deref());
            c.require("owner_dn_org", server.owner_dn_org.as_deref());
            c.require("owner_member_class", server.owner_member_class.as_deref());
            c.require("owner_member_code", server.owner_member_code.as_deref());
            c.require("security_server_code", server.security_server_code.as_deref());
        }
        OperationKind::CertImport => match server.certificates.as_deref() {
            None | Some([]) => c.push("certificates", "at least one certificate file is required"),
            Some(files) => {
                for (i, file) in files.iter().enumerate() {
                    c.require_readable(&format!("certificates[{i}]"), Some(file));
                }
            }
        },
        OperationKind::CertRegister => c.require("fqdn", server.fqdn.as_deref()),
        OperationKind::GlobalConfOk => {}
        OperationKind::ClientAdd | OperationKind::ClientRegister => validate_clients(&mut c),
        OperationKind::ServiceDescAdd | OperationKind::ServiceDescEnable => {
            validate_descriptions(&mut c);
        }
        OperationKind::ServiceAccessAdd => validate_access(&mut c),
        OperationKind::EndpointAdd => validate_endpoints(&mut c),
    }

    c.errors
}

fn validate_clients(c: &mut Collector<'_>) {
    let server = c.server;
    for (i, client) in server.clients().iter().enumerate() {
        let key = format!("clients[{i}]");
        c.require(&format!("{key}.member_class"), client.member_class.as_deref());
        c.require(&format!("{key}.member_code"), client.member_code.as_deref());
        if client.connection_type.is_some() {
            c.require_one_of(
                &format!("{key}.connection_type"),
                client.connection_type.as_deref(),
                &CONNECTION_TYPES,
            );
        }
    }
}

fn validate_descriptions(c: &mut Collector<'_>) {
    let server = c.server;
    for (i, client) in server.clients().iter().enumerate() {
        for (j, desc) in client.service_descriptions().iter().enumerate() {
            let key = format!("clients[{i}].service_descriptions[{j}]");
            c.require(&format!("{key}.url"), desc.url.as_deref());
            c.require_one_of(
                &format!("{key}.type"),
                desc.description_type.as_deref(),
                &DESCRIPTION_TYPES,
            );
            if non_blank(desc.description_type.as_deref()) != Some("WSDL") {
                c.require(
                    &format!("{key}.rest_service_code"),
                    desc.rest_service_code.as_deref(),
                );
            }
        }
    }
}

fn validate_access(c: &mut Collector<'_>) {
    let server = c.server;
    for (i, client) in server.clients().iter().enumerate() {
        for (j, desc) in client.service_descriptions().iter().enumerate() {
            let key = format!("clients[{i}].service_descriptions[{j}]");
            c.require_subjects(&format!("{key}.access"), desc.access.as_ref());
            for (k, service) in desc.services.iter().flatten().enumerate() {
                let service_key = format!("{key}.services[{k}]");
                c.require(
                    &format!("{service_key}.service_code"),
                    service.service_code.as_deref(),
                );
                c.require_subjects(&format!("{service_key}.access"), service.access.as_ref());
            }
        }
    }
}

fn validate_endpoints(c: &mut Collector<'_>) {
    let server = c.server;
    for (i, client) in server.clients().iter().enumerate() {
        for (j, desc) in client.service_descriptions().iter().enumerate() {
            let key = format!("clients[{i}].service_descriptions[{j}]");
            let endpoints = desc.endpoints.as_deref().unwrap_or_default();
            if !endpoints.is_empty() && non_blank(desc.description_type.as_deref()) == Some("WSDL") {
                c.push(format!("{key}.endpoints"), "WSDL descriptions cannot have endpoints");
            }
            for (k, endpoint) in endpoints.iter().enumerate() {
                let endpoint_key = format!("{key}.endpoints[{k}]");
                c.require(&format!("{endpoint_key}.path"), endpoint.path.as_deref());
                let method = endpoint.method.as_deref().map(str::to_uppercase);
                c.require_one_of(
                    &format!("{endpoint_key}.method"),
                    method.as_deref(),
                    &ENDPOINT_METHODS,
                );
                c.require_subjects(&format!("{endpoint_key}.access"), endpoint.access.as_ref());
            }
        }
    }
}
