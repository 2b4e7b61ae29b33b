//! Admin API request and response models.
//!
//! Responses are deserialized leniently: unknown fields are ignored and
//! missing ones fall back to defaults, so older and newer server versions
//! can be read with the same types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identity and system
// ============================================================================

/// Authenticated API user (the API key's owner).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct User {
    /// User name bound to the API key.
    pub username: String,
    /// Granted roles (e.g. `XROAD_SECURITY_OFFICER`).
    pub roles: Vec<String>,
    /// Fine-grained permissions.
    pub permissions: Vec<String>,
}

/// Software version of the server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    /// Version string, e.g. `7.4.0`.
    pub info: String,
}

/// Global configuration download status class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticStatusClass {
    /// Configuration is current.
    Ok,
    /// Waiting for the first or next download.
    Waiting,
    /// Download failed.
    Fail,
    /// Unknown status.
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for DiagnosticStatusClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Waiting => write!(f, "WAITING"),
            Self::Fail => write!(f, "FAIL"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Global configuration diagnostics.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GlobalConfDiagnostics {
    /// Overall status class.
    pub status_class: DiagnosticStatusClass,
    /// Detailed status code, e.g. `SUCCESS`.
    pub status_code: String,
    /// Previous download time.
    pub prev_update_at: Option<DateTime<Utc>>,
    /// Next scheduled download time.
    pub next_update_at: Option<DateTime<Utc>>,
}

/// Software token initialization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenInitStatus {
    /// Token has been initialized with a PIN.
    Initialized,
    /// Token has not been initialized.
    NotInitialized,
    /// Unknown state.
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for TokenInitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "INITIALIZED"),
            Self::NotInitialized => write!(f, "NOT_INITIALIZED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Server initialization status.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InitializationStatus {
    /// Configuration anchor imported.
    pub is_anchor_imported: bool,
    /// Security server code assigned.
    pub is_server_code_initialized: bool,
    /// Owner member assigned.
    pub is_server_owner_initialized: bool,
    /// Software token state.
    pub software_token_init_status: TokenInitStatus,
}

/// Request body for server initialization.
#[derive(Debug, Clone, Serialize)]
pub struct InitialServerConf {
    pub owner_member_class: String,
    pub owner_member_code: String,
    pub security_server_code: String,
    pub software_token_pin: String,
    pub ignore_warnings: bool,
}

/// Timestamping service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampingService {
    /// Service name.
    pub name: String,
    /// Service URL.
    pub url: String,
}

// ============================================================================
// Tokens, keys and certificates
// ============================================================================

/// Key usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyUsage {
    /// Authentication key.
    Authentication,
    /// Signing key.
    Signing,
    /// Usage not yet decided.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Certificate status on the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    /// Imported, not registered.
    Saved,
    /// Registration submitted, not yet approved.
    RegistrationInProgress,
    /// Registered in the global configuration.
    Registered,
    /// Deletion submitted.
    DeletionInProgress,
    /// Error state reported by global configuration.
    GlobalError,
    /// Unknown.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Certificate details.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CertificateDetails {
    /// Certificate hash, used as its API identifier.
    pub hash: String,
    /// Subject distinguished name.
    pub subject_distinguished_name: String,
}

/// Certificate attached to a key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenCertificate {
    /// Certificate status.
    pub status: CertificateStatus,
    /// Whether the certificate is active.
    pub active: bool,
    /// Owner member of a sign certificate.
    pub owner_id: Option<String>,
    /// OCSP status, e.g. `GOOD`.
    pub ocsp_status: Option<String>,
    /// Certificate details.
    pub certificate_details: CertificateDetails,
}

/// Certificate signing request attached to a key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenCertificateSigningRequest {
    /// CSR identifier.
    pub id: String,
    /// Owner member of a sign CSR.
    pub owner_id: Option<String>,
}

/// Key on a token.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Key {
    /// Key identifier.
    pub id: String,
    /// Friendly name.
    pub name: String,
    /// Label set at creation.
    pub label: String,
    /// Key usage.
    pub usage: KeyUsage,
    /// Certificates for this key.
    pub certificates: Vec<TokenCertificate>,
    /// Pending CSRs for this key.
    pub certificate_signing_requests: Vec<TokenCertificateSigningRequest>,
}

/// Token with its keys.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Token {
    /// Token identifier.
    pub id: String,
    /// Token name.
    pub name: String,
    /// Token status, e.g. `OK`.
    pub status: String,
    /// Whether the token is logged in.
    pub logged_in: bool,
    /// Whether the token is available.
    pub available: bool,
    /// Keys on the token.
    pub keys: Vec<Key>,
}

/// Request body for token login.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPassword {
    pub password: String,
}

/// Certification authority approved for the instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CertificateAuthority {
    /// CA name.
    pub name: String,
    /// Whether the CA issues authentication certificates only.
    pub authentication_only: bool,
}

/// CSR generation parameters.
#[derive(Debug, Clone, Serialize)]
pub struct CsrGenerate {
    pub key_usage_type: KeyUsage,
    pub ca_name: String,
    pub csr_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    pub subject_field_values: std::collections::BTreeMap<String, String>,
}

/// Request body for generating a key together with its CSR.
#[derive(Debug, Clone, Serialize)]
pub struct KeyLabelWithCsrGenerate {
    pub key_label: String,
    pub csr_generate_request: CsrGenerate,
}

/// Request body for auth certificate registration.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityServerAddress {
    pub address: String,
}

// ============================================================================
// Clients and services
// ============================================================================

/// Client (member or subsystem) on the security server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Client {
    /// Encoded identifier, `INSTANCE:CLASS:CODE[:SUBSYSTEM]`.
    pub id: String,
    /// Instance identifier.
    pub instance_id: String,
    /// Member class.
    pub member_class: String,
    /// Member code.
    pub member_code: String,
    /// Subsystem code.
    pub subsystem_code: Option<String>,
    /// Whether this is the server owner.
    pub owner: bool,
    /// Registration status, e.g. `SAVED`, `REGISTERED`.
    pub status: String,
    /// Connection type.
    pub connection_type: Option<String>,
}

impl Client {
    /// Whether this client represents the given member/subsystem.
    #[must_use]
    pub fn matches(&self, member_class: &str, member_code: &str, subsystem_code: Option<&str>) -> bool {
        self.member_class == member_class
            && self.member_code == member_code
            && self.subsystem_code.as_deref() == subsystem_code
    }
}

/// Client fields for creation.
#[derive(Debug, Clone, Serialize)]
pub struct NewClient {
    pub member_class: String,
    pub member_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsystem_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
}

/// Request body for adding a client.
#[derive(Debug, Clone, Serialize)]
pub struct ClientAdd {
    pub client: NewClient,
    pub ignore_warnings: bool,
}

/// REST endpoint of a service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    /// Endpoint identifier.
    pub id: String,
    /// Owning service code.
    pub service_code: String,
    /// HTTP method or `*`.
    pub method: String,
    /// Path pattern.
    pub path: String,
    /// Whether the endpoint was generated from an OpenAPI description.
    pub generated: bool,
}

/// Request body for adding an endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointAdd {
    pub service_code: String,
    pub method: String,
    pub path: String,
    pub generated: bool,
}

/// Service within a service description.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Service {
    /// Encoded service identifier.
    pub id: String,
    /// Service code.
    pub service_code: String,
    /// Service code including version.
    pub full_service_code: String,
    /// Backend URL.
    pub url: String,
    /// Endpoints (REST services only).
    pub endpoints: Vec<Endpoint>,
}

/// Service description (WSDL, REST or OpenAPI3).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceDescription {
    /// Identifier.
    pub id: String,
    /// Description URL.
    pub url: String,
    /// Description type.
    #[serde(rename = "type")]
    pub description_type: String,
    /// Whether the description is disabled.
    pub disabled: bool,
    /// Services it provides.
    pub services: Vec<Service>,
}

/// Request body for adding a service description.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescriptionAdd {
    pub url: String,
    #[serde(rename = "type")]
    pub description_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_service_code: Option<String>,
    pub ignore_warnings: bool,
}

/// Service client (access right subject).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceClient {
    /// Encoded identifier of the subject.
    pub id: String,
    /// Subject type, e.g. `SUBSYSTEM`.
    pub service_client_type: String,
}

/// Request body for granting access rights.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceClients {
    pub items: Vec<ServiceClient>,
}
