//! Security server admin API client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ApiError;
use crate::models::{
    CertificateAuthority, Client as SsClient, ClientAdd, Endpoint, EndpointAdd,
    GlobalConfDiagnostics, InitialServerConf, InitializationStatus, KeyLabelWithCsrGenerate,
    SecurityServerAddress, ServiceClient, ServiceClients, ServiceDescription,
    ServiceDescriptionAdd, TimestampingService, Token, TokenPassword, User, VersionInfo,
};
use crate::rate_limit::RateLimiter;

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings shared by all clients of a run.
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Verify the server's TLS certificate.
    pub verify_tls: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verify_tls: false,
        }
    }
}

/// Admin API client bound to one security server.
#[derive(Clone)]
pub struct AdminClient {
    /// HTTP client.
    client: Client,
    /// API base URL, e.g. `https://ss1:4000/api/v1`, without trailing slash.
    base_url: String,
    /// Rate limiter key (`scheme://host:port`).
    origin: String,
    /// API key.
    api_key: String,
    /// Shared rate limiter.
    limiter: Arc<RateLimiter>,
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("base_url", &self.base_url)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl AdminClient {
    /// Create a client for the server at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        limiter: Arc<RateLimiter>,
        options: ClientOptions,
    ) -> Result<Self, ApiError> {
        let origin = origin_of(base_url)?;

        let client = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(!options.verify_tls)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            origin,
            api_key: api_key.into(),
            limiter,
        })
    }

    /// Rate limiter key for this server.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.limiter.limit_rate(&self.origin).await;

        let url = format!("{}{path}", self.base_url);
        debug!(method = %method, url = %url, "Admin API request");

        self.client
            .request(method, url)
            .header("Authorization", format!("X-Road-ApiKey token={}", self.api_key))
            .header("Accept", "application/json")
    }

    /// Turn a non-2xx response into [`ApiError::Api`].
    async fn check(method: &Method, path: &str, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Api {
            method: method.to_string(),
            path: path.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, body = %text, "Failed to parse response");
            ApiError::Serialization(e)
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.request(Method::GET, path).await.send().await?;
        let response = Self::check(&Method::GET, path, response).await?;
        Self::parse(response).await
    }

    async fn send_json<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let mut builder = self.request(method.clone(), path).await;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        Self::check(&method, path, response).await
    }

    async fn send_bytes(&self, path: &str, bytes: Vec<u8>) -> Result<Response, ApiError> {
        let response = self
            .request(Method::POST, path)
            .await
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        Self::check(&Method::POST, path, response).await
    }

    // --- Status ---

    /// Get the API key's user and roles.
    pub async fn user(&self) -> Result<User, ApiError> {
        self.get("/user").await
    }

    /// Get the server software version.
    pub async fn version(&self) -> Result<VersionInfo, ApiError> {
        self.get("/system/version").await
    }

    /// Get global configuration diagnostics.
    pub async fn global_conf_diagnostics(&self) -> Result<GlobalConfDiagnostics, ApiError> {
        self.get("/diagnostics/globalconf").await
    }

    /// Get initialization status.
    pub async fn initialization_status(&self) -> Result<InitializationStatus, ApiError> {
        self.get("/initialization/status").await
    }

    /// Timestamping services configured on the server.
    pub async fn configured_timestamping_services(
        &self,
    ) -> Result<Vec<TimestampingService>, ApiError> {
        self.get("/system/timestamping-services").await
    }

    /// Timestamping services approved in the global configuration.
    pub async fn approved_timestamping_services(
        &self,
    ) -> Result<Vec<TimestampingService>, ApiError> {
        self.get("/timestamping-services").await
    }

    /// Get a token with its keys, CSRs and certificates.
    pub async fn token(&self, token_id: u32) -> Result<Token, ApiError> {
        self.get(&format!("/tokens/{token_id}")).await
    }

    /// Known instance identifiers.
    pub async fn xroad_instances(&self) -> Result<Vec<String>, ApiError> {
        self.get("/xroad-instances").await
    }

    /// Approved certification authorities.
    pub async fn certificate_authorities(&self) -> Result<Vec<CertificateAuthority>, ApiError> {
        self.get("/certificate-authorities").await
    }

    // --- Initialization ---

    /// Upload the configuration anchor.
    pub async fn upload_anchor(&self, anchor: Vec<u8>) -> Result<(), ApiError> {
        info!(origin = %self.origin, "Uploading configuration anchor");
        self.send_bytes("/system/anchor", anchor).await?;
        Ok(())
    }

    /// Initialize server identity and software token.
    pub async fn initialize(&self, conf: &InitialServerConf) -> Result<(), ApiError> {
        info!(
            origin = %self.origin,
            server_code = %conf.security_server_code,
            "Initializing security server"
        );
        self.send_json(Method::POST, "/initialization", Some(conf))
            .await?;
        Ok(())
    }

    /// Log in to a token.
    pub async fn login_token(&self, token_id: u32, pin: &str) -> Result<(), ApiError> {
        let body = TokenPassword {
            password: pin.to_string(),
        };
        self.send_json(Method::PUT, &format!("/tokens/{token_id}/login"), Some(&body))
            .await?;
        Ok(())
    }

    /// Add a timestamping service to the server's configuration.
    pub async fn add_timestamping_service(
        &self,
        service: &TimestampingService,
    ) -> Result<(), ApiError> {
        self.send_json(Method::POST, "/system/timestamping-services", Some(service))
            .await?;
        Ok(())
    }

    // --- Keys and certificates ---

    /// Generate a key and its CSR on a token.
    pub async fn add_key_with_csr(
        &self,
        token_id: u32,
        request: &KeyLabelWithCsrGenerate,
    ) -> Result<(), ApiError> {
        self.send_json(
            Method::POST,
            &format!("/tokens/{token_id}/keys-with-csrs"),
            Some(request),
        )
        .await?;
        Ok(())
    }

    /// Import a signed certificate.
    pub async fn import_certificate(&self, certificate: Vec<u8>) -> Result<(), ApiError> {
        self.send_bytes("/token-certificates", certificate).await?;
        Ok(())
    }

    /// Register an authentication certificate.
    pub async fn register_certificate(&self, hash: &str, address: &str) -> Result<(), ApiError> {
        let body = SecurityServerAddress {
            address: address.to_string(),
        };
        self.send_json(
            Method::PUT,
            &format!("/token-certificates/{hash}/register"),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    /// Activate a certificate.
    pub async fn activate_certificate(&self, hash: &str) -> Result<(), ApiError> {
        self.send_json::<()>(
            Method::PUT,
            &format!("/token-certificates/{hash}/activate"),
            None,
        )
        .await?;
        Ok(())
    }

    // --- Clients and services ---

    /// Clients on the server.
    pub async fn clients(&self) -> Result<Vec<SsClient>, ApiError> {
        self.get("/clients").await
    }

    /// Add a client.
    pub async fn add_client(&self, request: &ClientAdd) -> Result<(), ApiError> {
        self.send_json(Method::POST, "/clients", Some(request)).await?;
        Ok(())
    }

    /// Submit a client registration request.
    pub async fn register_client(&self, client_id: &str) -> Result<(), ApiError> {
        self.send_json::<()>(Method::PUT, &format!("/clients/{client_id}/register"), None)
            .await?;
        Ok(())
    }

    /// Service descriptions of a client.
    pub async fn service_descriptions(
        &self,
        client_id: &str,
    ) -> Result<Vec<ServiceDescription>, ApiError> {
        self.get(&format!("/clients/{client_id}/service-descriptions"))
            .await
    }

    /// Add a service description to a client.
    pub async fn add_service_description(
        &self,
        client_id: &str,
        request: &ServiceDescriptionAdd,
    ) -> Result<(), ApiError> {
        self.send_json(
            Method::POST,
            &format!("/clients/{client_id}/service-descriptions"),
            Some(request),
        )
        .await?;
        Ok(())
    }

    /// Enable a service description.
    pub async fn enable_service_description(&self, description_id: &str) -> Result<(), ApiError> {
        self.send_json::<()>(
            Method::PUT,
            &format!("/service-descriptions/{description_id}/enable"),
            None,
        )
        .await?;
        Ok(())
    }

    /// Subjects with access to a service.
    pub async fn service_clients(&self, service_id: &str) -> Result<Vec<ServiceClient>, ApiError> {
        self.get(&format!("/services/{service_id}/service-clients"))
            .await
    }

    /// Grant access to a service.
    pub async fn add_service_clients(
        &self,
        service_id: &str,
        items: Vec<ServiceClient>,
    ) -> Result<(), ApiError> {
        self.send_json(
            Method::POST,
            &format!("/services/{service_id}/service-clients"),
            Some(&ServiceClients { items }),
        )
        .await?;
        Ok(())
    }

    /// Add an endpoint to a REST service.
    pub async fn add_endpoint(
        &self,
        service_id: &str,
        request: &EndpointAdd,
    ) -> Result<Endpoint, ApiError> {
        let path = format!("/services/{service_id}/endpoints");
        let response = self.send_json(Method::POST, &path, Some(request)).await?;
        Self::parse(response).await
    }

    /// Subjects with access to an endpoint.
    pub async fn endpoint_service_clients(
        &self,
        endpoint_id: &str,
    ) -> Result<Vec<ServiceClient>, ApiError> {
        self.get(&format!("/endpoints/{endpoint_id}/service-clients"))
            .await
    }

    /// Grant access to an endpoint.
    pub async fn add_endpoint_service_clients(
        &self,
        endpoint_id: &str,
        items: Vec<ServiceClient>,
    ) -> Result<(), ApiError> {
        self.send_json(
            Method::POST,
            &format!("/endpoints/{endpoint_id}/service-clients"),
            Some(&ServiceClients { items }),
        )
        .await?;
        Ok(())
    }
}

/// `scheme://host[:port]` of a URL, used as the rate limiter key.
///
/// # Errors
/// Returns an error if `url` cannot be parsed.
pub fn origin_of(url: &str) -> Result<String, ApiError> {
    let parsed = Url::parse(url).map_err(|source| ApiError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    Ok(parsed.origin().ascii_serialization())
}
