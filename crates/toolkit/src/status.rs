//! Security server status snapshot.
//!
//! A snapshot is what the probe observed on one server at one point in time.
//! It is rebuilt before and after every operation and never reused across an
//! attempt.

use ss_admin::models::{
    CertificateStatus, DiagnosticStatusClass, InitializationStatus, KeyUsage, Token,
    TokenInitStatus,
};

/// Result of the roles/permission check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolesStatus {
    /// Whether the API key holds every required role.
    pub permitted: bool,
    /// Roles granted to the API key.
    pub roles: Vec<String>,
    /// Why the check failed, if it did.
    pub error: Option<String>,
}

/// Global configuration health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalConfStatus {
    /// Status class reported by diagnostics.
    pub status_class: DiagnosticStatusClass,
    /// Detailed status code.
    pub status_code: String,
}

impl GlobalConfStatus {
    /// Whether the global configuration is current.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status_class == DiagnosticStatusClass::Ok
    }
}

/// Initialization flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitStatus {
    pub anchor_imported: bool,
    pub server_code_initialized: bool,
    pub owner_initialized: bool,
    pub token_init_status: TokenInitStatus,
}

impl InitStatus {
    /// Whether every initialization step has been completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.anchor_imported
            && self.server_code_initialized
            && self.owner_initialized
            && self.token_init_status == TokenInitStatus::Initialized
    }
}

impl From<InitializationStatus> for InitStatus {
    fn from(status: InitializationStatus) -> Self {
        Self {
            anchor_imported: status.is_anchor_imported,
            server_code_initialized: status.is_server_code_initialized,
            owner_initialized: status.is_server_owner_initialized,
            token_init_status: status.software_token_init_status,
        }
    }
}

/// Token state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenStatus {
    /// Token identifier, `None` when not queried.
    pub id: Option<String>,
    /// Token status string, e.g. `OK`.
    pub status: String,
    /// Whether the token is logged in.
    pub logged_in: bool,
}

/// Counts split by key usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounts {
    pub auth: usize,
    pub sign: usize,
}

impl UsageCounts {
    fn add(&mut self, usage: KeyUsage) {
        match usage {
            KeyUsage::Authentication => self.auth += 1,
            KeyUsage::Signing => self.sign += 1,
            KeyUsage::Unknown => {}
        }
    }

    /// Total of both usages.
    #[must_use]
    pub fn total(&self) -> usize {
        self.auth + self.sign
    }
}

/// Classified item counts (keys or CSRs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemCounts {
    /// Every item on the token.
    pub all: UsageCounts,
    /// Items belonging to keys this toolkit generated.
    pub toolkit: UsageCounts,
}

/// Classified certificate counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CertCounts {
    /// Every certificate on the token.
    pub all: UsageCounts,
    /// Certificates of keys this toolkit generated.
    pub toolkit: UsageCounts,
    /// Auth certificates registered in the global configuration.
    pub auth_registered: usize,
    /// Auth certificates with registration submitted.
    pub auth_registration_in_progress: usize,
    /// Active auth certificates.
    pub auth_active: usize,
}

/// Everything the probe learned about one server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Server name.
    pub server: String,
    pub roles: RolesStatus,
    pub version: Option<String>,
    pub global_conf: GlobalConfStatus,
    pub init: InitStatus,
    /// Configured timestamping service names.
    pub timestamping: Vec<String>,
    pub token: TokenStatus,
    pub keys: ItemCounts,
    pub csrs: ItemCounts,
    pub certs: CertCounts,
}

impl StatusSnapshot {
    /// Empty snapshot for a server.
    #[must_use]
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }

    /// Fill token, key, CSR and certificate fields from a token listing.
    ///
    /// A key counts as toolkit-created when its label is one of `toolkit_labels`.
    pub fn apply_token(&mut self, token: &Token, toolkit_labels: &[String]) {
        self.token = TokenStatus {
            id: Some(token.id.clone()),
            status: token.status.clone(),
            logged_in: token.logged_in,
        };

        let mut keys = ItemCounts::default();
        let mut csrs = ItemCounts::default();
        let mut certs = CertCounts::default();

        for key in &token.keys {
            let toolkit = toolkit_labels.iter().any(|label| *label == key.label);

            keys.all.add(key.usage);
            if toolkit {
                keys.toolkit.add(key.usage);
            }

            for _ in &key.certificate_signing_requests {
                csrs.all.add(key.usage);
                if toolkit {
                    csrs.toolkit.add(key.usage);
                }
            }

            for cert in &key.certificates {
                certs.all.add(key.usage);
                if toolkit {
                    certs.toolkit.add(key.usage);
                }
                if key.usage == KeyUsage::Authentication {
                    match cert.status {
                        CertificateStatus::Registered => certs.auth_registered += 1,
                        CertificateStatus::RegistrationInProgress => {
                            certs.auth_registration_in_progress += 1;
                        }
                        _ => {}
                    }
                    if cert.active {
                        certs.auth_active += 1;
                    }
                }
            }
        }

        self.keys = keys;
        self.csrs = csrs;
        self.certs = certs;
    }

    /// One-line human summary, used for the final per-server status line.
    #[must_use]
    pub fn summary(&self) -> String {
        if !self.roles.permitted {
            return format!(
                "roles: denied{}",
                self.roles
                    .error
                    .as_ref()
                    .map(|e| format!(" ({e})"))
                    .unwrap_or_default()
            );
        }
        format!(
            "version: {}, global conf: {}, init: {}, token: {}, keys: {}/{}, certs: {}/{} (registered: {})",
            self.version.as_deref().unwrap_or("-"),
            self.global_conf.status_class,
            if self.init.is_complete() { "done" } else { "pending" },
            if self.token.logged_in { "logged in" } else { "logged out" },
            self.keys.all.auth,
            self.keys.all.sign,
            self.certs.all.auth,
            self.certs.all.sign,
            self.certs.auth_registered,
        )
    }
}
