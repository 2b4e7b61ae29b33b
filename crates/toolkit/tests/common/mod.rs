//! Stateful fake security server for engine and probe tests.
//!
//! Implements just enough of the admin API for the toolkit's operations and
//! records every request so tests can count state-changing calls.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const ALL_ROLES: [&str; 4] = [
    "XROAD_SYSTEM_ADMINISTRATOR",
    "XROAD_SECURITY_OFFICER",
    "XROAD_REGISTRATION_OFFICER",
    "XROAD_SERVICE_ADMINISTRATOR",
];

#[derive(Debug, Clone)]
pub struct FakeCert {
    pub hash: String,
    pub status: &'static str,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct FakeKey {
    pub label: String,
    pub usage: String,
    pub csrs: usize,
    pub certs: Vec<FakeCert>,
}

#[derive(Debug, Clone)]
pub struct FakeClient {
    pub id: String,
    pub member_class: String,
    pub member_code: String,
    pub subsystem_code: Option<String>,
    pub status: &'static str,
}

#[derive(Debug, Clone)]
pub struct FakeDescription {
    pub id: String,
    pub client_id: String,
    pub url: String,
    pub kind: String,
    pub disabled: bool,
    pub service_code: String,
}

#[derive(Debug, Clone)]
pub struct FakeEndpoint {
    pub id: String,
    pub service_id: String,
    pub method: String,
    pub path: String,
}

/// Server-side state.
#[derive(Debug, Clone)]
pub struct FakeState {
    pub roles: Vec<String>,
    pub anchor_imported: bool,
    pub initialized: bool,
    pub logged_in: bool,
    pub global_conf_ok: bool,
    pub approved_tsas: Vec<String>,
    pub timestamping: Vec<String>,
    pub keys: Vec<FakeKey>,
    /// Token reads before a submitted registration shows as `REGISTERED`.
    pub registration_delay: u32,
    pub clients: Vec<FakeClient>,
    pub descriptions: Vec<FakeDescription>,
    pub service_clients: Vec<(String, String)>,
    pub endpoints: Vec<FakeEndpoint>,
    pub endpoint_clients: Vec<(String, String)>,
    /// `(method, path)` of every request received.
    pub requests: Vec<(String, String)>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            roles: ALL_ROLES.iter().map(ToString::to_string).collect(),
            anchor_imported: false,
            initialized: false,
            logged_in: false,
            global_conf_ok: true,
            approved_tsas: vec!["TSA1".into()],
            timestamping: Vec::new(),
            keys: Vec::new(),
            registration_delay: 0,
            clients: vec![FakeClient {
                id: "DEV:GOV:1234".into(),
                member_class: "GOV".into(),
                member_code: "1234".into(),
                subsystem_code: None,
                status: "REGISTERED",
            }],
            descriptions: Vec::new(),
            service_clients: Vec::new(),
            endpoints: Vec::new(),
            endpoint_clients: Vec::new(),
            requests: Vec::new(),
        }
    }
}

impl FakeState {
    fn pending_registrations(&mut self) {
        for cert in self.keys.iter_mut().flat_map(|k| k.certs.iter_mut()) {
            if cert.status == "REGISTRATION_IN_PROGRESS" {
                if self.registration_delay == 0 {
                    cert.status = "REGISTERED";
                } else {
                    self.registration_delay -= 1;
                }
            }
        }
    }

    fn token(&mut self) -> Value {
        self.pending_registrations();
        let keys: Vec<Value> = self
            .keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                json!({
                    "id": format!("key{i}"),
                    "label": key.label,
                    "usage": key.usage,
                    "certificate_signing_requests": (0..key.csrs)
                        .map(|n| json!({"id": format!("csr{i}{n}")}))
                        .collect::<Vec<_>>(),
                    "certificates": key.certs.iter().map(|c| json!({
                        "status": c.status,
                        "active": c.active,
                        "certificate_details": {"hash": c.hash}
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        json!({
            "id": "0",
            "name": "softToken-0",
            "status": "OK",
            "logged_in": self.logged_in,
            "available": true,
            "keys": keys,
        })
    }

    fn client_json(client: &FakeClient) -> Value {
        json!({
            "id": client.id,
            "instance_id": "DEV",
            "member_class": client.member_class,
            "member_code": client.member_code,
            "subsystem_code": client.subsystem_code,
            "owner": client.subsystem_code.is_none(),
            "status": client.status,
        })
    }

    fn description_json(&self, d: &FakeDescription) -> Value {
        let service_id = format!("{}:{}", d.client_id, d.service_code);
        let endpoints: Vec<Value> = self
            .endpoints
            .iter()
            .filter(|e| e.service_id == service_id)
            .map(|e| json!({"id": e.id, "service_code": d.service_code, "method": e.method, "path": e.path}))
            .collect();
        json!({
            "id": d.id,
            "url": d.url,
            "type": d.kind,
            "disabled": d.disabled,
            "services": [{
                "id": service_id,
                "service_code": d.service_code,
                "full_service_code": d.service_code,
                "endpoints": endpoints,
            }],
        })
    }

    fn handle(&mut self, method: &str, path: &str, body: &[u8]) -> ResponseTemplate {
        let ok = || ResponseTemplate::new(200);
        let json_body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        match (method, segments.as_slice()) {
            ("GET", ["user"]) => ok().set_body_json(json!({"username": "api-key-1", "roles": self.roles})),
            ("GET", ["system", "version"]) => ok().set_body_json(json!({"info": "7.4.0"})),
            ("GET", ["diagnostics", "globalconf"]) => ok().set_body_json(json!({
                "status_class": if self.global_conf_ok { "OK" } else { "WAITING" },
                "status_code": if self.global_conf_ok { "SUCCESS" } else { "ERROR_CODE_UNINITIALIZED" },
            })),
            ("GET", ["initialization", "status"]) => ok().set_body_json(json!({
                "is_anchor_imported": self.anchor_imported,
                "is_server_code_initialized": self.initialized,
                "is_server_owner_initialized": self.initialized,
                "software_token_init_status": if self.initialized { "INITIALIZED" } else { "NOT_INITIALIZED" },
            })),
            ("POST", ["system", "anchor"]) => {
                self.anchor_imported = true;
                ResponseTemplate::new(201)
            }
            ("POST", ["initialization"]) => {
                self.initialized = true;
                ok()
            }
            ("GET", ["system", "timestamping-services"]) => ok().set_body_json(
                self.timestamping
                    .iter()
                    .map(|name| json!({"name": name, "url": "http://tsa"}))
                    .collect::<Vec<_>>(),
            ),
            ("GET", ["timestamping-services"]) => ok().set_body_json(
                self.approved_tsas
                    .iter()
                    .map(|name| json!({"name": name, "url": "http://tsa"}))
                    .collect::<Vec<_>>(),
            ),
            ("POST", ["system", "timestamping-services"]) => {
                if let Some(name) = json_body["name"].as_str() {
                    self.timestamping.push(name.to_string());
                }
                ResponseTemplate::new(201)
            }
            ("GET", ["tokens", _]) => {
                let token = self.token();
                ok().set_body_json(token)
            }
            ("PUT", ["tokens", _, "login"]) => {
                self.logged_in = true;
                ok()
            }
            ("GET", ["xroad-instances"]) => ok().set_body_json(json!(["DEV"])),
            ("GET", ["certificate-authorities"]) => {
                ok().set_body_json(json!([{"name": "TEST-CA", "authentication_only": false}]))
            }
            ("POST", ["tokens", _, "keys-with-csrs"]) => {
                self.keys.push(FakeKey {
                    label: json_body["key_label"].as_str().unwrap_or_default().to_string(),
                    usage: json_body["csr_generate_request"]["key_usage_type"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    csrs: 1,
                    certs: Vec::new(),
                });
                ResponseTemplate::new(201)
            }
            ("POST", ["token-certificates"]) => {
                // Fake certificate files contain the key usage.
                let usage = String::from_utf8_lossy(body).trim().to_string();
                let Some(key) = self.keys.iter_mut().find(|k| k.usage == usage) else {
                    return ResponseTemplate::new(400)
                        .set_body_json(json!({"error": {"code": "csr_not_found"}}));
                };
                key.csrs = 0;
                key.certs.push(FakeCert {
                    hash: format!("HASH-{usage}"),
                    status: "SAVED",
                    active: usage != "AUTHENTICATION",
                });
                ResponseTemplate::new(201)
            }
            ("PUT", ["token-certificates", hash, action]) => {
                let Some(cert) = self
                    .keys
                    .iter_mut()
                    .flat_map(|k| k.certs.iter_mut())
                    .find(|c| c.hash == *hash)
                else {
                    return ResponseTemplate::new(404);
                };
                match *action {
                    "register" => cert.status = "REGISTRATION_IN_PROGRESS",
                    "activate" => cert.active = true,
                    _ => return ResponseTemplate::new(404),
                }
                ok()
            }
            ("GET", ["clients"]) => ok().set_body_json(
                self.clients.iter().map(Self::client_json).collect::<Vec<_>>(),
            ),
            ("POST", ["clients"]) => {
                let client = &json_body["client"];
                let class = client["member_class"].as_str().unwrap_or_default();
                let code = client["member_code"].as_str().unwrap_or_default();
                let subsystem = client["subsystem_code"].as_str();
                let id = match subsystem {
                    Some(s) => format!("DEV:{class}:{code}:{s}"),
                    None => format!("DEV:{class}:{code}"),
                };
                self.clients.push(FakeClient {
                    id,
                    member_class: class.to_string(),
                    member_code: code.to_string(),
                    subsystem_code: subsystem.map(str::to_string),
                    status: "SAVED",
                });
                ResponseTemplate::new(201)
            }
            ("PUT", ["clients", id, "register"]) => {
                if let Some(client) = self.clients.iter_mut().find(|c| c.id == *id) {
                    client.status = "REGISTRATION_IN_PROGRESS";
                }
                ok()
            }
            ("GET", ["clients", id, "service-descriptions"]) => {
                let list: Vec<Value> = self
                    .descriptions
                    .iter()
                    .filter(|d| d.client_id == *id)
                    .map(|d| self.description_json(d))
                    .collect();
                ok().set_body_json(list)
            }
            ("POST", ["clients", id, "service-descriptions"]) => {
                let n = self.descriptions.len();
                self.descriptions.push(FakeDescription {
                    id: format!("{}", n + 1),
                    client_id: (*id).to_string(),
                    url: json_body["url"].as_str().unwrap_or_default().to_string(),
                    kind: json_body["type"].as_str().unwrap_or_default().to_string(),
                    disabled: true,
                    service_code: json_body["rest_service_code"]
                        .as_str()
                        .unwrap_or("wsdl-service")
                        .to_string(),
                });
                ResponseTemplate::new(201)
            }
            ("PUT", ["service-descriptions", id, "enable"]) => {
                if let Some(d) = self.descriptions.iter_mut().find(|d| d.id == *id) {
                    d.disabled = false;
                }
                ok()
            }
            ("GET", ["services", id, "service-clients"]) => ok().set_body_json(
                self.service_clients
                    .iter()
                    .filter(|(s, _)| s.as_str() == *id)
                    .map(|(_, c)| json!({"id": c, "service_client_type": "SUBSYSTEM"}))
                    .collect::<Vec<_>>(),
            ),
            ("POST", ["services", id, "service-clients"]) => {
                for item in json_body["items"].as_array().into_iter().flatten() {
                    if let Some(c) = item["id"].as_str() {
                        self.service_clients.push(((*id).to_string(), c.to_string()));
                    }
                }
                ok()
            }
            ("POST", ["services", id, "endpoints"]) => {
                let endpoint = FakeEndpoint {
                    id: format!("ep{}", self.endpoints.len() + 1),
                    service_id: (*id).to_string(),
                    method: json_body["method"].as_str().unwrap_or_default().to_string(),
                    path: json_body["path"].as_str().unwrap_or_default().to_string(),
                };
                let response = json!({
                    "id": endpoint.id,
                    "service_code": json_body["service_code"],
                    "method": endpoint.method,
                    "path": endpoint.path,
                });
                self.endpoints.push(endpoint);
                ResponseTemplate::new(201).set_body_json(response)
            }
            ("GET", ["endpoints", id, "service-clients"]) => ok().set_body_json(
                self.endpoint_clients
                    .iter()
                    .filter(|(e, _)| e.as_str() == *id)
                    .map(|(_, c)| json!({"id": c, "service_client_type": "SUBSYSTEM"}))
                    .collect::<Vec<_>>(),
            ),
            ("POST", ["endpoints", id, "service-clients"]) => {
                for item in json_body["items"].as_array().into_iter().flatten() {
                    if let Some(c) = item["id"].as_str() {
                        self.endpoint_clients.push(((*id).to_string(), c.to_string()));
                    }
                }
                ok()
            }
            _ => ResponseTemplate::new(404),
        }
    }
}

/// Responder sharing state with the test.
#[derive(Clone, Default)]
pub struct FakeSecurityServer {
    pub state: Arc<Mutex<FakeState>>,
}

impl Respond for FakeSecurityServer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let method = request.method.as_str().to_string();
        let path = request
            .url
            .path()
            .strip_prefix("/api/v1")
            .unwrap_or(request.url.path())
            .to_string();

        let mut state = self.state.lock().unwrap();
        state.requests.push((method.clone(), path.clone()));
        state.handle(&method, &path, &request.body)
    }
}

impl FakeSecurityServer {
    pub fn with_state(state: FakeState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Start a mock server backed by this fake.
    pub async fn start(&self) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(self.clone())
            .mount(&server)
            .await;
        server
    }

    pub fn snapshot(&self) -> FakeState {
        self.state.lock().unwrap().clone()
    }

    /// State-changing requests received so far.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.snapshot()
            .requests
            .into_iter()
            .filter(|(method, _)| method != "GET")
            .collect()
    }

    /// Requests received for a path.
    pub fn count(&self, method: &str, path: &str) -> usize {
        self.snapshot()
            .requests
            .iter()
            .filter(|(m, p)| m == method && p == path)
            .count()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }
}

/// Temporary anchor and certificate files.
pub struct Files {
    pub dir: tempfile::TempDir,
}

impl Files {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("anchor.xml"), "<anchor/>").unwrap();
        std::fs::write(dir.path().join("auth.pem"), "AUTHENTICATION").unwrap();
        std::fs::write(dir.path().join("sign.pem"), "SIGNING").unwrap();
        Self { dir }
    }

    pub fn path(&self, name: &str) -> String {
        self.dir.path().join(name).display().to_string()
    }
}

/// YAML for one fully specified server entry.
pub fn server_yaml(name: &str, url: &str, api_key: &str, pin: &str, files: &Files) -> String {
    format!(
        r"
  - name: {name}
    url: {url}
    api_key: '{api_key}'
    configuration_anchor: {anchor}
    owner_dn_country: FI
    owner_dn_org: ORG
    owner_member_class: GOV
    owner_member_code: '1234'
    security_server_code: SS1
    software_token_id: 0
    software_token_pin: '{pin}'
    fqdn: {name}.example.org
    certificates: [{auth}, {sign}]
",
        anchor = files.path("anchor.xml"),
        auth = files.path("auth.pem"),
        sign = files.path("sign.pem"),
    )
}

/// Header shared by test configurations.
pub const CONFIG_HEADER: &str = r"
connection:
  connect_timeout_secs: 2
  timeout_secs: 5
rate_limit:
  calls_per_second: 1000
  calls_per_minute: 100000
";
