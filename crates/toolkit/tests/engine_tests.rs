//! End-to-end tests of the auto-configuration engine against fake servers.

mod common;

use std::sync::Arc;

use common::{server_yaml, FakeSecurityServer, FakeState, Files, CONFIG_HEADER};
use ss_admin::RateLimiter;
use sstk_cli::{AutoConfigEngine, Config, OperationGraph, OperationKind, WalkOutcome};
use tokio_util::sync::CancellationToken;

fn engine(config: &Config) -> AutoConfigEngine {
    AutoConfigEngine::new(
        OperationGraph::build(),
        Arc::new(RateLimiter::new(config.rate_limit)),
        CancellationToken::new(),
    )
}

const CLIENTS: &str = r"
    clients:
      - member_class: GOV
        member_code: '1234'
        subsystem_code: TEST
        connection_type: HTTP
        service_descriptions:
          - url: https://example.org/openapi.yaml
            type: OPENAPI3
            rest_service_code: pets
            access: [CONSUMER]
            endpoints:
              - path: /pets
                method: get
                access: [CONSUMER]
";

#[tokio::test]
async fn test_second_server_without_key_is_skipped_without_requests() {
    let files = Files::new();
    let first = FakeSecurityServer::default();
    let second = FakeSecurityServer::default();
    let first_server = first.start().await;
    let second_server = second.start().await;

    let yaml = format!(
        "{CONFIG_HEADER}security_server:{}{}",
        server_yaml("ss1", &format!("{}/api/v1", first_server.uri()), "key-1", "1234", &files),
        server_yaml("ss2", &format!("{}/api/v1", second_server.uri()), "", "1234", &files),
    );
    let config = Config::from_yaml(&yaml).unwrap();

    let report = engine(&config).auto(&config).await;

    let ss1 = report.run("ss1").unwrap();
    let snapshot = ss1.snapshot.as_ref().unwrap();
    assert!(snapshot.init.is_complete());
    assert!(snapshot.token.logged_in);

    let ss2 = report.run("ss2").unwrap();
    assert!(matches!(ss2.outcome, WalkOutcome::Skipped { .. }));
    assert!(ss2.snapshot.is_none());
    assert!(second_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_pin_blocks_init_and_descendants() {
    let files = Files::new();
    let fake = FakeSecurityServer::default();
    let server = fake.start().await;

    let yaml = format!(
        "{CONFIG_HEADER}security_server:{}",
        server_yaml("ss1", &format!("{}/api/v1", server.uri()), "key-1", "", &files),
    );
    let config = Config::from_yaml(&yaml).unwrap();

    let report = engine(&config).auto(&config).await;
    let run = report.run("ss1").unwrap();

    assert!(run.attempted.is_empty());
    assert!(fake.writes().is_empty());
    assert_eq!(fake.count("POST", "/initialization"), 0);
    assert!(run
        .validation_errors
        .iter()
        .any(|e| e.key == "security_server.software_token_pin"));
    match &run.outcome {
        WalkOutcome::Blocked { operations } => {
            assert_eq!(operations[0], OperationKind::Init);
            assert!(operations.contains(&OperationKind::TokenLogin));
            assert!(operations.contains(&OperationKind::GlobalConfOk));
        }
        other => panic!("Expected blocked outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_walk_stops_at_unobserved_registration() {
    let files = Files::new();
    let fake = FakeSecurityServer::with_state(FakeState {
        registration_delay: 100,
        ..FakeState::default()
    });
    let server = fake.start().await;

    let yaml = format!(
        "{CONFIG_HEADER}security_server:{}",
        server_yaml("ss1", &format!("{}/api/v1", server.uri()), "key-1", "1234", &files),
    );
    let config = Config::from_yaml(&yaml).unwrap();

    let report = engine(&config).auto(&config).await;
    let run = report.run("ss1").unwrap();

    assert_eq!(
        run.outcome,
        WalkOutcome::Pending {
            operation: OperationKind::CertRegister
        }
    );
    assert_eq!(
        run.attempted,
        vec![
            OperationKind::Init,
            OperationKind::TokenLogin,
            OperationKind::TimestampEnable,
            OperationKind::KeysAndCsrs,
            OperationKind::CertImport,
            OperationKind::CertRegister,
        ]
    );
    assert_eq!(fake.count("PUT", "/token-certificates/HASH-AUTHENTICATION/activate"), 0);

    let state = fake.snapshot();
    let labels: Vec<&str> = state.keys.iter().map(|k| k.label.as_str()).collect();
    assert_eq!(labels, vec!["ss1-default-auth-key", "ss1-default-sign-key"]);
    assert_eq!(state.timestamping, vec!["TSA1"]);
}

#[tokio::test]
async fn test_full_walk_then_second_run_is_idempotent() {
    let files = Files::new();
    let fake = FakeSecurityServer::default();
    let server = fake.start().await;

    let yaml = format!(
        "{CONFIG_HEADER}security_server:{}{CLIENTS}",
        server_yaml("ss1", &format!("{}/api/v1", server.uri()), "key-1", "1234", &files),
    );
    let config = Config::from_yaml(&yaml).unwrap();
    let engine = engine(&config);

    let first = engine.auto(&config).await;
    assert_eq!(first.run("ss1").unwrap().outcome, WalkOutcome::Complete);

    let state = fake.snapshot();
    assert!(state
        .clients
        .iter()
        .any(|c| c.id == "DEV:GOV:1234:TEST" && c.status == "REGISTRATION_IN_PROGRESS"));
    assert_eq!(state.descriptions.len(), 1);
    assert!(!state.descriptions[0].disabled);
    assert_eq!(
        state.service_clients,
        vec![(
            "DEV:GOV:1234:TEST:pets".to_string(),
            "DEV:GOV:1234:CONSUMER".to_string()
        )]
    );
    assert_eq!(state.endpoints.len(), 1);
    assert_eq!(state.endpoints[0].method, "GET");
    assert_eq!(state.endpoint_clients.len(), 1);

    fake.clear_requests();
    let second = engine.auto(&config).await;

    assert_eq!(second.run("ss1").unwrap().outcome, WalkOutcome::Complete);
    assert!(
        fake.writes().is_empty(),
        "unexpected writes: {:?}",
        fake.writes()
    );
}

#[tokio::test]
async fn test_key_without_roles_is_denied_before_any_write() {
    let files = Files::new();
    let fake = FakeSecurityServer::with_state(FakeState {
        roles: vec!["XROAD_SECURITY_OFFICER".into()],
        ..FakeState::default()
    });
    let server = fake.start().await;

    let yaml = format!(
        "{CONFIG_HEADER}security_server:{}",
        server_yaml("ss1", &format!("{}/api/v1", server.uri()), "key-1", "1234", &files),
    );
    let config = Config::from_yaml(&yaml).unwrap();
    let engine = engine(&config);

    let report = engine.auto(&config).await;
    let run = report.run("ss1").unwrap();

    assert!(matches!(run.outcome, WalkOutcome::Denied { .. }));
    assert!(run.attempted.is_empty());
    assert!(!run.snapshot.as_ref().unwrap().roles.permitted);
    assert_eq!(report.failed_count(), 1);
    assert!(fake.writes().is_empty());
    assert_eq!(
        fake.snapshot().requests,
        vec![("GET".to_string(), "/user".to_string())]
    );

    fake.clear_requests();
    let applied = engine
        .apply(&config, OperationKind::Init, Some("ss1"))
        .await;
    assert!(matches!(applied.runs[0].outcome, WalkOutcome::Denied { .. }));
    assert!(fake.writes().is_empty());

    let status = engine.status(&config).await;
    assert!(matches!(
        status.run("ss1").unwrap().outcome,
        WalkOutcome::Denied { .. }
    ));
}

#[tokio::test]
async fn test_newly_declared_timestamping_service_is_added() {
    let files = Files::new();
    let fake = FakeSecurityServer::with_state(FakeState {
        approved_tsas: vec!["TSA1".into(), "TSA2".into()],
        ..FakeState::default()
    });
    let server = fake.start().await;
    let entry = server_yaml("ss1", &format!("{}/api/v1", server.uri()), "key-1", "1234", &files);

    let first = Config::from_yaml(&format!(
        "{CONFIG_HEADER}security_server:{entry}    timestamping_services: [TSA1]\n"
    ))
    .unwrap();
    let engine = engine(&first);
    assert_eq!(engine.auto(&first).await.run("ss1").unwrap().outcome, WalkOutcome::Complete);
    assert_eq!(fake.snapshot().timestamping, vec!["TSA1"]);

    fake.clear_requests();
    let second = Config::from_yaml(&format!(
        "{CONFIG_HEADER}security_server:{entry}    timestamping_services: [TSA1, TSA2]\n"
    ))
    .unwrap();
    let report = engine.auto(&second).await;

    assert_eq!(report.run("ss1").unwrap().outcome, WalkOutcome::Complete);
    assert!(report
        .run("ss1")
        .unwrap()
        .attempted
        .contains(&OperationKind::TimestampEnable));
    assert_eq!(fake.snapshot().timestamping, vec!["TSA1", "TSA2"]);
    assert_eq!(
        fake.writes(),
        vec![(
            "POST".to_string(),
            "/system/timestamping-services".to_string()
        )]
    );
}

#[tokio::test]
async fn test_poll_mode_waits_for_registration() {
    let files = Files::new();
    let fake = FakeSecurityServer::with_state(FakeState {
        registration_delay: 2,
        ..FakeState::default()
    });
    let server = fake.start().await;

    let yaml = format!(
        "{CONFIG_HEADER}auto:\n  mode: poll\n  poll:\n    max_attempts: 5\n    initial_delay_secs: 0\nsecurity_server:{}",
        server_yaml("ss1", &format!("{}/api/v1", server.uri()), "key-1", "1234", &files),
    );
    let config = Config::from_yaml(&yaml).unwrap();

    let report = engine(&config).auto(&config).await;
    let run = report.run("ss1").unwrap();

    assert_eq!(run.outcome, WalkOutcome::Complete);
    assert!(run.attempted.contains(&OperationKind::CertActivate));
    assert_eq!(
        fake.count("PUT", "/token-certificates/HASH-AUTHENTICATION/register"),
        1
    );
}

#[tokio::test]
async fn test_apply_runs_single_operation() {
    let files = Files::new();
    let fake = FakeSecurityServer::default();
    let server = fake.start().await;

    let yaml = format!(
        "{CONFIG_HEADER}security_server:{}",
        server_yaml("ss1", &format!("{}/api/v1", server.uri()), "key-1", "1234", &files),
    );
    let config = Config::from_yaml(&yaml).unwrap();

    let report = engine(&config)
        .apply(&config, OperationKind::Init, Some("ss1"))
        .await;

    assert_eq!(report.runs.len(), 1);
    assert_eq!(report.runs[0].outcome, WalkOutcome::Complete);
    assert_eq!(
        fake.writes(),
        vec![
            ("POST".to_string(), "/system/anchor".to_string()),
            ("POST".to_string(), "/initialization".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_status_names_next_step() {
    let files = Files::new();
    let fake = FakeSecurityServer::with_state(FakeState {
        anchor_imported: true,
        initialized: true,
        ..FakeState::default()
    });
    let server = fake.start().await;

    let yaml = format!(
        "{CONFIG_HEADER}security_server:{}",
        server_yaml("ss1", &format!("{}/api/v1", server.uri()), "key-1", "1234", &files),
    );
    let config = Config::from_yaml(&yaml).unwrap();

    let report = engine(&config).status(&config).await;

    assert_eq!(
        report.run("ss1").unwrap().outcome,
        WalkOutcome::Pending {
            operation: OperationKind::TokenLogin
        }
    );
    assert!(fake.writes().is_empty());
}
