//! Status table rendering.

use comfy_table::{Cell, Color, ContentArrangement, Table};

use crate::engine::{ServerRun, WalkOutcome};
use crate::status::{StatusSnapshot, UsageCounts};

const HEADER: [&str; 11] = [
    "SERVER", "ROLES", "VERSION", "GLOBAL", "INIT", "TSAS", "TOKEN", "KEYS", "CSRS", "CERTS",
    "RESULT",
];

fn counts(all: UsageCounts, toolkit: UsageCounts) -> String {
    format!(
        "{}/{} ({}/{})",
        all.auth, all.sign, toolkit.auth, toolkit.sign
    )
}

fn init_cell(snapshot: &StatusSnapshot) -> String {
    let init = &snapshot.init;
    if init.is_complete() {
        return "OK".to_string();
    }
    let missing: Vec<&str> = [
        (!init.anchor_imported, "anchor"),
        (!init.server_code_initialized, "code"),
        (!init.owner_initialized, "owner"),
        (
            init.token_init_status != ss_admin::models::TokenInitStatus::Initialized,
            "token",
        ),
    ]
    .into_iter()
    .filter_map(|(missing, label)| missing.then_some(label))
    .collect();
    format!("missing {}", missing.join(","))
}

/// Cell texts for one run, in header order.
fn row(run: &ServerRun) -> Vec<String> {
    let Some(snapshot) = &run.snapshot else {
        let mut cells = vec![run.name.clone()];
        cells.extend(std::iter::repeat("-".to_string()).take(HEADER.len() - 2));
        cells.push(run.outcome.to_string());
        return cells;
    };

    if !snapshot.roles.permitted {
        let mut cells = vec![run.name.clone(), "DENIED".to_string()];
        cells.extend(std::iter::repeat("-".to_string()).take(HEADER.len() - 3));
        cells.push(run.outcome.to_string());
        return cells;
    }

    let token = match (&snapshot.token.id, snapshot.token.logged_in) {
        (None, _) => "-".to_string(),
        (Some(_), true) => "logged in".to_string(),
        (Some(_), false) => "logged out".to_string(),
    };
    let certs = &snapshot.certs;

    vec![
        run.name.clone(),
        "OK".to_string(),
        snapshot.version.clone().unwrap_or_else(|| "-".to_string()),
        snapshot.global_conf.status_class.to_string(),
        init_cell(snapshot),
        if snapshot.timestamping.is_empty() {
            "-".to_string()
        } else {
            snapshot.timestamping.join(",")
        },
        token,
        counts(snapshot.keys.all, snapshot.keys.toolkit),
        counts(snapshot.csrs.all, snapshot.csrs.toolkit),
        format!(
            "{} reg:{} act:{}",
            counts(certs.all, certs.toolkit),
            certs.auth_registered,
            certs.auth_active
        ),
        run.outcome.to_string(),
    ]
}

fn outcome_color(outcome: &WalkOutcome) -> Color {
    match outcome {
        WalkOutcome::Complete => Color::Green,
        WalkOutcome::Pending { .. } => Color::Yellow,
        WalkOutcome::Skipped { .. } | WalkOutcome::Cancelled => Color::DarkGrey,
        WalkOutcome::Blocked { .. } | WalkOutcome::Failed { .. } | WalkOutcome::Denied { .. } => {
            Color::Red
        }
    }
}

/// Render one row per server.
#[must_use]
pub fn render(runs: &[ServerRun]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(HEADER.iter().map(|h| Cell::new(h).fg(Color::Cyan)));

    for run in runs {
        let mut cells: Vec<Cell> = row(run).into_iter().map(Cell::new).collect();
        if let Some(result) = cells.pop() {
            cells.push(result.fg(outcome_color(&run.outcome)));
        }
        table.add_row(cells);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OperationKind;

    fn run(name: &str, snapshot: Option<StatusSnapshot>, outcome: WalkOutcome) -> ServerRun {
        ServerRun {
            name: name.into(),
            snapshot,
            outcome,
            attempted: Vec::new(),
            validation_errors: Vec::new(),
        }
    }

    #[test]
    fn test_skipped_row() {
        let cells = row(&run(
            "ss2",
            None,
            WalkOutcome::Skipped {
                reason: "no API key".into(),
            },
        ));
        assert_eq!(cells.len(), HEADER.len());
        assert_eq!(cells[0], "ss2");
        assert_eq!(cells[1], "-");
        assert_eq!(cells[10], "SKIPPED");
    }

    #[test]
    fn test_denied_row() {
        let cells = row(&run("ss1", Some(StatusSnapshot::new("ss1")), WalkOutcome::Complete));
        assert_eq!(cells.len(), HEADER.len());
        assert_eq!(cells[1], "DENIED");
    }

    #[test]
    fn test_pending_row() {
        let mut snapshot = StatusSnapshot::new("ss1");
        snapshot.roles.permitted = true;
        snapshot.version = Some("7.4.0".into());
        snapshot.init.anchor_imported = true;
        snapshot.timestamping.push("TSA1".into());
        snapshot.keys.all = UsageCounts { auth: 1, sign: 1 };
        snapshot.keys.toolkit = UsageCounts { auth: 1, sign: 1 };

        let cells = row(&run(
            "ss1",
            Some(snapshot),
            WalkOutcome::Pending {
                operation: OperationKind::CertImport,
            },
        ));
        assert_eq!(cells[2], "7.4.0");
        assert_eq!(cells[3], "UNKNOWN");
        assert_eq!(cells[4], "missing code,owner,token");
        assert_eq!(cells[5], "TSA1");
        assert_eq!(cells[6], "-");
        assert_eq!(cells[7], "1/1 (1/1)");
        assert_eq!(cells[10], "PENDING CERT_IMPORT");
    }

    #[test]
    fn test_render_has_a_row_per_run() {
        let runs = [
            run("ss1", None, WalkOutcome::Complete),
            run("ss2", None, WalkOutcome::Cancelled),
        ];
        let rendered = render(&runs).to_string();
        assert!(rendered.contains("SERVER"));
        assert!(rendered.contains("ss1"));
        assert!(rendered.contains("CANCELLED"));
    }
}
