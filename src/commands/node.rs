//! Node-side agent: runs on an app node at boot.

use nodeboot::backend::docker::DockerRuntime;
use nodeboot::{BootstrapPayload, Journal, Reconciler};
use std::path::Path;

use crate::Context;
use crate::ui;

/// Reconcile this node to a running container; returns the process exit code
pub fn bootstrap(ctx: &Context, payload_path: &Path, journal_path: &Path) -> i32 {
    let mut journal = match Journal::open(journal_path) {
        Ok(journal) => journal,
        Err(e) => {
            log::warn!("journal {} unavailable ({e}), logging only", journal_path.display());
            Journal::log_only()
        }
    };

    let payload = match BootstrapPayload::load(payload_path) {
        Ok(payload) => payload,
        Err(e) => {
            let message = format!("cannot load payload {}: {e}", payload_path.display());
            if let Err(e) = journal.record("failed", &message) {
                log::error!("journal write failed: {e}");
            }
            ui::error(&message);
            return 1;
        }
    };

    let outcome = Reconciler::new(DockerRuntime::new(), journal).run(&payload);
    if outcome.is_success() {
        if !ctx.quiet {
            let id = outcome.container_id.as_deref().unwrap_or("unknown");
            ui::success(&format!("{} running ({id})", payload.container_name));
        }
    } else {
        let cause = outcome.error.as_deref().unwrap_or("unknown error");
        let reached: Vec<&str> = outcome.history.iter().map(|s| s.as_str()).collect();
        ui::error(&format!("bootstrap failed after {}: {cause}", reached.join(" -> ")));
    }
    outcome.exit_code()
}
