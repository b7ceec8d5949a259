//! Status command implementation

use crate::config::Config;
use crate::state::{PersistedState, StateStore};
use clap::Args;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// List every tracked market
    #[arg(short, long)]
    pub verbose: bool,
}

impl StatusArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = StateStore::new(&config.state.path);
        let state = store.load()?;
        print!("{}", self.render(&state, &store));
        Ok(())
    }

    fn render(&self, state: &PersistedState, store: &StateStore) -> String {
        let mut out = String::new();
        out.push_str("poly-notify status\n");
        out.push_str(&format!("  State file: {}\n", store.path().display()));
        match &state.cursor {
            Some(cursor) => out.push_str(&format!(
                "  Cursor: {} (sequence {}, {})\n",
                cursor.token,
                cursor.sequence,
                if cursor.full { "full pass" } else { "tail" }
            )),
            None => out.push_str("  Cursor: none\n"),
        }
        out.push_str(&format!(
            "  Full passes: {} (bootstrapped: {})\n",
            state.full_pass, state.bootstrapped
        ));
        out.push_str(&format!("  Known markets: {}\n", state.seen.len()));
        out.push_str(&format!("  Tracked markets: {}\n", state.tracked.len()));
        out.push_str(&format!(
            "  Watermarks: {}\n",
            state.watermarks.values().map(|b| b.len()).sum::<usize>()
        ));
        out.push_str(&format!("  Pending notifications: {}\n", state.outbox.len()));

        if let Some(oldest) = state.outbox.iter().map(|q| q.queued_at).min() {
            out.push_str(&format!("  Oldest pending: {}\n", oldest.to_rfc3339()));
        }

        if self.verbose {
            for market in state.tracked.values() {
                out.push_str(&format!("    {}  {}\n", market.condition_id, market.question));
            }
        }
        out
    }
}
