//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use slotwise_workflow::{ApprovalState, Intent};

#[derive(Parser)]
#[command(
    name = "slotwise",
    version,
    about = "Slotwise -- schedule habits and tasks into your calendar",
    long_about = "Describe a habit or a task in plain language; Slotwise finds free time \
                  in your calendar, proposes slots and books them once you approve."
)]
pub struct Cli {
    /// Configuration file (TOML, or JSON by extension).
    #[arg(long, short, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Address to bind to, overriding the config file.
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on, overriding the config file.
        #[arg(long, short)]
        port: Option<u16>,

        #[command(flatten)]
        backend: BackendArgs,
    },

    /// Send one message, resuming a paused run from the state file if present.
    Chat(ChatArgs),

    /// Interactive session that keeps the paused run in memory.
    Repl {
        #[command(flatten)]
        backend: BackendArgs,
    },

    /// Print the effective configuration with secrets masked.
    Config,
}

#[derive(Args)]
pub struct BackendArgs {
    /// Use an in-memory calendar instead of CalDAV.
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args)]
pub struct ChatArgs {
    /// The message to send.
    pub message: String,

    /// Where a paused run is kept between calls.
    #[arg(long, default_value = ".slotwise-run.json")]
    pub state: PathBuf,

    /// Approve the proposed slots.
    #[arg(long, conflicts_with_all = ["reject", "changes"])]
    pub approve: bool,

    /// Reject the proposal.
    #[arg(long, conflicts_with = "changes")]
    pub reject: bool,

    /// Ask for changes, e.g. "not on Tuesdays".
    #[arg(long, value_name = "FEEDBACK")]
    pub changes: Option<String>,

    /// Skip intent classification.
    #[arg(long, value_enum)]
    pub intent: Option<IntentArg>,

    /// Print the full result as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub backend: BackendArgs,
}

impl ChatArgs {
    /// The explicit decision, if any flag gave one.
    pub fn decision(&self) -> Option<ApprovalState> {
        if self.approve {
            Some(ApprovalState::Approved)
        } else if self.reject {
            Some(ApprovalState::Rejected)
        } else if self.changes.is_some() {
            Some(ApprovalState::ChangesRequested)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum IntentArg {
    Habit,
    Task,
    Analysis,
}

impl From<IntentArg> for Intent {
    fn from(arg: IntentArg) -> Self {
        match arg {
            IntentArg::Habit => Intent::HabitSchedule,
            IntentArg::Task => Intent::TaskSchedule,
            IntentArg::Analysis => Intent::CalendarAnalysis,
        }
    }
}
