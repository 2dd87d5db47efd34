//! CLI argument parsing for tollgate.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tollgate::model::{OwnerType, Target};

/// tollgate: audit trail, target locks and cooperative cancellation for
/// control-plane operations.
///
/// Every guarded operation is an event:
/// - opening it takes the lock on its target (fail-fast, never queued)
/// - closing it records the outcome and releases the target
/// - any process sharing the store may ask it to cancel
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Store root (default: $TOLLGATE_STORE, then ./.tollgate).
    #[arg(long, global = true, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Caller identity used for authorization and as event owner
    /// (default: $USER@host).
    #[arg(long = "as", global = true, value_name = "CALLER")]
    pub caller: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for tollgate.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize the store.
    ///
    /// Creates the store directories and a default config.yaml. Safe to run
    /// more than once.
    Init,

    /// Query, cancel and run events.
    Event(EventCommand),

    /// Manage blocks that forbid matching operations.
    Block(BlockCommand),

    /// Inspect or clear target locks.
    Lock(LockCommand),

    /// Show the transition journal.
    Journal(JournalArgs),
}

/// Event subcommands.
#[derive(Parser, Debug)]
pub struct EventCommand {
    #[command(subcommand)]
    pub action: EventAction,
}

#[derive(Subcommand, Debug)]
pub enum EventAction {
    /// List events visible to the caller, newest first.
    List(EventListArgs),

    /// List every kind ever recorded.
    Kinds(OutputArgs),

    /// Show one event.
    Info(EventInfoArgs),

    /// Ask a running event to cancel.
    Cancel(EventCancelArgs),

    /// Run a command as a guarded operation.
    ///
    /// Opens an event on the target, runs the command, polls for
    /// cancellation requests while it runs and closes the event with the
    /// outcome.
    Run(EventRunArgs),
}

#[derive(Parser, Debug, Default)]
pub struct OutputArgs {
    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `event list`.
#[derive(Parser, Debug, Default)]
pub struct EventListArgs {
    #[arg(long)]
    pub target_type: Option<String>,

    #[arg(long)]
    pub target_value: Option<String>,

    /// Kind names; an event matches if its kind is any of them.
    #[arg(long = "kind", value_delimiter = ',')]
    pub kinds: Vec<String>,

    #[arg(long)]
    pub owner_type: Option<OwnerType>,

    #[arg(long = "owner")]
    pub owner_name: Option<String>,

    /// Only events started at or after this RFC3339 time.
    #[arg(long, value_parser = parse_time)]
    pub since: Option<DateTime<Utc>>,

    /// Only events started at or before this RFC3339 time.
    #[arg(long, value_parser = parse_time)]
    pub until: Option<DateTime<Utc>>,

    /// Only running (true) or finished (false) events.
    #[arg(long, action = ArgAction::Set)]
    pub running: Option<bool>,

    /// Only events that finished with an error.
    #[arg(long)]
    pub errors_only: bool,

    #[arg(long, default_value_t = 0)]
    pub skip: usize,

    #[arg(long)]
    pub limit: Option<usize>,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Arguments for `event info`.
#[derive(Parser, Debug)]
pub struct EventInfoArgs {
    pub id: String,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Arguments for `event cancel`.
#[derive(Parser, Debug)]
pub struct EventCancelArgs {
    pub id: String,

    /// Why the event should stop (required).
    #[arg(short, long)]
    pub reason: String,
}

/// Arguments for `event run`.
#[derive(Parser, Debug)]
pub struct EventRunArgs {
    /// Target to lock, as type:value (e.g. app:foo).
    #[arg(long)]
    pub target: Target,

    /// Kind of the operation (e.g. app.deploy).
    #[arg(long)]
    pub kind: String,

    /// Start payload entries, as key=value.
    #[arg(long = "data", value_name = "KEY=VALUE")]
    pub data: Vec<String>,

    /// Refuse cancellation requests for this event.
    #[arg(long)]
    pub no_cancel: bool,

    /// Command line to execute (split with shell quoting rules).
    #[arg(long)]
    pub command: String,
}

/// Block subcommands.
#[derive(Parser, Debug)]
pub struct BlockCommand {
    #[command(subcommand)]
    pub action: BlockAction,
}

#[derive(Subcommand, Debug)]
pub enum BlockAction {
    /// List blocks, newest first.
    List(BlockListArgs),

    /// Add a block. Empty patterns match anything.
    Add(BlockAddArgs),

    /// Deactivate a block.
    Remove(BlockRemoveArgs),
}

#[derive(Parser, Debug, Default)]
pub struct BlockListArgs {
    /// Only active (true) or inactive (false) blocks.
    #[arg(long, action = ArgAction::Set)]
    pub active: Option<bool>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug, Default)]
pub struct BlockAddArgs {
    #[arg(long = "kind", default_value = "")]
    pub kind_name: String,

    #[arg(long = "owner", default_value = "")]
    pub owner_name: String,

    #[arg(long, default_value = "")]
    pub target_type: String,

    #[arg(long, default_value = "")]
    pub target_value: String,

    /// Why the block exists (required).
    #[arg(short, long)]
    pub reason: String,
}

#[derive(Parser, Debug)]
pub struct BlockRemoveArgs {
    pub id: String,
}

/// Lock subcommands.
#[derive(Parser, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

/// Available lock actions.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// List all held target locks.
    ///
    /// Shows the holder event, owner and age of each lock.
    List,

    /// Clear the lock on a target and close its orphaned event.
    ///
    /// Requires --force flag to prevent accidental clearing.
    Clear(LockClearArgs),
}

/// Arguments for the `lock clear` command.
#[derive(Parser, Debug)]
pub struct LockClearArgs {
    /// Target whose lock should be cleared, as type:value.
    pub target: Target,

    /// Force clearing the lock (required for safety).
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `journal` command.
#[derive(Parser, Debug, Default)]
pub struct JournalArgs {
    /// Only show the last N entries.
    #[arg(long)]
    pub tail: Option<usize>,

    /// Print raw NDJSON lines.
    #[arg(long)]
    pub json: bool,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("'{}' is not an RFC3339 time: {}", raw, e))
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["tollgate", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init));
        assert!(cli.store.is_none());
        assert!(cli.caller.is_none());
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tollgate", "lock", "list", "--store", "/tmp/s", "--as", "bob",
        ])
        .unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/s")));
        assert_eq!(cli.caller.as_deref(), Some("bob"));
    }

    #[test]
    fn parse_event_list_filters() {
        let cli = Cli::try_parse_from([
            "tollgate",
            "event",
            "list",
            "--target-type",
            "app",
            "--kind",
            "app.deploy,app.restart",
            "--owner-type",
            "user",
            "--since",
            "2024-01-01T00:00:00Z",
            "--running",
            "false",
            "--errors-only",
            "--limit",
            "5",
            "--json",
        ])
        .unwrap();
        let Command::Event(EventCommand {
            action: EventAction::List(args),
        }) = cli.command
        else {
            panic!("Expected event list");
        };
        assert_eq!(args.target_type.as_deref(), Some("app"));
        assert_eq!(args.kinds, vec!["app.deploy", "app.restart"]);
        assert_eq!(args.owner_type, Some(OwnerType::User));
        assert!(args.since.is_some());
        assert_eq!(args.running, Some(false));
        assert!(args.errors_only);
        assert_eq!(args.limit, Some(5));
        assert!(args.output.json);
    }

    #[test]
    fn parse_event_list_rejects_bad_time() {
        assert!(Cli::try_parse_from(["tollgate", "event", "list", "--since", "yesterday"]).is_err());
    }

    #[test]
    fn parse_event_cancel_requires_reason() {
        assert!(Cli::try_parse_from(["tollgate", "event", "cancel", "abc"]).is_err());
        let cli =
            Cli::try_parse_from(["tollgate", "event", "cancel", "abc", "--reason", "oops"]).unwrap();
        if let Command::Event(EventCommand {
            action: EventAction::Cancel(args),
        }) = cli.command
        {
            assert_eq!(args.id, "abc");
            assert_eq!(args.reason, "oops");
        } else {
            panic!("Expected event cancel");
        }
    }

    #[test]
    fn parse_event_run() {
        let cli = Cli::try_parse_from([
            "tollgate",
            "event",
            "run",
            "--target",
            "app:foo",
            "--kind",
            "app.deploy",
            "--data",
            "image=v2",
            "--command",
            "sh -c 'sleep 1'",
        ])
        .unwrap();
        if let Command::Event(EventCommand {
            action: EventAction::Run(args),
        }) = cli.command
        {
            assert_eq!(args.target, Target::new("app", "foo"));
            assert_eq!(args.data, vec!["image=v2"]);
            assert!(!args.no_cancel);
        } else {
            panic!("Expected event run");
        }
    }

    #[test]
    fn parse_event_run_rejects_malformed_target() {
        let result = Cli::try_parse_from([
            "tollgate", "event", "run", "--target", "foo", "--kind", "k", "--command", "true",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_block_add_defaults_to_match_any() {
        let cli =
            Cli::try_parse_from(["tollgate", "block", "add", "--reason", "maintenance"]).unwrap();
        if let Command::Block(BlockCommand {
            action: BlockAction::Add(args),
        }) = cli.command
        {
            assert!(args.kind_name.is_empty());
            assert!(args.target_value.is_empty());
            assert_eq!(args.reason, "maintenance");
        } else {
            panic!("Expected block add");
        }
    }

    #[test]
    fn parse_block_list_active() {
        let cli = Cli::try_parse_from(["tollgate", "block", "list", "--active", "true"]).unwrap();
        if let Command::Block(BlockCommand {
            action: BlockAction::List(args),
        }) = cli.command
        {
            assert_eq!(args.active, Some(true));
        } else {
            panic!("Expected block list");
        }
    }

    #[test]
    fn parse_lock_clear() {
        let cli = Cli::try_parse_from(["tollgate", "lock", "clear", "app:foo", "--force"]).unwrap();
        if let Command::Lock(lock_cmd) = cli.command {
            if let LockAction::Clear(args) = lock_cmd.action {
                assert_eq!(args.target, Target::new("app", "foo"));
                assert!(args.force);
            } else {
                panic!("Expected Clear action");
            }
        } else {
            panic!("Expected Lock command");
        }
    }

    #[test]
    fn parse_journal_tail() {
        let cli = Cli::try_parse_from(["tollgate", "journal", "--tail", "20"]).unwrap();
        if let Command::Journal(args) = cli.command {
            assert_eq!(args.tail, Some(20));
            assert!(!args.json);
        } else {
            panic!("Expected Journal command");
        }
    }
}
