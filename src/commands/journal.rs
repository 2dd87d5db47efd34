//! `journal`: print the transition journal.

use super::{Session, print_no_content};
use crate::cli::JournalArgs;
use tollgate::error::Result;
use tollgate::journal::read_journal;

pub fn cmd_journal(session: &Session, args: JournalArgs) -> Result<()> {
    let entries = read_journal(&session.ctx, args.tail)?;

    if entries.is_empty() {
        print_no_content();
        return Ok(());
    }

    for entry in &entries {
        if args.json {
            println!("{}", entry.to_ndjson_line()?);
            continue;
        }

        let mut line = format!(
            "{}  {:<15} {}",
            entry.ts.format("%Y-%m-%d %H:%M:%S"),
            entry.action.to_string(),
            entry.actor
        );
        if let Some(target) = &entry.target {
            line.push_str(&format!("  {}", target));
        }
        if let Some(event) = &entry.event {
            line.push_str(&format!("  {}", event));
        }
        if entry.details.as_object().is_some_and(|d| !d.is_empty()) {
            line.push_str(&format!("  {}", entry.details));
        }
        println!("{}", line);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::test_session;
    use tollgate::journal::{JournalAction, JournalEntry, record};

    #[test]
    fn journal_prints_entries() {
        let (_temp_dir, session) = test_session();
        cmd_journal(&session, JournalArgs::default()).unwrap();

        record(&session.ctx, JournalEntry::new(JournalAction::Init, "op"));
        cmd_journal(
            &session,
            JournalArgs {
                tail: Some(1),
                json: true,
            },
        )
        .unwrap();
    }
}
