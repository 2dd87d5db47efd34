//! `lock list | clear`.

use super::{Session, print_no_content, target_contexts};
use crate::cli::LockClearArgs;
use tollgate::admission::force_release;
use tollgate::error::{Result, TollgateError};
use tollgate::locks::{self, LockInfo};

const SCHEME_CLEAR: &str = "event-lock.clear";

pub fn cmd_lock_list(session: &Session) -> Result<()> {
    let config = &session.config;
    let locks = locks::list_locks(&session.ctx, config)?;

    if locks.is_empty() {
        print_no_content();
        return Ok(());
    }

    println!("Held locks ({}):", locks.len());
    println!();

    for lock in &locks {
        print_lock(lock, "  ");
        if lock.is_stale {
            println!(
                "    Status:     STALE (exceeds {} min threshold)",
                config.lock_stale_minutes
            );
        }
        println!();
    }

    let stale_count = locks.iter().filter(|l| l.is_stale).count();
    if stale_count > 0 {
        println!(
            "Note: {} lock(s) are stale. If the holder is gone, run `tollgate lock clear <type:value> --force`.",
            stale_count
        );
    }

    Ok(())
}

pub fn cmd_lock_clear(session: &Session, args: LockClearArgs) -> Result<()> {
    if !args.force {
        return Err(TollgateError::InvalidInput(format!(
            "refusing to clear lock without --force flag.\n\n\
             Clearing a lock while its holder is still running lets a second\n\
             operation start on the same target. Only clear locks whose holder\n\
             has crashed.\n\n\
             To clear the lock, run:\n  tollgate lock clear {} --force",
            args.target
        )));
    }

    session.require(SCHEME_CLEAR, &target_contexts(&args.target))?;

    let cleared = force_release(&session.ctx, &args.target, &session.config, &session.caller)?;

    println!("Cleared lock on {}", args.target);
    println!();
    print_lock(&cleared, "");
    if cleared.is_stale {
        println!("  Status:     was STALE");
    }

    Ok(())
}

fn print_lock(lock: &LockInfo, indent: &str) {
    println!("{}{}:", indent, lock.label());
    let Some(meta) = &lock.metadata else {
        println!("{}  Status:     unreadable (torn) lock", indent);
        println!("{}  Path:       {}", indent, lock.path.display());
        return;
    };
    println!("{}  Event:      {}", indent, meta.event_id);
    println!("{}  Kind:       {}", indent, meta.kind);
    println!("{}  Owner:      {}", indent, meta.owner);
    println!("{}  Instance:   {}", indent, meta.instance);
    if let Some(pid) = meta.pid {
        println!("{}  PID:        {}", indent, pid);
    }
    println!(
        "{}  Created:    {}",
        indent,
        meta.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("{}  Age:        {}", indent, meta.age_string());
    println!("{}  Path:       {}", indent, lock.path.display());
}
