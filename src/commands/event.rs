//! `event list | kinds | info | cancel`.

use super::{Session, print_json, print_no_content};
use crate::cli::{EventCancelArgs, EventInfoArgs, EventListArgs, OutputArgs};
use tollgate::audit;
use tollgate::cancel;
use tollgate::error::{Result, TollgateError};
use tollgate::filter::Filter;
use tollgate::model::{Event, KindType, parse_id};
use tollgate::redact::suppress_sensitive_envs;

pub fn cmd_event_list(session: &Session, args: EventListArgs) -> Result<()> {
    let events = list_events(session, &args)?;

    if events.is_empty() {
        print_no_content();
        return Ok(());
    }

    if args.output.json {
        return print_json(&events);
    }

    for event in &events {
        println!(
            "{}  {:<24} {:<20} {:<24} {}  {}",
            event.id,
            event.target.to_string(),
            event.kind.name,
            event.owner.name,
            event.start_time.format("%Y-%m-%d %H:%M:%S"),
            status(event)
        );
    }
    Ok(())
}

/// Events matching the arguments that the caller may see, redacted.
fn list_events(session: &Session, args: &EventListArgs) -> Result<Vec<Event>> {
    let mut filter = Filter {
        target_type: args.target_type.clone(),
        target_value: args.target_value.clone(),
        kind_names: args.kinds.clone(),
        owner_type: args.owner_type,
        owner_name: args.owner_name.clone(),
        since: args.since,
        until: args.until,
        running: args.running,
        error_only: args.errors_only,
        skip: args.skip,
        limit: args.limit,
        permissions: None,
    };
    filter.prune_user_values();
    filter.permissions = Some(session.permissions());

    let mut events = audit::list(&session.ctx, &filter)?;
    for event in &mut events {
        suppress_sensitive_envs(event, &session.config)?;
    }
    Ok(events)
}

pub fn cmd_event_kinds(session: &Session, args: OutputArgs) -> Result<()> {
    let kinds = audit::get_kinds(&session.ctx)?;

    if kinds.is_empty() {
        print_no_content();
        return Ok(());
    }

    if args.json {
        return print_json(&kinds);
    }

    for kind in &kinds {
        let kind_type = match kind.kind_type {
            KindType::Permission => "permission",
            KindType::Internal => "internal",
        };
        println!("{:<32} {}", kind.name, kind_type);
    }
    Ok(())
}

pub fn cmd_event_info(session: &Session, args: EventInfoArgs) -> Result<()> {
    let event = visible_event(session, &args.id)?;

    if args.output.json {
        return print_json(&event);
    }

    println!("Event:       {}", event.id);
    println!("Target:      {}", event.target);
    println!("Kind:        {}", event.kind);
    println!("Owner:       {}", event.owner);
    println!("Started:     {}", event.start_time.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(end) = event.end_time {
        println!("Ended:       {}", end.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("Duration:    {}s", event.duration().num_seconds());
    println!("Status:      {}", status(&event));
    println!("Instance:    {}", event.instance);
    println!("Cancelable:  {}", if event.cancelable { "yes" } else { "no" });
    if let Some(info) = &event.cancel_info {
        println!(
            "Cancel:      requested by {} at {}: {}{}",
            info.requested_by,
            info.requested_at.format("%Y-%m-%d %H:%M:%S UTC"),
            info.reason,
            if info.acknowledged { " (acknowledged)" } else { "" }
        );
    }
    if !event.start_custom_data.is_null() {
        println!("Start data:  {}", event.start_custom_data);
    }
    if !event.end_custom_data.is_null() {
        println!("End data:    {}", event.end_custom_data);
    }
    Ok(())
}

/// Load an event and check the caller may see it.
fn visible_event(session: &Session, raw_id: &str) -> Result<Event> {
    let id = parse_id(raw_id)?;
    let mut event = audit::get_by_id(&session.ctx, &id)?;
    session.require(&event.allowed.scheme, &event.allowed.contexts)?;
    suppress_sensitive_envs(&mut event, &session.config)?;
    Ok(event)
}

pub fn cmd_event_cancel(session: &Session, args: EventCancelArgs) -> Result<()> {
    let id = parse_id(&args.id)?;
    let event = audit::get_by_id(&session.ctx, &id)?;
    session
        .require(&event.allowed_cancel.scheme, &event.allowed_cancel.contexts)
        .map_err(|_| {
            TollgateError::Unauthorized(format!(
                "'{}' may not cancel event {}",
                session.caller, id
            ))
        })?;

    cancel::request_cancel(&session.ctx, &id, &args.reason, &session.caller)?;

    println!("Cancellation requested for event {} ({})", id, event.target);
    Ok(())
}

fn status(event: &Event) -> String {
    match (&event.error, event.running()) {
        (_, true) if event.cancel_pending() => "running (cancel requested)".to_string(),
        (_, true) => "running".to_string(),
        (Some(err), false) => format!("failed: {}", err),
        (None, false) => "ok".to_string(),
    }
}
