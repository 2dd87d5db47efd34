//! `event run`: the reference worker.
//!
//! Opens an event, runs a command as the guarded operation and honors the
//! cancellation polling contract: every `cancel_poll_interval_ms` the worker
//! re-reads its cancel marker, and on a request it acknowledges it, stops
//! the child and closes the event as canceled.

use super::{Session, parse_data, target_contexts};
use crate::cli::EventRunArgs;
use serde_json::json;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tollgate::admission::{EventHandle, Opts, open};
use tollgate::error::{Result, TollgateError};
use tollgate::model::{CancelInfo, Kind, Owner};
use tollgate::permission::Allowed;

/// How often the child is checked for exit, at most.
const CHILD_POLL: Duration = Duration::from_millis(50);

enum RunOutcome {
    /// The child exited on its own (None if killed by a signal).
    Exited(Option<i32>),
    Canceled(CancelInfo),
}

pub fn cmd_event_run(session: &Session, args: EventRunArgs) -> Result<()> {
    let argv = shell_words::split(&args.command).map_err(|e| {
        TollgateError::InvalidInput(format!(
            "failed to parse command '{}': {}\n\
             Fix: check for unmatched quotes or invalid escape sequences.",
            args.command, e
        ))
    })?;
    if argv.is_empty() {
        return Err(TollgateError::InvalidInput("command is empty".to_string()));
    }
    let data = parse_data(&args.data)?;

    let contexts = target_contexts(&args.target);
    session.require(&args.kind, &contexts)?;

    let kind = Kind::permission(args.kind);
    let allowed = Allowed::new(format!("{}.read.events", kind.name), contexts.clone());
    let allowed_cancel = Allowed::new(format!("{}.cancel", kind.name), contexts);
    let mut opts = Opts::new(
        args.target,
        kind,
        Owner::user(session.caller.clone()),
        allowed,
        allowed_cancel,
    )
    .with_custom_data(data);
    if args.no_cancel {
        opts = opts.not_cancelable();
    }

    let handle = open(&session.ctx, opts)?;
    let id = handle.id();
    println!("Opened event {} on {}", id, handle.target());

    let started = Instant::now();
    let outcome = supervise(&handle, &argv, session.config.cancel_poll_interval());
    let end_data = |exit_code: Option<i32>| {
        json!({
            "command": args.command,
            "exit_code": exit_code,
            "duration_ms": started.elapsed().as_millis() as u64,
        })
    };

    match outcome {
        Ok(RunOutcome::Exited(Some(0))) => {
            handle.close(None, end_data(Some(0)))?;
            println!("Event {} succeeded", id);
            Ok(())
        }
        Ok(RunOutcome::Exited(code)) => {
            let message = match code {
                Some(code) => format!("command exited with status {}", code),
                None => "command terminated by signal".to_string(),
            };
            handle.close(Some(message.clone()), end_data(code))?;
            Err(TollgateError::OperationFailed(message))
        }
        Ok(RunOutcome::Canceled(info)) => {
            handle.close_canceled(end_data(None))?;
            Err(TollgateError::OperationFailed(format!(
                "event {} canceled by {}: {}",
                id, info.requested_by, info.reason
            )))
        }
        Err(e) => {
            if let Err(close_err) = handle.close(Some(e.to_string()), end_data(None)) {
                tracing::warn!(event_id = %id, error = %close_err, "failed to close event");
            }
            Err(e)
        }
    }
}

/// Run the child to completion or until cancellation is requested.
fn supervise(handle: &EventHandle, argv: &[String], poll_interval: Duration) -> Result<RunOutcome> {
    let program = &argv[0];
    let mut child = Command::new(program)
        .args(&argv[1..])
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| {
            TollgateError::OperationFailed(format!(
                "failed to execute command '{}': {}\n\
                 Fix: ensure the command is installed and in PATH.",
                program, e
            ))
        })?;

    let mut last_cancel_poll: Option<Instant> = None;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(RunOutcome::Exited(status.code())),
            Ok(None) => {}
            Err(e) => {
                kill_process(&mut child);
                return Err(TollgateError::OperationFailed(format!(
                    "failed to check process status: {}",
                    e
                )));
            }
        }

        if last_cancel_poll.is_none_or(|t| t.elapsed() >= poll_interval) {
            last_cancel_poll = Some(Instant::now());
            match handle.cancel_requested() {
                Ok(Some(info)) => {
                    tracing::info!(
                        event_id = %handle.id(),
                        requested_by = %info.requested_by,
                        "cancellation observed, stopping command"
                    );
                    if let Err(e) = handle.acknowledge_cancel() {
                        tracing::warn!(event_id = %handle.id(), error = %e, "failed to acknowledge cancellation");
                    }
                    kill_process(&mut child);
                    return Ok(RunOutcome::Canceled(info));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(event_id = %handle.id(), error = %e, "failed to poll for cancellation");
                }
            }
        }

        std::thread::sleep(CHILD_POLL.min(poll_interval));
    }
}

/// Kill a process and wait for it to terminate.
fn kill_process(child: &mut Child) {
    // On Unix this is SIGKILL; on Windows it is TerminateProcess.
    let _ = child.kill();
    let _ = child.wait();
}
