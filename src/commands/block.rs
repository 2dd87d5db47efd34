//! `block list | add | remove`.
//!
//! Adding and removing blocks are themselves guarded operations: each is
//! recorded as an event on `event-block:<block-id>`.

use super::{Session, print_json, print_no_content};
use crate::cli::{BlockAddArgs, BlockListArgs, BlockRemoveArgs};
use serde_json::{Value, json};
use tollgate::admission::{EventHandle, Opts, open};
use tollgate::blocks::{self, Block, NewBlock};
use tollgate::error::Result;
use tollgate::model::{Kind, Owner, Target, parse_id};
use tollgate::permission::Allowed;
use uuid::Uuid;

pub const TARGET_TYPE_BLOCK: &str = "event-block";
const SCHEME_READ: &str = "event-block.read";
const SCHEME_ADD: &str = "event-block.add";
const SCHEME_REMOVE: &str = "event-block.remove";

pub fn cmd_block_list(session: &Session, args: BlockListArgs) -> Result<()> {
    session.require(SCHEME_READ, &[])?;
    let blocks = blocks::list_blocks(&session.ctx, args.active)?;

    if blocks.is_empty() {
        print_no_content();
        return Ok(());
    }

    if args.output.json {
        return print_json(&blocks);
    }

    for block in &blocks {
        let state = match block.end_time {
            None => "active".to_string(),
            Some(end) => format!("removed {}", end.format("%Y-%m-%d %H:%M:%S")),
        };
        println!("{}  [{}]", block, state);
    }
    Ok(())
}

pub fn cmd_block_add(session: &Session, args: BlockAddArgs) -> Result<()> {
    session.require(SCHEME_ADD, &[])?;

    let new = NewBlock {
        kind_name: args.kind_name,
        owner_name: args.owner_name,
        target_type: args.target_type,
        target_value: args.target_value,
        reason: args.reason,
    };
    let id = Uuid::now_v7();
    let handle = open_block_event(session, &id, SCHEME_ADD, block_pattern(&new))?;

    let result = blocks::add_block_with_id(&session.ctx, id, new);
    let closed = handle.finish(&result, outcome_data(&result));
    let block = result?;
    closed?;

    println!("Added {}", block);
    Ok(())
}

pub fn cmd_block_remove(session: &Session, args: BlockRemoveArgs) -> Result<()> {
    let id = parse_id(&args.id)?;
    session.require(SCHEME_REMOVE, &[])?;

    let handle = open_block_event(session, &id, SCHEME_REMOVE, Value::Null)?;

    let result = blocks::remove_block(&session.ctx, &id);
    let closed = handle.finish(&result, outcome_data(&result));
    let block = result?;
    closed?;

    println!("Removed {}", block);
    Ok(())
}

fn open_block_event(session: &Session, id: &Uuid, kind: &str, data: Value) -> Result<EventHandle> {
    open(
        &session.ctx,
        Opts::new(
            Target::new(TARGET_TYPE_BLOCK, id.to_string()),
            Kind::permission(kind),
            Owner::user(session.caller.clone()),
            Allowed::new(format!("{}.events", SCHEME_READ), vec![]),
            Allowed::new(format!("{}.cancel", kind), vec![]),
        )
        .with_custom_data(data)
        .not_cancelable()
        .exempt_from_blocks(),
    )
}

fn block_pattern(new: &NewBlock) -> Value {
    json!({
        "kind_name": new.kind_name,
        "owner_name": new.owner_name,
        "target_type": new.target_type,
        "target_value": new.target_value,
        "reason": new.reason,
    })
}

fn outcome_data<E>(result: &std::result::Result<Block, E>) -> Value {
    match result {
        Ok(block) => serde_json::to_value(block).unwrap_or(Value::Null),
        Err(_) => Value::Null,
    }
}
