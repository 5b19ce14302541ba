//! Parsing of console lines.

use common::{AggregateId, ReplicaId};

use crate::error::ConsoleError;

pub const HELP: &str = "\
Commands:
  <replica> create <id>                 create an order
  <replica> add <id> <item>             add an item
  <replica> remove <id> <item>          remove every occurrence of an item
  <replica> cancel <id>                 cancel an order
  <replica> resolve <id> <branch>       keep the branch with the given index
  <replica> state [<id>]                show the versions of one or all orders
  <replica> snapshot <id>               save a snapshot of an order
  <replica> count <id>                  show how many updates an order received
  sync [<from> <to>]                    replicate all logs, or <from> into <to>
  help                                  show this text
  exit                                  quit";

/// Operation a replica performs for a console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaOp {
    Create(AggregateId),
    Add(AggregateId, String),
    Remove(AggregateId, String),
    Cancel(AggregateId),
    Resolve(AggregateId, usize),
    State(Option<AggregateId>),
    Snapshot(AggregateId),
    Count(AggregateId),
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// An operation addressed to one replica.
    Replica { replica: ReplicaId, op: ReplicaOp },
    /// Replicate every log into every other, or one log into another.
    Sync(Option<(ReplicaId, ReplicaId)>),
    Help,
    Exit,
}

impl ConsoleCommand {
    /// Parses a line. Blank lines yield None.
    pub fn parse(line: &str) -> Result<Option<Self>, ConsoleError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let command = match words.as_slice() {
            [] => return Ok(None),
            ["help"] => ConsoleCommand::Help,
            ["exit"] | ["quit"] => ConsoleCommand::Exit,
            ["sync"] => ConsoleCommand::Sync(None),
            ["sync", from, to] => {
                ConsoleCommand::Sync(Some((ReplicaId::new(*from), ReplicaId::new(*to))))
            }
            ["sync", ..] => return Err(usage("sync [<from> <to>]")),
            [replica, op, args @ ..] => ConsoleCommand::Replica {
                replica: ReplicaId::new(*replica),
                op: parse_op(op, args)?,
            },
            [word] => return Err(ConsoleError::Parse(format!("Unknown command: {word}"))),
        };
        Ok(Some(command))
    }
}

fn parse_op(op: &str, args: &[&str]) -> Result<ReplicaOp, ConsoleError> {
    let op = match (op, args) {
        ("create", [id]) => ReplicaOp::Create(AggregateId::new(*id)),
        ("add", [id, item]) => ReplicaOp::Add(AggregateId::new(*id), item.to_string()),
        ("remove", [id, item]) => ReplicaOp::Remove(AggregateId::new(*id), item.to_string()),
        ("cancel", [id]) => ReplicaOp::Cancel(AggregateId::new(*id)),
        ("resolve", [id, index]) => {
            let index = index
                .parse()
                .map_err(|_| ConsoleError::Parse(format!("Invalid branch index: {index}")))?;
            ReplicaOp::Resolve(AggregateId::new(*id), index)
        }
        ("state", []) => ReplicaOp::State(None),
        ("state", [id]) => ReplicaOp::State(Some(AggregateId::new(*id))),
        ("snapshot", [id]) => ReplicaOp::Snapshot(AggregateId::new(*id)),
        ("count", [id]) => ReplicaOp::Count(AggregateId::new(*id)),
        ("create" | "cancel" | "snapshot" | "count", _) => {
            return Err(usage(&format!("<replica> {op} <id>")));
        }
        ("add" | "remove", _) => return Err(usage(&format!("<replica> {op} <id> <item>"))),
        ("resolve", _) => return Err(usage("<replica> resolve <id> <branch>")),
        ("state", _) => return Err(usage("<replica> state [<id>]")),
        _ => return Err(ConsoleError::Parse(format!("Unknown operation: {op}"))),
    };
    Ok(op)
}

fn usage(form: &str) -> ConsoleError {
    ConsoleError::Parse(format!("Usage: {form}"))
}
