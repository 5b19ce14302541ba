//! In-process cluster of order replicas driven by the console.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use common::{AggregateId, ReplicaId};
use domain::{Order, OrderCommand, OrderEvent, ValidationPolicy, Versioned, order_behavior};
use event_log::InMemoryEventLog;
use projections::{OrderUpdatesView, ProjectionProcessor};
use replica::{AggregateManager, CommandReply};

use crate::config::Config;
use crate::console::{ConsoleCommand, HELP, ReplicaOp};
use crate::error::ConsoleError;

type OrderManager = AggregateManager<Order, OrderEvent, InMemoryEventLog>;

/// One replica: its log, its aggregate actors and its read model.
pub struct ReplicaNode {
    log: Arc<InMemoryEventLog>,
    manager: OrderManager,
    processor: ProjectionProcessor<InMemoryEventLog>,
    updates: OrderUpdatesView,
}

impl ReplicaNode {
    fn new(id: ReplicaId, config: &Config) -> Self {
        let policy = ValidationPolicy {
            reject_missing_items: config.strict_item_removal,
        };
        let log = Arc::new(InMemoryEventLog::new(id));
        let mut manager = AggregateManager::new(Arc::clone(&log), order_behavior(policy))
            .with_mailbox_capacity(config.mailbox_capacity);
        if let Some(timeout) = config.actor_idle_timeout {
            manager = manager.with_idle_timeout(timeout);
        }

        let updates = OrderUpdatesView::new();
        let mut processor = ProjectionProcessor::new(Arc::clone(&log));
        processor.register(Box::new(updates.clone()));

        Self {
            log,
            manager,
            processor,
            updates,
        }
    }

    pub fn log(&self) -> &Arc<InMemoryEventLog> {
        &self.log
    }

    pub fn manager(&self) -> &OrderManager {
        &self.manager
    }
}

/// What the console should do after a line was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Print the text and read the next line.
    Continue(String),
    Exit,
}

/// Replicas that exchange events only when told to sync.
pub struct Cluster {
    nodes: BTreeMap<ReplicaId, ReplicaNode>,
}

impl Cluster {
    pub fn new(config: &Config) -> Self {
        let nodes = config
            .replicas
            .iter()
            .map(|id| (id.clone(), ReplicaNode::new(id.clone(), config)))
            .collect();
        Self { nodes }
    }

    pub fn replica_ids(&self) -> impl Iterator<Item = &ReplicaId> {
        self.nodes.keys()
    }

    pub fn node(&self, id: &ReplicaId) -> Result<&ReplicaNode, ConsoleError> {
        self.nodes
            .get(id)
            .ok_or_else(|| ConsoleError::UnknownReplica(id.clone()))
    }

    /// Parses and runs one console line.
    pub async fn run_line(&self, line: &str) -> Result<Outcome, ConsoleError> {
        match ConsoleCommand::parse(line)? {
            Some(command) => self.run(command).await,
            None => Ok(Outcome::Continue(String::new())),
        }
    }

    /// Runs a parsed console command.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, command: ConsoleCommand) -> Result<Outcome, ConsoleError> {
        let output = match command {
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Exit => return Ok(Outcome::Exit),
            ConsoleCommand::Sync(None) => self.sync_all().await?,
            ConsoleCommand::Sync(Some((from, to))) => {
                let copied = self.sync(&from, &to).await?;
                format!("{from} -> {to}: {copied} events")
            }
            ConsoleCommand::Replica { replica, op } => self.run_op(&replica, op).await?,
        };
        Ok(Outcome::Continue(output))
    }

    async fn run_op(&self, replica: &ReplicaId, op: ReplicaOp) -> Result<String, ConsoleError> {
        let node = self.node(replica)?;
        let output = match op {
            ReplicaOp::Create(id) => {
                let reply = node.manager.execute(OrderCommand::create_order(id)).await?;
                render_reply(replica, "created", &reply)
            }
            ReplicaOp::Add(id, item) => {
                let reply = node
                    .manager
                    .execute(OrderCommand::add_order_item(id, item))
                    .await?;
                render_reply(replica, "added item to", &reply)
            }
            ReplicaOp::Remove(id, item) => {
                let reply = node
                    .manager
                    .execute(OrderCommand::remove_order_item(id, item))
                    .await?;
                render_reply(replica, "removed item from", &reply)
            }
            ReplicaOp::Cancel(id) => {
                let reply = node.manager.execute(OrderCommand::cancel_order(id)).await?;
                render_reply(replica, "cancelled", &reply)
            }
            ReplicaOp::Resolve(id, index) => {
                let versions = node.manager.state(&id).await?;
                let selected = versions
                    .get(index)
                    .map(|v| v.vector_timestamp.clone())
                    .ok_or_else(|| ConsoleError::BranchIndex {
                        aggregate_id: id.clone(),
                        index,
                        branches: versions.len(),
                    })?;
                let reply = node
                    .manager
                    .execute(OrderCommand::resolve_order(id, selected, replica.clone()))
                    .await?;
                render_reply(replica, "resolved", &reply)
            }
            ReplicaOp::State(Some(id)) => {
                let versions = node.manager.state(&id).await?;
                render_versions(replica, &id, &versions)
            }
            ReplicaOp::State(None) => {
                // Actors exist only for ids used at this replica so far.
                node.manager.recover_all().await?;
                let states = node.manager.states().await?;
                if states.is_empty() {
                    format!("{replica}: no orders")
                } else {
                    states
                        .iter()
                        .map(|(id, versions)| render_versions(replica, id, versions))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            ReplicaOp::Snapshot(id) => {
                let sequence_nr = node.manager.save_snapshot(&id).await?;
                format!("{replica}: snapshot of {id} at sequence {sequence_nr}")
            }
            ReplicaOp::Count(id) => {
                node.processor.run_catch_up().await?;
                let count = node.updates.update_count(&id).await;
                format!("{replica}: {id} received {count} updates")
            }
        };
        Ok(output)
    }

    /// Replicates every log into every other one.
    pub async fn sync_all(&self) -> Result<String, ConsoleError> {
        let mut total = 0;
        // Two passes, so events relayed through a middle replica arrive too.
        for _ in 0..2 {
            for to in self.nodes.keys() {
                for from in self.nodes.keys().filter(|from| *from != to) {
                    total += self.sync(from, to).await?;
                }
            }
        }
        Ok(format!("synced {} replicas: {total} events", self.nodes.len()))
    }

    /// Replicates the log of `from` into the log of `to`.
    pub async fn sync(&self, from: &ReplicaId, to: &ReplicaId) -> Result<usize, ConsoleError> {
        let source = self.node(from)?;
        let target = self.node(to)?;
        Ok(target.log.replicate_from(&source.log).await?)
    }
}

fn render_reply(replica: &ReplicaId, action: &str, reply: &CommandReply<Order, OrderEvent>) -> String {
    let mut output = format!(
        "{replica}: {action} {} at {} (sequence {})",
        reply.aggregate_id, reply.vector_timestamp, reply.sequence_nr
    );
    for (index, version) in reply.versions.iter().enumerate() {
        let _ = write!(output, "\n{}", render_version(index, version));
    }
    output
}

fn render_versions(replica: &ReplicaId, id: &AggregateId, versions: &[Versioned<Order>]) -> String {
    let mut output = match versions.len() {
        0 => return format!("{replica}: {id} does not exist"),
        1 => format!("{replica}: {id}"),
        n => format!("{replica}: {id} has {n} conflicting versions"),
    };
    for (index, version) in versions.iter().enumerate() {
        let _ = write!(output, "\n{}", render_version(index, version));
    }
    output
}

fn render_version(index: usize, version: &Versioned<Order>) -> String {
    let updaters: Vec<&str> = version
        .update_sequence
        .iter()
        .map(ReplicaId::as_str)
        .collect();
    format!(
        "  [{index}] {} {} by {}",
        version.vector_timestamp,
        version.value,
        updaters.join(",")
    )
}
