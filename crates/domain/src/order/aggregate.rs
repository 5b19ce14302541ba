//! Order entity.

use std::fmt;

use common::AggregateId;
use serde::{Deserialize, Serialize};

/// An order: a list of item names that can be cancelled.
///
/// Transitions never fail and return a new value; the versioned aggregate
/// keeps older values around as branches or history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    id: AggregateId,

    /// Item names in insertion order. Duplicates are allowed.
    items: Vec<String>,

    cancelled: bool,
}

impl Order {
    /// Creates an empty, open order.
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            items: Vec::new(),
            cancelled: false,
        }
    }

    /// Returns a cancelled copy of this order.
    pub fn cancel(&self) -> Self {
        Self {
            cancelled: true,
            ..self.clone()
        }
    }

    /// Returns a copy with `item` appended.
    pub fn add_item(&self, item: impl Into<String>) -> Self {
        let mut items = self.items.clone();
        items.push(item.into());
        Self {
            items,
            ..self.clone()
        }
    }

    /// Returns a copy without any occurrence of `item`.
    pub fn remove_item(&self, item: &str) -> Self {
        Self {
            items: self.items.iter().filter(|i| *i != item).cloned().collect(),
            ..self.clone()
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> &AggregateId {
        &self.id
    }

    /// Returns all items in insertion order.
    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Returns true if the order holds `item` at least once.
    pub fn contains(&self, item: &str) -> bool {
        self.items.iter().any(|i| i == item)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] items={} cancelled={}",
            self.id,
            self.items.join(","),
            self.cancelled
        )
    }
}
