//! Read side of the replicated order log.
//!
//! - [`Projection`] trait for processing logged events into read models
//! - [`ProjectionProcessor`] for feeding a replica's log to projections
//! - [`OrderUpdatesView`], counting the updates each order received

pub mod error;
pub mod processor;
pub mod projection;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use views::OrderUpdatesView;
