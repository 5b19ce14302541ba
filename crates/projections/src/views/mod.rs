//! Read model views.

pub mod order_updates;

pub use order_updates::OrderUpdatesView;
