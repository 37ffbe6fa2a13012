//! Business logic for the fulfillment core.

pub mod orders;
pub mod payments;
pub mod stock;
pub mod totals;
