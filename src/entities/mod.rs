//! SeaORM entities for the fulfillment core. Every table carries a
//! `tenant_id` column; reads and writes go through the scoped helpers in
//! `crate::tenant`.

pub mod enums;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod stock_movement;
pub mod warehouse_location;
