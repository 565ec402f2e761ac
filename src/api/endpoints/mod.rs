//! API endpoint handlers, one module per resource.

pub mod documents;
pub mod health;
pub mod reviews;
pub mod templates;
pub mod work_orders;
