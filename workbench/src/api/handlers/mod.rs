pub mod chat;
pub(crate) mod health;
pub mod metrics;
pub mod search;

pub use health::health_check;
