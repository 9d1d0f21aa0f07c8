mod chat;
mod search;

pub use chat::*;
pub use search::*;

use std::collections::BTreeMap;

/// Arbitrary record metadata or filter set with a deterministic key order.
pub type Metadata = BTreeMap<String, serde_json::Value>;
