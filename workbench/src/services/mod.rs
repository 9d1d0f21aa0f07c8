mod search;

pub use search::{SearchOutcome, SearchService};
