//! Pipeline entry points for crawler operations.
//!
//! - `run_search`: Enumerate keyword search results and harvest comments

pub mod search;

pub use search::{SearchOutcome, root_partitions, run_search};
