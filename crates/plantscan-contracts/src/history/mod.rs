mod store;

pub use store::{HistoryEntry, HistoryStore, HISTORY_CAPACITY};
