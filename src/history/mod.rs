pub mod models;
pub mod store;

pub use models::AlertHistoryFilters;
pub use store::{HistorySink, HistoryStore};
