pub mod error;
pub mod snapshot;
pub mod store;

pub use error::StoreError;
pub use snapshot::StoreSnapshot;
pub use store::{StoreConfig, StoreEvent, TaskProgressStore, CANCELLED_MESSAGE, HISTORY_LIMIT};
