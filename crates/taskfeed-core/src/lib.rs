pub mod errors;
pub mod ids;
pub mod progress;
pub mod protocol;
pub mod url;

pub use errors::FeedError;
pub use ids::TaskId;
pub use progress::{ConnectionState, DownloadProgress, DownloadTask, ProgressUpdate, TaskStatus};
pub use protocol::ServerMessage;
pub use url::channel_url;
