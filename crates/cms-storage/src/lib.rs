pub mod broadcast;
pub mod fjall;
pub mod keys;
pub mod mem;
pub mod path_index;
pub mod store;
pub mod traits;
pub mod types;

pub use broadcast::{Broadcaster, PublishOutcome, DEFAULT_BROADCAST_CAPACITY};
pub use path_index::{CompiledFilter, PathIndex, PathSnapshot};
pub use store::PropertyStore;
pub use traits::LogStorage;
pub use types::{LogEntry, LogPayload, LogState};
