mod feeds;
mod items;
mod memory;
mod schema;
mod store;
mod types;

pub use memory::MemoryStore;
pub use schema::Database;
pub use store::FeedStore;
pub use types::{StoreError, StoredItem, Subscription};
