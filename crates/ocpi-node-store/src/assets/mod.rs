//! The resource store and its supporting types.

pub mod archive;
pub mod collection;
pub mod command;
pub mod events;
mod nested;
pub mod store;

pub use archive::ArchiveLookup;
pub use collection::{Collection, PartyData, StoredResource};
pub use command::{AssetCommand, BulkRemoval, ResourceKey, WriteVerb};
pub use events::{AssetEvent, Change};
pub use store::{AssetStore, AssetStoreConfig, PartySnapshot};
