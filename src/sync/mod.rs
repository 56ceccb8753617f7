mod mapping;
mod synchronizer;

pub use synchronizer::{SyncReport, SyncStatus, Synchronizer};
