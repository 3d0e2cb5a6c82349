//! Crate-root error aggregating every component's error type, for
//! `roguehunterd`'s top-level exit path.

use crate::collector::CollectError;
use crate::config::ConfigError;
use crate::forensics::ForensicsError;
use crate::platform::PlatformError;
use crate::storage::StorageError;
use crate::tracker::TrackerError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Forensics(#[from] ForensicsError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
