//! This crate manages the doctors and shifts of a hospital.
//!
//! The records live in a remote document store, reached through the [`RemoteStore`](traits::RemoteStore) trait
//! (see [`HttpRemote`](remote::HttpRemote) for a real one, and [`MemoryRemote`](remote::MemoryRemote) for tests). \
//! Because the remote store may be unreachable, slow to start or may refuse access, this crate also provides a
//! local cache in the [`cache`] module.
//!
//! These two data sources can be used together in a [`DataManager`]. \
//! A `DataManager` picks which source is the source of truth, falls back to the local cache when the remote store
//! fails, migrates records created offline once the remote store is reachable, and broadcasts [`Notification`]s
//! that views can react to.

pub mod traits;
pub mod error;
pub use error::StoreError;

pub mod record;
pub use record::{Document, Record, RecordId};
mod doctor;
pub use doctor::Doctor;
mod shift;
pub use shift::{find_overlapping_shift, Shift, ShiftType};

pub mod cache;
pub use cache::Cache;
pub mod remote;
pub mod mock_behaviour;

pub mod manager;
pub use manager::{Backend, DataManager};
pub use manager::migration::MigrationReport;
pub use manager::notification::Notification;
pub use manager::subscription::Subscription;

pub mod config;
