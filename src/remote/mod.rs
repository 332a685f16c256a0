//! Remote document stores
//!
//! [`HttpRemote`] talks to a document store over HTTP. [`MemoryRemote`] keeps its documents in memory; it is used
//! by tests and offline demos, and its failures can be scripted with a [`MockBehaviour`](crate::mock_behaviour::MockBehaviour).

pub mod http_remote;
pub mod memory_remote;

pub use http_remote::HttpRemote;
pub use memory_remote::MemoryRemote;
