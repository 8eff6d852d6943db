//! VNDB "kana" API client.
//!
//! Three layers: a [`Transport`] seam over raw HTTP (implemented for
//! `reqwest::Client`, replaced by scripted fakes in tests), the
//! rate-limited retrying call layer, and typed wrappers for the handful of
//! endpoints the sync needs.

pub mod client;
pub mod error;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{CatalogEntry, Transport, UserListEntry, VndbClient};
pub use error::{TransportError, VndbError};
