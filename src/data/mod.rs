//! Data layer: the embedded store

pub mod store;

pub use store::{Store, StoreError};
