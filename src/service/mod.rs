//! Service layer: topic conventions built on top of the client.

pub mod collection;

pub use collection::CollectionSubscriptions;
