//! Concrete storage: [`InMemory`] (optionally saved to a JSON file) and, with the
//! `sqlite` or `postgres` feature, [`SqlxBackend`].

mod in_memory;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use in_memory::InMemory;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use sql::{DbKind, SqlxBackend};
