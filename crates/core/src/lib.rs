//! Pure domain layer for the bookrack service.
//!
//! Everything in this crate is a synchronous, side-effect-free
//! transformation: domain aggregates with their validation rules,
//! the registration event normalizer, the stub cross-reference type,
//! the pagination engine, and the default reading-list plan. I/O lives
//! in the storage and app crates.

pub mod normalizer;
pub mod pagination;
pub mod provisioning;
pub mod refs;
pub mod types;
