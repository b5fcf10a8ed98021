//! # memdex core
//!
//! Runtime-agnostic logic for memdex: data models, line-addressable
//! chunking, change detection, the index store abstraction, the
//! incremental sync algorithm, and hybrid score fusion.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Concrete
//! stores, document sources, and embedding providers live in the `memdex`
//! app crate and plug in through the traits defined here.

pub mod changeset;
pub mod chunk;
pub mod classify;
pub mod embedding;
pub mod error;
pub mod models;
pub mod search;
pub mod store;
pub mod sync;
