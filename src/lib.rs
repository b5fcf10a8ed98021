//! # memdex
//!
//! Local hybrid-search index over an agent's markdown memory files and
//! session transcripts.
//!
//! Documents are chunked on line boundaries, embedded, and stored in SQLite
//! next to an FTS5 keyword index. Queries fuse cosine similarity with keyword
//! rank. Sync is incremental: only documents whose `(mtime, size)`
//! fingerprint changed are re-chunked and re-embedded.
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Documents  │──▶│ Chunk+Embed  │──▶│    SQLite    │
//! │  (*.md)     │   │ (core sync)  │   │ chunks+FTS5  │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                   ┌──────────┐        ┌──────────┐
//!                   │   CLI    │        │   HTTP   │
//!                   │ (memdex) │        │  (axum)  │
//!                   └──────────┘        └──────────┘
//! ```
//!
//! The engine itself (chunker, change sets, sync, fusion) lives in the
//! runtime-agnostic `memdex-core` crate; this crate supplies the SQLite
//! store, the filesystem source, HTTP embedding providers, and the surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`documents`] | Filesystem document source |
//! | [`classify`] | Glob-rule source labels |
//! | [`embedding`] | OpenAI / Ollama providers |
//! | [`sqlite_store`] | SQLite + FTS5 index store |
//! | [`ingest`] | Sync command |
//! | [`search`] | Search command |
//! | [`get`] | Chunk lookup |
//! | [`stats`] | Index status |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod classify;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;
