//! tidewatch: a hydrating ingest pipeline for a federated, content-addressed
//! event stream.
//!
//! The crate ingests repository commits from three acquisition modes — a
//! live firehose subscription, a bulk enumeration-and-download pull, and a
//! rehydration pass over previously captured CAR files — and funnels every
//! created/updated/deleted record through a shared hydration stage into a
//! file sink and/or a cloud column-store sink.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]
#![warn(unreachable_pub)]
#![warn(elided_lifetimes_in_paths)]
#![deny(unused_must_use)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Bulk enumeration + download pull (C6).
pub mod bulk;
/// Bounded, cost-weighted, TTL cache with negative caching (C2).
pub mod cache;
/// CLI/env configuration surface (§6).
pub mod config;
/// Crate-wide error types (§7).
pub mod error;
/// Live firehose subscription consumer (C5).
pub mod firehose;
/// HTTP client with retry/backoff and the session auth token cell.
pub mod http;
/// Hydration engine (C4).
pub mod hydrator;
/// Identity resolution (C3).
pub mod identity_resolver;
/// Shared data model (§3).
pub mod model;
/// Logging/metrics/health surface.
pub mod observability;
/// Pipeline glue: lifecycle, signal handling, restart loop (C10).
pub mod pipeline;
/// Single process-wide token-bucket rate limiter (C1).
pub mod ratelimit;
/// CAR rehydration over a directory of previously captured repositories (C7).
pub mod rehydrate;
/// Thin adapter over the external CAR/Merkle-repo decoding library.
pub mod repo;
/// Output sinks: append-only file and cloud column store (C8/C9).
pub mod sink;
/// Small shared helpers.
pub mod utils;
