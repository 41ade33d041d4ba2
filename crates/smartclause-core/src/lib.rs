//! # SmartClause Core
//!
//! Shared logic for the SmartClause backend: data models, the storage
//! abstraction with its analysis-cache contract, the sliding-window rate
//! limiter, caller identification, HS256 tokens and password hashing.
//!
//! This crate contains no tokio, sqlx, HTTP or filesystem dependencies.
//! Every time-dependent operation takes `now` explicitly so that TTL and
//! window boundaries are deterministic under test.

pub mod error;
pub mod identity;
pub mod models;
pub mod password;
pub mod ratelimit;
pub mod store;
pub mod token;
