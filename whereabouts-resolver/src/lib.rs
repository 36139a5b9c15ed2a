//! WHEREABOUTS Resolver - Lookup Resolution Pipeline
//!
//! The entry point of the system: given a raw handle, produce its profile
//! location or nothing, while never issuing duplicate in-flight lookups,
//! never exceeding the remote service's pacing and concurrency tolerances,
//! and never retrying a structurally failing handle past its budget.
//!
//! The pipeline composes:
//!
//! - the two-tier TTL cache from `whereabouts-storage`,
//! - a per-username exponential [`BackoffTracker`],
//! - a process-wide [`RateGovernor`] for spacing and 429 cooldowns,
//! - a pending table that shares one in-flight outcome among concurrent
//!   callers, and
//! - a single FIFO admission loop bounded by a concurrency semaphore.

pub mod backoff;
pub mod config;
pub mod governor;
pub mod resolver;

pub use backoff::BackoffTracker;
pub use config::ResolverConfig;
pub use governor::RateGovernor;
pub use resolver::Resolver;
