//! Gatekeeper - Per-identifier Rate Limiting Service
//!
//! This crate implements a multi-policy, fixed-window rate limiter with
//! temporary blocking. Every action is counted against an (identifier,
//! policy) pair; going over a policy's quota either refuses actions until
//! the window rolls or, for policies with a block duration, blocks the
//! identifier outright for a while. A background janitor keeps memory
//! bounded, and a small HTTP service exposes the limiter to proxies.
//!
//! State is process-local: separate instances do not share counters.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
