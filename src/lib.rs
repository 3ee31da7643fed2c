//! Gatelimit - Sliding-Window Rate Limiting Service
//!
//! This crate implements a sliding-window rate limiter that tracks
//! accepted-request timestamps per client key and enforces a maximum
//! request count over a continuously moving time interval. It can be
//! embedded in an axum application as middleware, or run as a standalone
//! HTTP service exposing a decision endpoint.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
