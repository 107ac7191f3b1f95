//! # Turnstile Server
//!
//! A standalone admission control service built on the `turnstile` library.
//!
//! ## Purpose
//!
//! Put the admission check, ban registry and usage statistics behind an HTTP
//! API so that proxies and services written in any language can share them:
//!
//! - **Forward-auth**: a reverse proxy asks `/admission` before passing a
//!   request upstream; the caller identity comes from the forwarded headers
//! - **Shared state**: with the Redis store, every instance counts against the
//!   same windows and sees the same bans
//! - **Operations**: bans are placed and lifted over HTTP, statistics are read
//!   from `/stats`
//!
//! ## Quick Start
//!
//! ```bash
//! # Show all available options
//! turnstile --help
//!
//! # In-memory store on port 8080
//! turnstile --http-port 8080
//!
//! # Shared Redis store, 120 requests per minute
//! turnstile --store redis --redis-url redis://127.0.0.1:6379/ --limit 120 --window 60
//!
//! # List all available environment variables
//! turnstile --list-env-vars
//! ```
//!
//! ## How It Works
//!
//! Each caller gets one fixed-window counter per `window`. A request is
//! admitted while the counter is at most `limit`; a banned caller is refused
//! without touching its counter. Every decision also updates the global,
//! hourly and per-endpoint statistics in the same atomic step.
//!
//! If the store cannot be reached in time, requests are admitted and a
//! warning is logged.
//!
//! ## Client Examples
//!
//! ```bash
//! curl -i "http://localhost:8080/admission?endpoint=posts.list" -H "X-Real-IP: 203.0.113.7"
//!
//! curl -X PUT http://localhost:8080/bans/203.0.113.7 \
//!   -H "Content-Type: application/json" \
//!   -d '{"ttl_secs": 3600, "reason": "credential stuffing"}'
//!
//! curl "http://localhost:8080/stats?hours=6"
//! ```

pub mod config;
pub mod store;
pub mod transport;
pub mod types;
