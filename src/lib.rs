//! Koa companion chat backend.
//!
//! Koa is a self-hosted HTTP service behind the Koasync chat widget. Each
//! visitor gets a daily message allowance; answers are grounded in a curated
//! knowledge base and recent posts before being sent to a text-completion
//! API, and operators can teach Koa through secret-code training sessions.
//!
//! # Architecture
//!
//! - **Storage**: embedded SQLite (WAL) holding clients, snippets, training
//!   sessions, and posts
//! - **Quota**: one atomic conditional update per message, fixed 24h window
//! - **Search**: deterministic rule-table scoring over the active snippets
//! - **Transport**: JSON over HTTP (axum), CORS for the widget origins
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`quota`]: Per-client daily message allowance
//! - [`knowledge`]: Snippet and post storage, relevance search, seed data
//! - [`training`]: Secret-code training sessions and message analysis
//! - [`chat`]: The chat exchange: quota, capture, grounding, completion
//! - [`llm`]: Completion client seam and the OpenAI-compatible implementation
//! - [`scheduler`]: Daily knowledge reseed with retry and health status
//! - [`server`]: HTTP routes and the service composition root

pub mod chat;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod quota;
pub mod retry;
pub mod scheduler;
pub mod server;
pub mod training;
