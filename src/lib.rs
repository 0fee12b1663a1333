//! # Chryonsus
//!
//! Commit summaries and codebase Q&A for GitHub-hosted projects.
//!
//! Two pipelines share one set of collaborators ([`services::Services`]):
//!
//! ## Architecture
//!
//! ```text
//!  sync:  GitHub ──▶ newest 10 non-merge ──▶ unprocessed ──▶ summarize (all, settle) ──▶ SQLite
//!
//!  ask:   question ──▶ embed ──▶ tiered search ──▶ prompt ──▶ generator ──▶ answer channel
//!                                (strict → relaxed → docs)                   ▲
//!                                                                 CLI / SSE reader
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! chry init
//! chry project add widgets https://github.com/acme/widgets
//! chry sync <project-id>
//! chry ask <project-id> "Where is authentication handled?"
//! chry serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error kinds |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Storage trait with SQLite and in-memory backends |
//! | [`github`] | GitHub REST client |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Text-generation provider abstraction |
//! | [`answer`] | Streaming answer channel |
//! | [`commits`] | Commit sync pipeline |
//! | [`retrieval`] | Tiered similarity retrieval |
//! | [`ask`] | Prompt assembly and question answering |
//! | [`services`] | Collaborator bundle shared by both pipelines |
//! | [`server`] | HTTP server |

pub mod answer;
pub mod ask;
pub mod commits;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod github;
mod http;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod services;
pub mod store;

pub use ask::{ask_question, QuestionResponse};
pub use commits::poll_commits as sync_commits;
