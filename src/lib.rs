//! Quillpad pairs a folder of markdown notes with a locally hosted language
//! model that streams its replies.
//!
//! - [`core`] owns the streaming pipeline: prompt composition, the HTTP
//!   transport, NDJSON decoding, the event relay, and per-turn views. It also
//!   holds configuration and the note store.
//! - [`ui`] renders markdown to HTML for display surfaces.
//! - [`api`] defines the generate request and record payloads.
//! - [`cli`] is the binary's entrypoint and subcommand handlers.

pub mod api;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
