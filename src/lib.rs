//! contentbot: HTTP service behind the content-operations admin panel.
//!
//! Generates promotional posts and blog drafts with a generative-text API,
//! persists them in SQLite, arbitrates first-copy-wins claims on generated
//! content, and publishes approved blog drafts to the CMS through a durable
//! outbox.

pub mod blog;
pub mod claim;
pub mod cms;
pub mod config;
pub mod db;
pub mod extract;
pub mod genai;
pub mod http;
pub mod model;
pub mod outbox;
pub mod store;
