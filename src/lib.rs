//! FutureSelf Engine - Rust Backend Library
//!
//! Core engine for the future-self letter exchange prototype. It covers the
//! asynchronous generation pipeline behind the product surface:
//! - Letter intake and the letter-processing job (one AI reply per persona)
//! - Turn-limited conversations with a persona
//! - WOOP report generation with structured-output repair
//! - Vector memory retrieval feeding generation context
//! - Storage layer (SQLite with transparent field encryption)
//!
//! HTTP routing, authentication and the real generative provider live in
//! separate adapters; this crate exposes the services they call.

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use models::settings::AppConfig;
pub use state::AppState;
pub use utils::error::{AppError, AppResult};
