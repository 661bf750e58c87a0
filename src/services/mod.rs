//! Services
//!
//! Business logic services for the engine. Services hold their dependencies
//! (database, providers, queue) by injection and are called by the HTTP
//! adapter and the job workers.

pub mod chat;
pub mod jobs;
pub mod letter;
pub mod llm;
pub mod memory;
pub mod report;
pub mod woop;

pub use chat::ChatService;
pub use letter::LetterService;
pub use report::ReportService;
