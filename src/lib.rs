// Clippy allows for reasonable defaults
// These suppress warnings where the suggested change doesn't improve readability
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::field_reassign_with_default)] // Builder pattern is clearer
#![allow(clippy::unnecessary_map_or)] // map_or can be clearer than alternatives
#![allow(clippy::format_in_format_args)] // Nested format! can be clearer for complex strings

// Module declarations
pub mod completion;
pub mod config;
pub mod jobs;
pub mod models;
pub mod poller;
pub mod research;
pub mod shutdown;
pub mod utils;

// Server module (HTTP/SSE/WebSocket API)
pub mod server;

pub use models::*;
