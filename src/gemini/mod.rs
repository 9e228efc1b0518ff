mod client;
mod parsing;
pub mod prompts;

// ===== MODEL CONFIGURATION =====

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Prefix the listing endpoint puts in front of every model name.
pub const MODEL_NAMESPACE_PREFIX: &str = "models/";

// Upstream renames these every few months; variant spellings are listed so
// whichever form the listing returns still matches.
pub const DEFAULT_MODEL_PREFERENCES: &[&str] = &[
    "gemini-1.5-flash",
    "models/gemini-1.5-flash",
    "gemini-1.5-flash-latest",
    "gemini-2.0-flash",
];

// ===== PUBLIC API =====

pub use client::{GeminiClient, GeminiError, Part};
pub use parsing::truncate_for_log;
