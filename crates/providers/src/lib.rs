//! LLM provider implementations for studiobot.
//!
//! All providers implement the `studiobot_core::Provider` trait.
//! [`build_from_config`] picks the one named by configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_from_config, default_base_url};
