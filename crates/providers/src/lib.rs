//! Chat-completion provider implementations for Lumi.
//!
//! All providers implement the `lumi_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
