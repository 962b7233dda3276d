//! Context gathering and prompt assembly.
//!
//! # Sources (gathered concurrently per turn)
//!
//! | Source | Module | Failure |
//! |--------|--------|---------|
//! | Reference documents | [`aggregator`], [`topics`] | propagates |
//! | Family profile, knowledge, routines | [`profile`] | propagates |
//! | Recent conversation | [`history`] | propagates |
//!
//! [`assembler`] turns the gathered text into the ordered message list.

pub mod aggregator;
pub mod assembler;
pub mod history;
pub mod profile;
pub mod token;
pub mod topics;

pub use aggregator::{ContextAggregator, rank_sources};
pub use assembler::{AssembledPrompt, AssemblyMetadata, LayerStats, PromptAssembler, PromptLayers};
pub use history::HistoryLoader;
pub use profile::{DevelopmentalStage, ProfileContext, ProfileContextBuilder};
pub use topics::SpecializedTopics;
