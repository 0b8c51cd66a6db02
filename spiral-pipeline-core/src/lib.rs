#![doc = "spiral-pipeline-core: content enrichment and generation pipeline for the TechieSpiral directory."]

//! This crate holds the data models, the model/mailing contracts and every
//! pipeline component. The `spiral-pipeline` binary is a thin shell around
//! [`pipeline`].
//!
//! # Usage
//! Build a [`config::PipelineConfig`], a [`template::TemplateSet`] and a
//! [`contract::TextGenerator`] (the real one is [`llm::AnthropicClient`]), then
//! call the matching `pipeline::run_*` function.

pub mod article;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod contract;
pub mod discover;
pub mod enrich;
pub mod error;
pub mod ideas;
pub mod llm;
pub mod mailing;
pub mod newsletter;
pub mod pipeline;
pub mod queue;
pub mod stacks;
pub mod store;
pub mod template;
