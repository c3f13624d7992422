// ==============================================================================
// lib.rs - Pharmacogenomic Engine Library
// ==============================================================================
// Description: Library interface for the variant-to-recommendation engine
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

pub mod parsers;
pub mod audit;
pub mod validator;
pub mod config;
pub mod error;
pub mod models;
pub mod knowledge_base;
pub mod allele_resolver;
pub mod phenotype;
pub mod rules;
pub mod confidence;
pub mod report;
pub mod processor;

pub use config::EngineConfig;
pub use error::{AnalysisError, InputError, KnowledgeBaseError, TimeoutError};
pub use knowledge_base::KnowledgeBase;
pub use models::{AnalysisResult, Phenotype, RiskLevel};
pub use processor::AnalysisEngine;
