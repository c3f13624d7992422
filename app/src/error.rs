// ==============================================================================
// error.rs - Analysis Error Taxonomy
// ==============================================================================
// Description: Typed errors that abort an analysis, grouped by who can fix them
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Categories:
//   InputError            - user-correctable, surfaced verbatim
//   KnowledgeBaseError    - operator-fixable, surfaced as "analysis unavailable"
//   TimeoutError          - user-correctable, retryable
//   InternalConsistency   - always a bug, never surfaced verbatim
// Warnings (skipped lines, allele ties) never abort and are not errors.
// ==============================================================================

use std::time::Duration;
use thiserror::Error;

/// Problems with the caller's input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("EmptyOrUnparseableVariantFile: no valid variant records found ({skipped_lines} line(s) skipped)")]
    EmptyOrUnparseableVariantFile { skipped_lines: usize },

    #[error("MissingDrugName: a drug name is required")]
    MissingDrugName,

    #[error("UnreadableVariantFile: {0}")]
    Unreadable(String),
}

/// Problems with the loaded knowledge base
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KnowledgeBaseError {
    #[error("Malformed knowledge base document: {0}")]
    Malformed(String),

    #[error("Failed to read knowledge base: {0}")]
    Io(String),

    #[error("Gene '{gene}' is referenced by a rule but has no definition")]
    UnknownGene { gene: String },

    #[error("Gene '{gene}' has no phenotype for its reference diplotype {reference}/{reference}")]
    MissingReferenceDiplotype { gene: String, reference: String },

    #[error("Allele {gene} {allele} has an empty variant signature")]
    EmptySignature { gene: String, allele: String },

    #[error("Allele {gene} {allele} is defined more than once")]
    DuplicateAllele { gene: String, allele: String },

    #[error("Rule for drug '{drug}' has evidence weight {weight} (must be 0-100)")]
    InvalidEvidenceWeight { drug: String, weight: u8 },

    #[error("Rule conflict for drug '{drug}': {count} rules share priority {priority} for {gene} {phenotype}")]
    RuleConflict {
        drug: String,
        gene: String,
        phenotype: String,
        priority: i32,
        count: usize,
    },
}

/// Input that was too large or too slow to process
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeoutError {
    #[error("Variant file exceeds the {limit_bytes} byte limit")]
    InputTooLarge { limit_bytes: u64 },

    #[error("Reading the variant file took longer than {limit:?}")]
    ReadTimedOut { limit: Duration },

    #[error("Analysis did not finish within {limit:?}")]
    AnalysisTimedOut { limit: Duration },
}

/// Any error that aborts an analysis. No partial result accompanies it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("InputError: {0}")]
    Input(#[from] InputError),

    #[error("KnowledgeBaseError: {0}")]
    KnowledgeBase(#[from] KnowledgeBaseError),

    #[error("TimeoutError: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("InternalConsistencyError: {0}")]
    InternalConsistency(String),

    #[error("Analysis cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// Message safe to show an end user
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::Input(e) => e.to_string(),
            AnalysisError::Timeout(e) => e.to_string(),
            AnalysisError::KnowledgeBase(_) => {
                "Analysis unavailable: the pharmacogenomic knowledge base could not be used.".to_string()
            }
            AnalysisError::InternalConsistency(_) => {
                "An internal error occurred while preparing the result.".to_string()
            }
            AnalysisError::Cancelled => "Analysis was cancelled.".to_string(),
        }
    }

    /// Whether resubmitting the same request can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::Timeout(_))
    }

    /// Short category label for logs and audit records
    pub fn category(&self) -> &'static str {
        match self {
            AnalysisError::Input(_) => "input",
            AnalysisError::KnowledgeBase(_) => "knowledge_base",
            AnalysisError::Timeout(_) => "timeout",
            AnalysisError::InternalConsistency(_) => "internal_consistency",
            AnalysisError::Cancelled => "cancelled",
        }
    }
}
