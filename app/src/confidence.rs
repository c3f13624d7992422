// ==============================================================================
// confidence.rs - Confidence Scoring
// ==============================================================================
// Description: Derives a 0-100 confidence score from rule evidence, phenotype
//              certainty and call quality
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use serde::Serialize;

use crate::config::EngineConfig;
use crate::models::Phenotype;
use crate::phenotype::GeneProfile;
use crate::rules::RuleSelection;

/// How a score was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfidenceBreakdown {
    /// Rule evidence weight, or the fallback ceiling
    pub base: u8,
    pub unknown_phenotypes: u8,
    pub unknown_penalty: u32,
    pub ambiguity_penalty: u32,
    pub low_quality_penalty: u32,
    pub score: u8,
}

impl ConfidenceBreakdown {
    pub fn total_penalty(&self) -> u32 {
        self.unknown_penalty + self.ambiguity_penalty + self.low_quality_penalty
    }
}

/// Score a selection against the genes classified for it
pub fn score(
    selection: &RuleSelection<'_>,
    profiles: &[GeneProfile],
    config: &EngineConfig,
) -> ConfidenceBreakdown {
    let base = match selection {
        RuleSelection::Matched(rule) => rule.evidence_weight.min(100),
        RuleSelection::Fallback { .. } => config.fallback_confidence_ceiling.min(100),
    };

    let unknown = profiles
        .iter()
        .filter(|p| p.phenotype() == Phenotype::Unknown)
        .count() as u32;
    let ambiguous = profiles.iter().any(|p| p.alleles.ambiguous);
    let low_quality = profiles.iter().any(|p| p.alleles.low_quality);

    let unknown_penalty = unknown * u32::from(config.unknown_phenotype_penalty);
    let ambiguity_penalty = if ambiguous { u32::from(config.ambiguity_penalty) } else { 0 };
    let low_quality_penalty = if low_quality { u32::from(config.low_quality_penalty) } else { 0 };

    let mut value = u32::from(base)
        .saturating_sub(unknown_penalty + ambiguity_penalty + low_quality_penalty)
        .min(100);
    if selection.is_fallback() {
        value = value.min(u32::from(config.fallback_confidence_ceiling));
    }

    ConfidenceBreakdown {
        base,
        unknown_phenotypes: unknown.min(u32::from(u8::MAX)) as u8,
        unknown_penalty,
        ambiguity_penalty,
        low_quality_penalty,
        // value <= 100 after the clamp above
        score: value as u8,
    }
}
