// ==============================================================================
// config.rs - Engine Configuration
// ==============================================================================
// Description: Input limits and confidence scoring constants for the engine
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MAX_INPUT_BYTES: u64 = 50 * 1024 * 1024; // 50 MB decompressed
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 60;

/// Tunables for one engine instance. Shared read-only across analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum decompressed size of a variant file
    pub max_input_bytes: u64,

    /// Wall-clock budget for reading the variant file
    pub read_timeout_secs: u64,

    /// Wall-clock budget for a whole analysis (async entry point only)
    pub analysis_timeout_secs: u64,

    /// Calls with QUAL below this count as low-quality evidence
    pub min_call_quality: f64,

    /// Deducted once per Unknown phenotype among the drug's genes
    pub unknown_phenotype_penalty: u8,

    /// Deducted when allele resolution hit a tie for any of the drug's genes
    pub ambiguity_penalty: u8,

    /// Deducted when a resolved allele rests on a low-quality call
    pub low_quality_penalty: u8,

    /// Score ceiling when no guideline rule matched
    pub fallback_confidence_ceiling: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            analysis_timeout_secs: DEFAULT_ANALYSIS_TIMEOUT_SECS,
            min_call_quality: 20.0,
            unknown_phenotype_penalty: 25,
            ambiguity_penalty: 15,
            low_quality_penalty: 10,
            fallback_confidence_ceiling: 80,
        }
    }
}

impl EngineConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    /// Set the decompressed input size limit
    pub fn with_max_input_bytes(mut self, bytes: u64) -> Self {
        self.max_input_bytes = bytes;
        self
    }

    /// Set the read timeout in seconds
    pub fn with_read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    /// Set the overall analysis timeout in seconds
    pub fn with_analysis_timeout_secs(mut self, secs: u64) -> Self {
        self.analysis_timeout_secs = secs;
        self
    }

    /// Set the minimum QUAL for a call to count as good evidence
    pub fn with_min_call_quality(mut self, quality: f64) -> Self {
        self.min_call_quality = quality;
        self
    }
}
