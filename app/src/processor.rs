// ==============================================================================
// processor.rs - Analysis Pipeline
// ==============================================================================
// Description: Runs variant file + drug + co-medications through reader,
//              resolver, classifier, rule engine, scorer and assembler
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-18
// Version: 3.0.0
// ==============================================================================
// One analysis is a self-contained synchronous call. The knowledge base is
// shared read-only through an Arc; nothing is mutated between analyses.
// ==============================================================================

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::audit::{AuditEvent, AuditEventType, LogSeverity};
use crate::confidence;
use crate::config::EngineConfig;
use crate::error::{AnalysisError, KnowledgeBaseError, TimeoutError};
use crate::knowledge_base::KnowledgeBase;
use crate::models::AnalysisResult;
use crate::parsers::{read_variant_calls, ReadLimits, VariantSet};
use crate::phenotype::{profile_gene, GeneProfile};
use crate::report::{self, ReportInput};
use crate::rules::{candidate_genes, detect_interaction, select_rule};
use crate::validator::{open_variant_stream, validate_request, ValidatedRequest};

/// Pharmacogenomic analysis engine
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    kb: Arc<KnowledgeBase>,
    config: EngineConfig,
}

impl AnalysisEngine {
    pub fn new(kb: Arc<KnowledgeBase>, config: EngineConfig) -> Self {
        Self { kb, config }
    }

    /// Engine over the knowledge base compiled into the crate
    pub fn with_builtin_knowledge_base(config: EngineConfig) -> Result<Self, KnowledgeBaseError> {
        Ok(Self::new(Arc::new(KnowledgeBase::builtin()?), config))
    }

    /// Version of the knowledge base every result of this engine is based on
    pub fn knowledge_base_version(&self) -> &str {
        self.kb.version()
    }

    /// Analyze a variant file for one drug
    ///
    /// # Arguments
    /// * `variant_file` - VCF bytes, plain or gzip/BGZF compressed
    /// * `drug` - Drug name (case-insensitive)
    /// * `co_medications` - Comma-separated co-medication list (may be empty)
    pub fn analyze(
        &self,
        variant_file: &[u8],
        drug: &str,
        co_medications: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.analyze_cancellable(variant_file, drug, co_medications, &CancellationToken::new())
    }

    /// Like [`analyze`](Self::analyze), aborting with `AnalysisError::Cancelled`
    /// once `cancel` fires. The token is checked after reading and before each
    /// gene is resolved.
    pub fn analyze_cancellable(
        &self,
        variant_file: &[u8],
        drug: &str,
        co_medications: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        let analysis_id = Uuid::new_v4();

        let request = match validate_request(
            variant_file,
            drug,
            co_medications,
            self.config.max_input_bytes,
        ) {
            Ok(request) => request,
            Err(error) => {
                self.audit_outcome(analysis_id, drug.trim(), None, Err(&error));
                return Err(error);
            }
        };

        info!(
            "Analysis {} started: drug '{}', {} co-medication(s), {} input bytes{}",
            analysis_id,
            request.drug,
            request.co_medications.names.len(),
            request.input_bytes,
            if request.compressed { " (gzip)" } else { "" }
        );

        self.audit(
            AuditEvent::new(
                AuditEventType::AnalysisRequested,
                analysis_id,
                Some(request.drug.clone()),
                serde_json::json!({
                    "co_medications": request.co_medications.names,
                    "input_bytes": request.input_bytes,
                    "compressed": request.compressed,
                }),
            )
            .with_input_digest(request.input_sha256.as_str()),
        );

        let outcome = self.run(&request, variant_file, cancel);
        self.audit_outcome(
            analysis_id,
            &request.drug,
            Some(request.input_sha256.as_str()),
            outcome.as_ref(),
        );
        outcome
    }

    fn run(
        &self,
        request: &ValidatedRequest,
        variant_file: &[u8],
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        // 1. Read
        let stream = open_variant_stream(variant_file, self.config.max_input_bytes);
        let variants = read_variant_calls(stream, ReadLimits::from(&self.config))?;
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        // 2. Resolve + classify, only genes the drug's rules need
        let profiles = self.profile_genes(&request.drug, &variants, cancel)?;

        // 3. Rules
        let names = &request.co_medications.names;
        let selection = select_rule(&self.kb, &request.drug, &profiles, names)?;
        let interaction = detect_interaction(&self.kb, &request.drug, names);

        // 4. Score
        let confidence = confidence::score(&selection, &profiles, &self.config);

        // 5. Assemble
        let parse_warnings: Vec<String> = variants.warnings().iter().map(|w| w.to_string()).collect();
        report::assemble(&ReportInput {
            drug: &request.drug,
            selection: &selection,
            profiles: &profiles,
            interaction: interaction.as_ref(),
            confidence,
            request_notes: &request.co_medications.notes,
            parse_warnings: &parse_warnings,
            knowledge_base_version: self.kb.version(),
        })
    }

    /// Profile every gene the drug's rules reference, checking `cancel`
    /// before each one
    fn profile_genes(
        &self,
        drug: &str,
        variants: &VariantSet,
        cancel: &CancellationToken,
    ) -> Result<Vec<GeneProfile>, AnalysisError> {
        let genes = candidate_genes(&self.kb, drug);
        debug!("Genes for '{}': {:?}", drug, genes);

        let mut profiles: Vec<GeneProfile> = Vec::with_capacity(genes.len());
        for gene in &genes {
            if cancel.is_cancelled() {
                info!(
                    "Analysis cancelled before {} ({} of {} genes done)",
                    gene,
                    profiles.len(),
                    genes.len()
                );
                return Err(AnalysisError::Cancelled);
            }
            let table = self
                .kb
                .gene(gene)
                .ok_or_else(|| KnowledgeBaseError::UnknownGene { gene: gene.clone() })?;
            profiles.push(profile_gene(table, variants, self.config.min_call_quality));
        }
        Ok(profiles)
    }

    /// Run an analysis on the blocking pool under the configured deadline
    ///
    /// On expiry the analysis is cancelled and `TimeoutError::AnalysisTimedOut`
    /// is returned. The variant bytes are wiped when the analysis finishes.
    pub async fn analyze_with_timeout(
        &self,
        variant_file: Zeroizing<Vec<u8>>,
        drug: String,
        co_medications: String,
    ) -> Result<AnalysisResult, AnalysisError> {
        let limit = self.config.analysis_timeout();
        let cancel = CancellationToken::new();

        let engine = self.clone();
        let worker_cancel = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            engine.analyze_cancellable(&variant_file, &drug, &co_medications, &worker_cancel)
        });

        match tokio::time::timeout(limit, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => {
                error!("Analysis task failed: {}", join_error);
                Err(AnalysisError::InternalConsistency(format!(
                    "analysis task failed: {}",
                    join_error
                )))
            }
            Err(_) => {
                cancel.cancel();
                warn!("Analysis exceeded {:?}; cancelled", limit);
                Err(TimeoutError::AnalysisTimedOut { limit }.into())
            }
        }
    }

    fn audit(&self, event: AuditEvent) {
        event
            .with_knowledge_base(self.kb.version(), self.kb.fingerprint())
            .log();
    }

    fn audit_outcome(
        &self,
        analysis_id: Uuid,
        drug: &str,
        input_sha256: Option<&str>,
        outcome: Result<&AnalysisResult, &AnalysisError>,
    ) {
        let resource = (!drug.is_empty()).then(|| drug.to_string());

        let event = match outcome {
            Ok(result) => {
                info!(
                    "Analysis {} complete: {} {} {} (confidence {})",
                    analysis_id,
                    result.drug_name,
                    result.primary_gene,
                    result.risk_level.as_str(),
                    result.confidence_score
                );
                AuditEvent::new(
                    AuditEventType::AnalysisCompleted,
                    analysis_id,
                    resource,
                    serde_json::json!({
                        "risk_level": result.risk_level,
                        "primary_gene": result.primary_gene,
                        "confidence_score": result.confidence_score,
                        "interaction_detected": result.interaction_detected,
                    }),
                )
            }
            Err(e) => {
                let event_type = match e {
                    AnalysisError::Input(_) | AnalysisError::Timeout(_) | AnalysisError::Cancelled => {
                        warn!("Analysis {} rejected: {}", analysis_id, e);
                        AuditEventType::AnalysisRejected
                    }
                    AnalysisError::KnowledgeBase(_) | AnalysisError::InternalConsistency(_) => {
                        error!("Analysis {} failed: {:?}", analysis_id, e);
                        AuditEventType::AnalysisFailed
                    }
                };
                let event = AuditEvent::new(
                    event_type,
                    analysis_id,
                    resource,
                    serde_json::json!({
                        "category": e.category(),
                        "error": e.to_string(),
                        "retryable": e.is_retryable(),
                    }),
                );
                if matches!(e, AnalysisError::InternalConsistency(_)) {
                    event.with_severity(LogSeverity::Critical)
                } else {
                    event
                }
            }
        };

        let event = match input_sha256 {
            Some(digest) => event.with_input_digest(digest),
            None => event,
        };
        self.audit(event);
    }
}
