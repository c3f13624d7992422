// ==============================================================================
// report.rs - Analysis Result Assembly
// ==============================================================================
// Description: Merges rule selection, phenotypes, interactions and confidence
//              into the AnalysisResult handed to the presentation layer
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

use tracing::error;

use crate::confidence::ConfidenceBreakdown;
use crate::error::AnalysisError;
use crate::models::{AnalysisResult, Phenotype, RiskLevel, Zygosity, NOT_APPLICABLE};
use crate::phenotype::{profile_for, GeneProfile};
use crate::rules::{InteractionFinding, RuleSelection};

/// Parse warnings listed individually before the rest are summarized
const MAX_LISTED_PARSE_WARNINGS: usize = 10;

/// Everything the assembler merges
#[derive(Debug, Clone)]
pub struct ReportInput<'a> {
    /// Drug as requested (trimmed)
    pub drug: &'a str,
    pub selection: &'a RuleSelection<'a>,
    pub profiles: &'a [GeneProfile],
    pub interaction: Option<&'a InteractionFinding<'a>>,
    pub confidence: ConfidenceBreakdown,
    /// Request-level notes (co-medication normalization)
    pub request_notes: &'a [String],
    /// Reader warnings, already formatted ("line N: reason")
    pub parse_warnings: &'a [String],
    pub knowledge_base_version: &'a str,
}

fn describe_alleles(profile: &GeneProfile) -> String {
    if profile.alleles.alleles.is_empty() {
        return "no variant alleles detected".to_string();
    }
    let found: Vec<String> = profile
        .alleles
        .alleles
        .iter()
        .map(|a| {
            let zygosity = match a.zygosity {
                Zygosity::Homozygous => "homozygous",
                Zygosity::Heterozygous => "heterozygous",
            };
            format!("{} {}", a.allele_name, zygosity)
        })
        .collect();
    let supporting: Vec<String> = profile
        .alleles
        .supporting_variants
        .iter()
        .map(|v| v.to_string())
        .collect();
    if supporting.is_empty() {
        format!("alleles: {}", found.join(", "))
    } else {
        format!(
            "alleles: {}; supporting variants: {}",
            found.join(", "),
            supporting.join(", ")
        )
    }
}

fn describe_gene(profile: &GeneProfile) -> String {
    format!(
        "{} diplotype {} ({}) gives {}.",
        profile.gene(),
        profile.assignment.diplotype_label(),
        describe_alleles(profile),
        profile.phenotype().label()
    )
}

fn describe_confidence(confidence: &ConfidenceBreakdown) -> String {
    let mut penalties = Vec::new();
    if confidence.unknown_penalty > 0 {
        penalties.push(format!(
            "unknown phenotype x{} -{}",
            confidence.unknown_phenotypes, confidence.unknown_penalty
        ));
    }
    if confidence.ambiguity_penalty > 0 {
        penalties.push(format!("allele ambiguity -{}", confidence.ambiguity_penalty));
    }
    if confidence.low_quality_penalty > 0 {
        penalties.push(format!("low-quality call -{}", confidence.low_quality_penalty));
    }
    if penalties.is_empty() {
        format!("Confidence {} (base {}).", confidence.score, confidence.base)
    } else {
        format!(
            "Confidence {} (base {}; {}).",
            confidence.score,
            confidence.base,
            penalties.join("; ")
        )
    }
}

fn collect_notes(input: &ReportInput<'_>) -> Vec<String> {
    let mut notes: Vec<String> = input
        .profiles
        .iter()
        .flat_map(|p| p.warnings.iter().cloned())
        .collect();
    notes.extend(input.request_notes.iter().cloned());

    let listed = input.parse_warnings.len().min(MAX_LISTED_PARSE_WARNINGS);
    notes.extend(input.parse_warnings[..listed].iter().cloned());
    if input.parse_warnings.len() > listed {
        notes.push(format!(
            "{} more input line warning(s) omitted",
            input.parse_warnings.len() - listed
        ));
    }
    notes
}

/// Compose the final result
///
/// # Returns
/// * `Ok(AnalysisResult)` - fully populated record
/// * `Err(AnalysisError::InternalConsistency)` - the selection names a gene
///   that was never classified
pub fn assemble(input: &ReportInput<'_>) -> Result<AnalysisResult, AnalysisError> {
    let drug = input.drug.trim();

    let primary = match input.selection.primary_gene() {
        Some(gene) => match profile_for(input.profiles, gene) {
            Some(profile) => Some(profile),
            None => {
                error!(
                    "Internal consistency: primary gene {} for '{}' has no classification ({} genes classified)",
                    gene,
                    drug,
                    input.profiles.len()
                );
                return Err(AnalysisError::InternalConsistency(format!(
                    "primary gene {} was not classified",
                    gene
                )));
            }
        },
        None if input.selection.is_fallback() => None,
        None => {
            return Err(AnalysisError::InternalConsistency(
                "matched rule has no primary gene".to_string(),
            ))
        }
    };

    let (primary_gene, phenotype, diplotype) = match primary {
        Some(p) => (
            p.gene().to_string(),
            p.phenotype(),
            p.assignment.diplotype_label(),
        ),
        None => (
            NOT_APPLICABLE.to_string(),
            Phenotype::Unknown,
            NOT_APPLICABLE.to_string(),
        ),
    };

    let (risk_level, recommendation, summary, mechanism, rule_sentence) = match input.selection {
        RuleSelection::Matched(rule) => (
            rule.risk_level,
            rule.recommendation.clone(),
            rule.patient_summary
                .clone()
                .unwrap_or_else(|| rule.risk_level.default_patient_summary().to_string()),
            rule.mechanism.clone(),
            format!(
                "Guideline rule for {} applies to {} {} (priority {}, evidence weight {}).",
                drug,
                primary_gene,
                phenotype.label(),
                rule.priority,
                rule.evidence_weight
            ),
        ),
        RuleSelection::Fallback { primary_gene: Some(_) } => (
            RiskLevel::Safe,
            format!(
                "No guideline recommendation covers this {} result for {}. Prescribe per standard clinical practice and monitor response.",
                primary_gene, drug
            ),
            RiskLevel::Safe.default_patient_summary().to_string(),
            format!(
                "No documented {} mechanism affects {} for the {} phenotype.",
                primary_gene,
                drug,
                phenotype.label()
            ),
            format!(
                "No guideline rule for {} matches {} {}; no known risk is documented, which is not confirmation of safety.",
                drug,
                primary_gene,
                phenotype.label()
            ),
        ),
        RuleSelection::Fallback { primary_gene: None } => (
            RiskLevel::Safe,
            format!(
                "No pharmacogenomic guideline is defined for {}. Prescribe per standard clinical practice.",
                drug
            ),
            RiskLevel::Safe.default_patient_summary().to_string(),
            format!(
                "No pharmacogenomic mechanism for {} is documented in knowledge base {}.",
                drug, input.knowledge_base_version
            ),
            format!(
                "No guideline rules for {} exist in knowledge base {}; no genes were evaluated.",
                drug, input.knowledge_base_version
            ),
        ),
    };

    let mut reasoning = Vec::new();
    if let Some(p) = primary {
        reasoning.push(describe_gene(p));
    }
    reasoning.push(rule_sentence);

    let others: Vec<String> = input
        .profiles
        .iter()
        .filter(|p| Some(p.gene()) != primary.map(|x| x.gene()))
        .map(describe_gene)
        .collect();
    if !others.is_empty() {
        reasoning.push(format!("Also evaluated: {}", others.join(" ")));
    }
    reasoning.push(describe_confidence(&input.confidence));

    let notes = collect_notes(input);
    if !notes.is_empty() {
        reasoning.push(format!("Notes: {}", notes.join("; ")));
    }

    Ok(AnalysisResult {
        drug_name: drug.to_string(),
        risk_level,
        primary_gene,
        phenotype,
        diplotype,
        clinical_recommendation: recommendation,
        patient_summary: summary,
        confidence_score: input.confidence.score,
        interaction_detected: input.interaction.is_some(),
        interaction_detail: input.interaction.map(|i| i.detail()),
        interaction_explanation: input.interaction.map(|i| i.explanation()),
        gene_reasoning: reasoning.join(" "),
        biological_mechanism: mechanism,
        knowledge_base_version: input.knowledge_base_version.to_string(),
    })
}

/// Serialize a result for transport
pub fn to_json(result: &AnalysisResult, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(result)
    } else {
        serde_json::to_string(result)
    }
}

/// Parse a result produced by [`to_json`]
pub fn from_json(text: &str) -> serde_json::Result<AnalysisResult> {
    serde_json::from_str(text)
}
