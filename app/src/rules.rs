// ==============================================================================
// rules.rs - Guideline and Interaction Rule Engine
// ==============================================================================
// Description: Selects the applicable gene-drug guideline rule and detects
//              drug-drug interactions with co-medications
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Selection:
//   1. Guideline rules for the drug (case-insensitive)
//   2. ...whose required phenotypes contain the gene's classified phenotype and
//      whose interacting drugs (if any) appear among the co-medications
//   3. Highest priority wins; a tie at the top is a knowledge base error
//   4. Nothing left: fallback (Safe, capped confidence)
// Interactions never change the selected risk level.
// ==============================================================================

use tracing::{debug, info};

use crate::error::KnowledgeBaseError;
use crate::knowledge_base::{drug_key, gene_key, GuidelineRule, InteractionRule, KnowledgeBase};
use crate::phenotype::{profile_for, GeneProfile};

/// Outcome of guideline rule selection
#[derive(Debug, Clone, PartialEq)]
pub enum RuleSelection<'a> {
    /// A guideline rule applies
    Matched(&'a GuidelineRule),

    /// No rule applies; `primary_gene` is the gene of the drug's
    /// highest-priority rule, or None when the drug has no rules
    Fallback { primary_gene: Option<String> },
}

impl RuleSelection<'_> {
    pub fn primary_gene(&self) -> Option<&str> {
        match self {
            RuleSelection::Matched(rule) => Some(rule.required_gene.as_str()),
            RuleSelection::Fallback { primary_gene } => primary_gene.as_deref(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, RuleSelection::Fallback { .. })
    }
}

/// Genes referenced by the drug's guideline rules, first appearance order
pub fn candidate_genes(kb: &KnowledgeBase, drug: &str) -> Vec<String> {
    let mut genes: Vec<String> = Vec::new();
    for rule in kb.rules_for_drug(drug) {
        let gene = gene_key(&rule.required_gene);
        if !genes.contains(&gene) {
            genes.push(gene);
        }
    }
    genes
}

/// First rule with the highest priority
fn highest_priority<'a, I>(rules: I) -> Option<&'a GuidelineRule>
where
    I: IntoIterator<Item = &'a GuidelineRule>,
{
    rules.into_iter().fold(None, |best, rule| match best {
        Some(b) if b.priority >= rule.priority => Some(b),
        _ => Some(rule),
    })
}

/// Select the guideline rule for a drug
///
/// # Arguments
/// * `kb` - Knowledge base
/// * `drug` - Requested drug (any case, surrounding whitespace ignored)
/// * `profiles` - Classified genes for this drug
/// * `co_medications` - Normalized co-medication list
///
/// # Returns
/// * `Ok(RuleSelection)` - a matched rule or the fallback
/// * `Err(KnowledgeBaseError::RuleConflict)` - several rules share the top priority
pub fn select_rule<'a>(
    kb: &'a KnowledgeBase,
    drug: &str,
    profiles: &[GeneProfile],
    co_medications: &[String],
) -> Result<RuleSelection<'a>, KnowledgeBaseError> {
    let candidates: Vec<&GuidelineRule> = kb.rules_for_drug(drug).collect();

    let matching: Vec<&GuidelineRule> = candidates
        .iter()
        .copied()
        .filter(|rule| {
            profile_for(profiles, &rule.required_gene)
                .map(|p| rule.requires_phenotype(p.phenotype()))
                .unwrap_or(false)
        })
        .filter(|rule| rule.co_medication_condition_met(co_medications))
        .collect();

    debug!(
        "{} candidate rules for '{}', {} match",
        candidates.len(),
        drug_key(drug),
        matching.len()
    );

    let Some(best) = highest_priority(matching.iter().copied()) else {
        let primary_gene = highest_priority(candidates.iter().copied())
            .map(|rule| canonical_gene(profiles, &rule.required_gene));
        info!(
            "No guideline rule matched for '{}'; using fallback (primary gene: {})",
            drug_key(drug),
            primary_gene.as_deref().unwrap_or("none")
        );
        return Ok(RuleSelection::Fallback { primary_gene });
    };

    let tied = matching.iter().filter(|r| r.priority == best.priority).count();
    if tied > 1 {
        let phenotype = profile_for(profiles, &best.required_gene)
            .map(|p| p.phenotype().as_str())
            .unwrap_or("Unknown");
        return Err(KnowledgeBaseError::RuleConflict {
            drug: drug_key(drug),
            gene: best.required_gene.clone(),
            phenotype: phenotype.to_string(),
            priority: best.priority,
            count: tied,
        });
    }

    info!(
        "Rule matched for '{}': {} {} (priority {})",
        drug_key(drug),
        best.required_gene,
        best.risk_level.as_str(),
        best.priority
    );
    Ok(RuleSelection::Matched(best))
}

fn canonical_gene(profiles: &[GeneProfile], gene: &str) -> String {
    profile_for(profiles, gene)
        .map(|p| p.gene().to_string())
        .unwrap_or_else(|| gene.trim().to_string())
}

/// Interaction between the requested drug and one co-medication
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionFinding<'a> {
    /// Co-medication as the caller spelled it
    pub co_medication: String,
    pub rule: &'a InteractionRule,
}

impl InteractionFinding<'_> {
    pub fn detail(&self) -> String {
        format!("Interaction with {}", self.co_medication)
    }

    pub fn explanation(&self) -> String {
        self.rule.effect_description.clone()
    }
}

/// Find the most severe interaction between `drug` and any co-medication
///
/// Rules match in either direction. Equal severity keeps the rule listed
/// first in the knowledge base.
pub fn detect_interaction<'a>(
    kb: &'a KnowledgeBase,
    drug: &str,
    co_medications: &[String],
) -> Option<InteractionFinding<'a>> {
    let mut best: Option<InteractionFinding<'a>> = None;

    for rule in kb.interaction_rules() {
        let Some(co_medication) = co_medications.iter().find(|med| rule.involves(drug, med)) else {
            continue;
        };
        let stronger = best
            .as_ref()
            .map(|b| rule.severity_modifier > b.rule.severity_modifier)
            .unwrap_or(true);
        if stronger {
            best = Some(InteractionFinding {
                co_medication: co_medication.clone(),
                rule,
            });
        }
    }

    if let Some(found) = &best {
        info!(
            "Interaction detected: {} + {} (severity {})",
            drug_key(drug),
            drug_key(&found.co_medication),
            found.rule.severity_modifier
        );
    }

    best
}
