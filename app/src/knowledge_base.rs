// ==============================================================================
// knowledge_base.rs - Pharmacogenomic Knowledge Base
// ==============================================================================
// Description: Loads, validates and indexes allele definitions, diplotype
//              translation tables, guideline rules and interaction rules
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================
// The knowledge base is loaded once per process and shared read-only (Arc)
// between concurrent analyses. Nothing here mutates after construction.
// ==============================================================================

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use crate::error::KnowledgeBaseError;
use crate::models::{normalize_chromosome, Diplotype, Locus, Phenotype, RiskLevel};

/// Demonstration knowledge base compiled into the binary
const BUILTIN_KNOWLEDGE_BASE: &str = include_str!("../data/knowledge_base.json");

/// Canonical key for drug names: trimmed, lowercase
pub fn drug_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Canonical key for gene symbols: trimmed, uppercase
pub fn gene_key(name: &str) -> String {
    name.trim().to_uppercase()
}

// ==============================================================================
// Document (on-disk JSON layout)
// ==============================================================================

/// Versioned knowledge base document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseDocument {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub genes: Vec<GeneDefinition>,
    #[serde(default)]
    pub guideline_rules: Vec<GuidelineRule>,
    #[serde(default)]
    pub interaction_rules: Vec<InteractionRule>,
}

/// Allele definitions and translation table for one gene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneDefinition {
    pub gene: String,
    /// Wild-type allele assumed when nothing else matches (e.g., "*1")
    pub reference_allele: String,
    #[serde(default)]
    pub alleles: Vec<GeneAlleleDefinition>,
    pub diplotypes: Vec<DiplotypeTranslation>,
}

/// Named allele and the variants that define it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneAlleleDefinition {
    pub name: String,
    pub signature: Vec<VariantSignature>,
}

/// One defining variant (chromosome + position + alternate base)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantSignature {
    pub chromosome: String,
    pub position: u64,
    pub alternate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsid: Option<String>,
}

impl VariantSignature {
    pub fn locus(&self) -> Locus {
        Locus::new(&self.chromosome, self.position)
    }

    /// Identity used to detect overlapping allele definitions
    pub fn key(&self) -> (Locus, String) {
        (self.locus(), self.alternate.to_ascii_uppercase())
    }
}

/// Diplotype to phenotype row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiplotypeTranslation {
    pub alleles: [String; 2],
    pub phenotype: Phenotype,
}

/// Gene-drug guideline rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineRule {
    pub drug: String,
    pub required_gene: String,
    pub required_phenotypes: Vec<Phenotype>,
    /// Rule only applies when one of these is a co-medication (empty = always)
    #[serde(default)]
    pub interacting_drugs: Vec<String>,
    pub risk_level: RiskLevel,
    pub recommendation: String,
    pub mechanism: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_summary: Option<String>,
    pub priority: i32,
    /// Strength of the underlying guideline evidence (0-100)
    pub evidence_weight: u8,
}

impl GuidelineRule {
    pub fn requires_phenotype(&self, phenotype: Phenotype) -> bool {
        self.required_phenotypes.contains(&phenotype)
    }

    /// True when the rule has no co-medication condition or one is satisfied
    pub fn co_medication_condition_met(&self, co_medications: &[String]) -> bool {
        self.interacting_drugs.is_empty()
            || self.interacting_drugs.iter().any(|required| {
                co_medications
                    .iter()
                    .any(|med| drug_key(med) == drug_key(required))
            })
    }
}

/// Drug-drug interaction independent of genotype
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRule {
    pub primary_drug: String,
    pub interacting_drug: String,
    pub effect_description: String,
    /// Higher values take precedence when several interactions match
    pub severity_modifier: i32,
}

impl InteractionRule {
    /// Matches (a, b) in either direction
    pub fn involves(&self, a: &str, b: &str) -> bool {
        let (p, i) = (drug_key(&self.primary_drug), drug_key(&self.interacting_drug));
        let (a, b) = (drug_key(a), drug_key(b));
        (p == a && i == b) || (p == b && i == a)
    }
}

// ==============================================================================
// Runtime (indexed) form
// ==============================================================================

/// Indexed view of one gene
#[derive(Debug, Clone)]
pub struct GeneTable {
    gene: String,
    reference_allele: String,
    alleles: Vec<GeneAlleleDefinition>,
    translations: HashMap<Diplotype, Phenotype>,
}

impl GeneTable {
    pub fn gene(&self) -> &str {
        &self.gene
    }

    pub fn reference_allele(&self) -> &str {
        &self.reference_allele
    }

    /// Allele definitions in table order
    pub fn alleles(&self) -> &[GeneAlleleDefinition] {
        &self.alleles
    }

    /// Translation table lookup; order of the pair does not matter
    pub fn phenotype_for(&self, diplotype: &Diplotype) -> Option<Phenotype> {
        self.translations.get(diplotype).copied()
    }
}

/// Counts and identity, for `kb-info` and audit records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseSummary {
    pub version: String,
    pub fingerprint: String,
    pub genes: Vec<String>,
    pub drugs: Vec<String>,
    pub guideline_rules: usize,
    pub interaction_rules: usize,
}

/// Validated, immutable knowledge base
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    version: String,
    fingerprint: String,
    genes: HashMap<String, GeneTable>,
    gene_order: Vec<String>,
    guideline_rules: Vec<GuidelineRule>,
    interaction_rules: Vec<InteractionRule>,
}

impl KnowledgeBase {
    /// Load the demonstration knowledge base shipped with the crate
    pub fn builtin() -> Result<Self, KnowledgeBaseError> {
        Self::from_json_str(BUILTIN_KNOWLEDGE_BASE)
    }

    /// Load a knowledge base document from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KnowledgeBaseError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| KnowledgeBaseError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, KnowledgeBaseError> {
        let document: KnowledgeBaseDocument =
            serde_json::from_str(text).map_err(|e| KnowledgeBaseError::Malformed(e.to_string()))?;
        Self::from_document(document)
    }

    /// Validate and index a parsed document
    pub fn from_document(document: KnowledgeBaseDocument) -> Result<Self, KnowledgeBaseError> {
        let fingerprint = fingerprint_of(&document)?;

        let mut genes = HashMap::new();
        let mut gene_order = Vec::new();

        for definition in document.genes {
            let table = index_gene(definition)?;
            let key = gene_key(&table.gene);
            if genes.contains_key(&key) {
                return Err(KnowledgeBaseError::Malformed(format!(
                    "gene {} is defined more than once",
                    table.gene
                )));
            }
            debug!(
                "Indexed gene {} ({} alleles, {} diplotypes)",
                table.gene,
                table.alleles.len(),
                table.translations.len()
            );
            gene_order.push(key.clone());
            genes.insert(key, table);
        }

        for rule in &document.guideline_rules {
            if !genes.contains_key(&gene_key(&rule.required_gene)) {
                return Err(KnowledgeBaseError::UnknownGene {
                    gene: rule.required_gene.clone(),
                });
            }
            if rule.evidence_weight > 100 {
                return Err(KnowledgeBaseError::InvalidEvidenceWeight {
                    drug: rule.drug.clone(),
                    weight: rule.evidence_weight,
                });
            }
            if drug_key(&rule.drug).is_empty() || rule.required_phenotypes.is_empty() {
                return Err(KnowledgeBaseError::Malformed(format!(
                    "guideline rule for '{}' / {} needs a drug and at least one phenotype",
                    rule.drug, rule.required_gene
                )));
            }
        }

        let kb = Self {
            version: document.version,
            fingerprint,
            genes,
            gene_order,
            guideline_rules: document.guideline_rules,
            interaction_rules: document.interaction_rules,
        };

        info!(
            "Loaded knowledge base {} ({} genes, {} guideline rules, {} interaction rules)",
            kb.version,
            kb.genes.len(),
            kb.guideline_rules.len(),
            kb.interaction_rules.len()
        );

        Ok(kb)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// SHA-256 of the canonical document
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn gene(&self, gene: &str) -> Option<&GeneTable> {
        self.genes.get(&gene_key(gene))
    }

    pub fn guideline_rules(&self) -> &[GuidelineRule] {
        &self.guideline_rules
    }

    pub fn interaction_rules(&self) -> &[InteractionRule] {
        &self.interaction_rules
    }

    /// Guideline rules for a drug, in table order
    pub fn rules_for_drug<'a>(&'a self, drug: &str) -> impl Iterator<Item = &'a GuidelineRule> + 'a {
        let key = drug_key(drug);
        self.guideline_rules
            .iter()
            .filter(move |r| drug_key(&r.drug) == key)
    }

    pub fn summary(&self) -> KnowledgeBaseSummary {
        let genes = self
            .gene_order
            .iter()
            .filter_map(|key| self.genes.get(key))
            .map(|t| t.gene.clone())
            .collect();

        let mut seen = HashSet::new();
        let drugs = self
            .guideline_rules
            .iter()
            .map(|r| drug_key(&r.drug))
            .filter(|d| seen.insert(d.clone()))
            .collect();

        KnowledgeBaseSummary {
            version: self.version.clone(),
            fingerprint: self.fingerprint.clone(),
            genes,
            drugs,
            guideline_rules: self.guideline_rules.len(),
            interaction_rules: self.interaction_rules.len(),
        }
    }
}

fn fingerprint_of(document: &KnowledgeBaseDocument) -> Result<String, KnowledgeBaseError> {
    let canonical =
        serde_json::to_vec(document).map_err(|e| KnowledgeBaseError::Malformed(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

fn index_gene(definition: GeneDefinition) -> Result<GeneTable, KnowledgeBaseError> {
    let gene = definition.gene.trim().to_string();
    let reference = definition.reference_allele.trim().to_string();

    let mut names = HashSet::new();
    names.insert(reference.clone());

    let mut alleles = Vec::with_capacity(definition.alleles.len());
    for mut allele in definition.alleles {
        if !names.insert(allele.name.clone()) {
            return Err(KnowledgeBaseError::DuplicateAllele {
                gene: gene.clone(),
                allele: allele.name,
            });
        }
        if allele.signature.is_empty() {
            return Err(KnowledgeBaseError::EmptySignature {
                gene: gene.clone(),
                allele: allele.name,
            });
        }
        for variant in &mut allele.signature {
            variant.chromosome = normalize_chromosome(&variant.chromosome);
            variant.alternate = variant.alternate.trim().to_ascii_uppercase();
        }
        alleles.push(allele);
    }

    let mut translations = HashMap::new();
    for row in definition.diplotypes {
        let [a, b] = row.alleles;
        let diplotype = Diplotype::new(a.trim(), b.trim());
        if translations.insert(diplotype.clone(), row.phenotype).is_some() {
            return Err(KnowledgeBaseError::Malformed(format!(
                "diplotype {} {} is listed more than once",
                gene, diplotype
            )));
        }
    }

    if !translations.contains_key(&Diplotype::new(reference.as_str(), reference.as_str())) {
        return Err(KnowledgeBaseError::MissingReferenceDiplotype { gene, reference });
    }

    Ok(GeneTable {
        gene,
        reference_allele: reference,
        alleles,
        translations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "version": "test-1",
        "genes": [{
            "gene": "GENE1",
            "reference_allele": "*1",
            "alleles": [{ "name": "*2", "signature": [{ "chromosome": "chr1", "position": 100, "alternate": "t" }] }],
            "diplotypes": [
                { "alleles": ["*1", "*1"], "phenotype": "NormalMetabolizer" },
                { "alleles": ["*2", "*1"], "phenotype": "IntermediateMetabolizer" }
            ]
        }],
        "guideline_rules": [{
            "drug": "DrugA",
            "required_gene": "gene1",
            "required_phenotypes": ["IntermediateMetabolizer"],
            "risk_level": "AdjustDosage",
            "recommendation": "Reduce dose.",
            "mechanism": "Slower clearance.",
            "priority": 1,
            "evidence_weight": 90
        }],
        "interaction_rules": [{
            "primary_drug": "DrugA",
            "interacting_drug": "DrugB",
            "effect_description": "B inhibits A clearance.",
            "severity_modifier": 2
        }]
    }"#;

    #[test]
    fn test_builtin_knowledge_base_loads() {
        let kb = KnowledgeBase::builtin().unwrap();
        assert_eq!(kb.version(), "2026.10-demo");
        assert_eq!(kb.fingerprint().len(), 64);

        let summary = kb.summary();
        assert_eq!(summary.genes, vec!["CYP2C9", "CYP2C19", "CYP2D6", "SLCO1B1", "TPMT"]);
        assert!(summary.drugs.contains(&"warfarin".to_string()));
        assert!(!summary.drugs.contains(&"acetaminophen".to_string()));
    }

    #[test]
    fn test_indexing_normalizes_keys() {
        let kb = KnowledgeBase::from_json_str(MINIMAL).unwrap();
        let table = kb.gene("gene1").unwrap();
        assert_eq!(table.reference_allele(), "*1");
        assert_eq!(table.alleles()[0].signature[0].chromosome, "1");
        assert_eq!(table.alleles()[0].signature[0].alternate, "T");
        assert_eq!(
            table.phenotype_for(&Diplotype::new("*1", "*2")),
            Some(Phenotype::IntermediateMetabolizer)
        );
        assert_eq!(table.phenotype_for(&Diplotype::new("*2", "*2")), None);

        assert_eq!(kb.rules_for_drug("  drugA ").count(), 1);
        let interaction = &kb.interaction_rules()[0];
        assert!(interaction.involves("drugb", "DRUGA"));
        assert!(!interaction.involves("druga", "drugc"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = KnowledgeBase::from_json_str(MINIMAL).unwrap();
        let b = KnowledgeBase::from_json_str(MINIMAL).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let changed = MINIMAL.replace("test-1", "test-2");
        let c = KnowledgeBase::from_json_str(&changed).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_rule_for_undefined_gene_is_rejected() {
        let text = MINIMAL.replace("\"required_gene\": \"gene1\"", "\"required_gene\": \"GENE9\"");
        assert_eq!(
            KnowledgeBase::from_json_str(&text).unwrap_err(),
            KnowledgeBaseError::UnknownGene { gene: "GENE9".to_string() }
        );
    }

    #[test]
    fn test_reference_diplotype_is_required() {
        let text = MINIMAL.replace(
            r#"{ "alleles": ["*1", "*1"], "phenotype": "NormalMetabolizer" },"#,
            "",
        );
        assert!(matches!(
            KnowledgeBase::from_json_str(&text).unwrap_err(),
            KnowledgeBaseError::MissingReferenceDiplotype { .. }
        ));
    }

    #[test]
    fn test_empty_signature_is_rejected() {
        let text = MINIMAL.replace(
            r#"[{ "chromosome": "chr1", "position": 100, "alternate": "t" }]"#,
            "[]",
        );
        assert!(matches!(
            KnowledgeBase::from_json_str(&text).unwrap_err(),
            KnowledgeBaseError::EmptySignature { .. }
        ));
    }

    #[test]
    fn test_evidence_weight_range() {
        let text = MINIMAL.replace("\"evidence_weight\": 90", "\"evidence_weight\": 120");
        assert!(matches!(
            KnowledgeBase::from_json_str(&text).unwrap_err(),
            KnowledgeBaseError::InvalidEvidenceWeight { weight: 120, .. }
        ));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            KnowledgeBase::from_json_str("{ not json").unwrap_err(),
            KnowledgeBaseError::Malformed(_)
        ));
    }

    #[test]
    fn test_open_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, MINIMAL).unwrap();
        let kb = KnowledgeBase::open(&path).unwrap();
        assert_eq!(kb.version(), "test-1");

        let missing = KnowledgeBase::open(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, KnowledgeBaseError::Io(_)));
    }

    #[test]
    fn test_co_medication_condition() {
        let kb = KnowledgeBase::from_json_str(MINIMAL).unwrap();
        let mut rule = kb.guideline_rules()[0].clone();
        assert!(rule.co_medication_condition_met(&[]));

        rule.interacting_drugs = vec!["Omeprazole".to_string()];
        assert!(!rule.co_medication_condition_met(&[]));
        assert!(rule.co_medication_condition_met(&["omeprazole".to_string()]));
    }
}
