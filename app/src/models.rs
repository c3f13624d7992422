// ==============================================================================
// models.rs - Pharmacogenomic Data Models
// ==============================================================================
// Description: Variant calls, alleles, diplotypes, phenotypes and the analysis result
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-10-18
// Version: 3.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Placeholder used when no gene or diplotype applies to a result
pub const NOT_APPLICABLE: &str = "N/A";

/// Diplotype label used when more than two allele copies resolve for a gene
pub const INDETERMINATE_DIPLOTYPE: &str = "indeterminate";

/// Normalize a chromosome name so "chr10", "CHR10" and "10" compare equal
pub fn normalize_chromosome(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = match trimmed.get(..3) {
        Some(prefix) if trimmed.len() > 3 && prefix.eq_ignore_ascii_case("chr") => &trimmed[3..],
        _ => trimmed,
    };
    stripped.to_ascii_uppercase()
}

/// Genomic coordinate of a call (normalized chromosome, 1-based position)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Locus {
    pub chromosome: String,
    pub position: u64,
}

impl Locus {
    pub fn new(chromosome: &str, position: u64) -> Self {
        Self {
            chromosome: normalize_chromosome(chromosome),
            position,
        }
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chr{}:{}", self.chromosome, self.position)
    }
}

/// Genotype syntax problems
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenotypeError {
    #[error("no-call genotype '{0}'")]
    NoCall(String),

    #[error("unrecognized genotype '{0}'")]
    Unrecognized(String),
}

/// Diploid genotype as a pair of allele indices (0 = REF, 1.. = ALT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genotype {
    pub first: usize,
    pub second: usize,
    pub phased: bool,
}

impl Genotype {
    /// Parse a VCF GT value such as "0/1", "1|1" or "0|2"
    pub fn parse(gt: &str) -> Result<Self, GenotypeError> {
        let (separator, phased) = if gt.contains('|') {
            ('|', true)
        } else {
            ('/', false)
        };

        let parts: Vec<&str> = gt.split(separator).collect();
        if parts.len() != 2 {
            return Err(GenotypeError::Unrecognized(gt.to_string()));
        }

        if parts.iter().any(|p| *p == ".") {
            return Err(GenotypeError::NoCall(gt.to_string()));
        }

        let first = parts[0]
            .parse::<usize>()
            .map_err(|_| GenotypeError::Unrecognized(gt.to_string()))?;
        let second = parts[1]
            .parse::<usize>()
            .map_err(|_| GenotypeError::Unrecognized(gt.to_string()))?;

        Ok(Self { first, second, phased })
    }

    /// Number of chromosomes (0-2) carrying the allele at `index`
    pub fn copies_of(&self, index: usize) -> u8 {
        u8::from(self.first == index) + u8::from(self.second == index)
    }

    pub fn max_index(&self) -> usize {
        self.first.max(self.second)
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.phased { '|' } else { '/' };
        write!(f, "{}{}{}", self.first, sep, self.second)
    }
}

/// A single normalized variant call for the analysed sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantCall {
    /// Chromosome without "chr" prefix (e.g., "10", "X")
    pub chromosome: String,

    /// 1-based position
    pub position: u64,

    /// rsID from the ID column, if present
    pub id: Option<String>,

    /// Reference allele (e.g., "C")
    pub reference_allele: String,

    /// Alternate alleles in ALT column order
    pub alternate_alleles: Vec<String>,

    /// Genotype of the first sample
    pub genotype: Genotype,

    /// PHRED-scaled QUAL, None when "."
    pub quality_score: Option<f64>,

    /// FILTER column, None when "."
    pub filter: Option<String>,
}

impl VariantCall {
    pub fn locus(&self) -> Locus {
        Locus {
            chromosome: self.chromosome.clone(),
            position: self.position,
        }
    }

    /// Identifiers from the ID column ("rs1;rs2" lists several)
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.id
            .as_deref()
            .unwrap_or("")
            .split(';')
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != ".")
    }

    /// True when the ID column carries `rsid` (case-insensitive)
    pub fn has_id(&self, rsid: &str) -> bool {
        self.ids().any(|id| id.eq_ignore_ascii_case(rsid))
    }

    /// Genotype index of an alternate allele (1-based, 0 is REF)
    pub fn alternate_index(&self, alternate: &str) -> Option<usize> {
        self.alternate_alleles
            .iter()
            .position(|a| a.eq_ignore_ascii_case(alternate))
            .map(|i| i + 1)
    }

    /// Copies of `alternate` carried by the genotype (0-2)
    pub fn alternate_copies(&self, alternate: &str) -> u8 {
        self.alternate_index(alternate)
            .map(|index| self.genotype.copies_of(index))
            .unwrap_or(0)
    }

    /// True when QUAL is below `min_quality` or FILTER is set to anything but PASS
    pub fn is_low_quality(&self, min_quality: f64) -> bool {
        let failed_filter = self
            .filter
            .as_deref()
            .map(|f| !f.eq_ignore_ascii_case("PASS"))
            .unwrap_or(false);
        let low_qual = self.quality_score.map(|q| q < min_quality).unwrap_or(false);
        failed_filter || low_qual
    }
}

/// Number of chromosomes carrying a resolved allele
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zygosity {
    Homozygous,
    Heterozygous,
}

impl Zygosity {
    pub fn from_copies(copies: u8) -> Option<Self> {
        match copies {
            0 => None,
            1 => Some(Zygosity::Heterozygous),
            _ => Some(Zygosity::Homozygous),
        }
    }

    pub fn copies(&self) -> u8 {
        match self {
            Zygosity::Homozygous => 2,
            Zygosity::Heterozygous => 1,
        }
    }
}

/// A named pharmacogenetic allele recognized in the sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAllele {
    pub gene: String,
    pub allele_name: String,
    pub zygosity: Zygosity,
}

/// Order allele names so star alleles sort numerically ("*2" < "*17" < "*17A")
pub fn compare_allele_names(a: &str, b: &str) -> Ordering {
    fn split(name: &str) -> Option<(u32, &str)> {
        let body = name.strip_prefix('*')?;
        let digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        let number = body[..digits].parse().ok()?;
        Some((number, &body[digits..]))
    }

    match (split(a), split(b)) {
        (Some((na, sa)), Some((nb, sb))) => na.cmp(&nb).then_with(|| sa.cmp(sb)),
        _ => a.cmp(b),
    }
}

/// Unphased allele pair for one gene, stored in normalized order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diplotype {
    first: String,
    second: String,
}

impl Diplotype {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if compare_allele_names(&a, &b) == Ordering::Greater {
            Self { first: b, second: a }
        } else {
            Self { first: a, second: b }
        }
    }
}

impl fmt::Display for Diplotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.first, self.second)
    }
}

/// Functional phenotype inferred from a diplotype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phenotype {
    PoorMetabolizer,
    IntermediateMetabolizer,
    NormalMetabolizer,
    RapidMetabolizer,
    UltrarapidMetabolizer,
    DecreasedFunction,
    NormalFunction,
    Unknown,
}

impl Phenotype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phenotype::PoorMetabolizer => "PoorMetabolizer",
            Phenotype::IntermediateMetabolizer => "IntermediateMetabolizer",
            Phenotype::NormalMetabolizer => "NormalMetabolizer",
            Phenotype::RapidMetabolizer => "RapidMetabolizer",
            Phenotype::UltrarapidMetabolizer => "UltrarapidMetabolizer",
            Phenotype::DecreasedFunction => "DecreasedFunction",
            Phenotype::NormalFunction => "NormalFunction",
            Phenotype::Unknown => "Unknown",
        }
    }

    /// Human-readable label for explanation text
    pub fn label(&self) -> &'static str {
        match self {
            Phenotype::PoorMetabolizer => "poor metabolizer",
            Phenotype::IntermediateMetabolizer => "intermediate metabolizer",
            Phenotype::NormalMetabolizer => "normal metabolizer",
            Phenotype::RapidMetabolizer => "rapid metabolizer",
            Phenotype::UltrarapidMetabolizer => "ultrarapid metabolizer",
            Phenotype::DecreasedFunction => "decreased function",
            Phenotype::NormalFunction => "normal function",
            Phenotype::Unknown => "unknown phenotype",
        }
    }
}

/// Phenotype classified for one gene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhenotypeAssignment {
    pub gene: String,
    pub phenotype: Phenotype,
    /// None when the diplotype could not be formed (too many allele copies)
    pub diplotype: Option<Diplotype>,
}

impl PhenotypeAssignment {
    pub fn diplotype_label(&self) -> String {
        self.diplotype
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| INDETERMINATE_DIPLOTYPE.to_string())
    }
}

/// Clinical risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Safe,
    AdjustDosage,
    Toxic,
    Ineffective,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "Safe",
            RiskLevel::AdjustDosage => "AdjustDosage",
            RiskLevel::Toxic => "Toxic",
            RiskLevel::Ineffective => "Ineffective",
        }
    }

    /// Plain-language summary used when a rule supplies none
    pub fn default_patient_summary(&self) -> &'static str {
        match self {
            RiskLevel::Safe => {
                "No genetic reason was found to change how this medicine is usually prescribed."
            }
            RiskLevel::AdjustDosage => {
                "Your body may not process this drug effectively. A lower dose or alternative may be needed."
            }
            RiskLevel::Toxic => {
                "Your genes may make side effects from this drug more likely. Your clinician may choose a different medicine."
            }
            RiskLevel::Ineffective => {
                "This drug may not work well for you because of how your body processes it. An alternative may be needed."
            }
        }
    }
}

/// Final analysis record handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub drug_name: String,
    pub risk_level: RiskLevel,
    pub primary_gene: String,
    pub phenotype: Phenotype,
    pub diplotype: String,
    pub clinical_recommendation: String,
    pub patient_summary: String,
    /// 0-100
    pub confidence_score: u8,
    pub interaction_detected: bool,
    pub interaction_detail: Option<String>,
    pub interaction_explanation: Option<String>,
    pub gene_reasoning: String,
    pub biological_mechanism: String,
    pub knowledge_base_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chromosome_normalization() {
        assert_eq!(normalize_chromosome("chr10"), "10");
        assert_eq!(normalize_chromosome("CHR22"), "22");
        assert_eq!(normalize_chromosome("10"), "10");
        assert_eq!(normalize_chromosome("chrX"), "X");
        assert_eq!(Locus::new("chr10", 5), Locus::new("10", 5));
    }

    #[test]
    fn test_genotype_parsing() {
        let gt = Genotype::parse("0/1").unwrap();
        assert_eq!((gt.first, gt.second, gt.phased), (0, 1, false));
        assert_eq!(gt.copies_of(1), 1);

        let gt = Genotype::parse("1|1").unwrap();
        assert!(gt.phased);
        assert_eq!(gt.copies_of(1), 2);
        assert_eq!(gt.copies_of(0), 0);

        assert!(matches!(Genotype::parse("./."), Err(GenotypeError::NoCall(_))));
        assert!(matches!(Genotype::parse("1"), Err(GenotypeError::Unrecognized(_))));
        assert!(matches!(Genotype::parse("A/G"), Err(GenotypeError::Unrecognized(_))));
        assert!(matches!(Genotype::parse("0/1/1"), Err(GenotypeError::Unrecognized(_))));
    }

    #[test]
    fn test_diplotype_normalizes_order() {
        assert_eq!(Diplotype::new("*3", "*2"), Diplotype::new("*2", "*3"));
        assert_eq!(Diplotype::new("*17", "*2").to_string(), "*2/*17");
        assert_eq!(Diplotype::new("*3C", "*3A").to_string(), "*3A/*3C");
        assert_eq!(Diplotype::new("B", "A").to_string(), "A/B");
    }

    #[test]
    fn test_low_quality_detection() {
        let mut call = VariantCall {
            chromosome: "10".to_string(),
            position: 1,
            id: None,
            reference_allele: "C".to_string(),
            alternate_alleles: vec!["T".to_string()],
            genotype: Genotype::parse("0/1").unwrap(),
            quality_score: Some(50.0),
            filter: Some("PASS".to_string()),
        };
        assert!(!call.is_low_quality(20.0));
        assert_eq!(call.alternate_copies("t"), 1);
        assert_eq!(call.alternate_copies("G"), 0);

        call.quality_score = Some(5.0);
        assert!(call.is_low_quality(20.0));

        call.quality_score = None;
        call.filter = Some("LowQual".to_string());
        assert!(call.is_low_quality(20.0));

        assert_eq!(call.ids().count(), 0);
        call.id = Some("rs1799853;COSV1".to_string());
        assert_eq!(call.ids().collect::<Vec<_>>(), vec!["rs1799853", "COSV1"]);
        assert!(call.has_id("RS1799853"));
        assert!(!call.has_id("rs1057910"));
    }

    #[test]
    fn test_result_uses_camel_case_fields() {
        let result = AnalysisResult {
            drug_name: "warfarin".to_string(),
            risk_level: RiskLevel::AdjustDosage,
            primary_gene: "CYP2C9".to_string(),
            phenotype: Phenotype::PoorMetabolizer,
            diplotype: "*2/*3".to_string(),
            clinical_recommendation: "r".to_string(),
            patient_summary: "s".to_string(),
            confidence_score: 90,
            interaction_detected: false,
            interaction_detail: None,
            interaction_explanation: None,
            gene_reasoning: "g".to_string(),
            biological_mechanism: "m".to_string(),
            knowledge_base_version: "v".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["riskLevel"], "AdjustDosage");
        assert_eq!(json["primaryGene"], "CYP2C9");
        assert_eq!(json["phenotype"], "PoorMetabolizer");
        assert!(json["interactionDetail"].is_null());
    }
}
