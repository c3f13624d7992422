// ==============================================================================
// phenotype.rs - Diplotype and Phenotype Classification
// ==============================================================================
// Description: Forms a gene's diplotype from resolved alleles and translates it
//              to a functional phenotype
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use tracing::{debug, warn};

use crate::allele_resolver::{resolve_gene, GeneAlleles};
use crate::knowledge_base::{gene_key, GeneTable};
use crate::models::{Diplotype, Phenotype, PhenotypeAssignment, Zygosity};
use crate::parsers::VariantSet;

/// Everything known about one gene after resolution and classification
#[derive(Debug, Clone, PartialEq)]
pub struct GeneProfile {
    pub alleles: GeneAlleles,
    pub assignment: PhenotypeAssignment,
    /// Resolver and classifier warnings, in the order they arose
    pub warnings: Vec<String>,
}

impl GeneProfile {
    pub fn gene(&self) -> &str {
        &self.assignment.gene
    }

    pub fn phenotype(&self) -> Phenotype {
        self.assignment.phenotype
    }
}

/// Profile of `gene` among `profiles` (gene names compare case-insensitively)
pub(crate) fn profile_for<'p>(profiles: &'p [GeneProfile], gene: &str) -> Option<&'p GeneProfile> {
    let key = gene_key(gene);
    profiles.iter().find(|p| gene_key(p.gene()) == key)
}

/// Form the diplotype for a set of resolved alleles
///
/// Returns `None` when more than two allele copies resolved, since no single
/// diplotype explains the calls.
pub fn build_diplotype(reference: &str, alleles: &GeneAlleles) -> Option<Diplotype> {
    match alleles.alleles.as_slice() {
        [] => Some(Diplotype::new(reference, reference)),
        [only] => match only.zygosity {
            Zygosity::Homozygous => Some(Diplotype::new(
                only.allele_name.as_str(),
                only.allele_name.as_str(),
            )),
            Zygosity::Heterozygous => Some(Diplotype::new(only.allele_name.as_str(), reference)),
        },
        [a, b]
            if a.zygosity == Zygosity::Heterozygous && b.zygosity == Zygosity::Heterozygous =>
        {
            Some(Diplotype::new(a.allele_name.as_str(), b.allele_name.as_str()))
        }
        _ => None,
    }
}

/// Translate resolved alleles to a phenotype via the gene's table
pub fn classify(table: &GeneTable, alleles: GeneAlleles) -> GeneProfile {
    let mut warnings = alleles.warnings.clone();

    let diplotype = build_diplotype(table.reference_allele(), &alleles);
    let phenotype = match &diplotype {
        Some(d) => match table.phenotype_for(d) {
            Some(phenotype) => phenotype,
            None => {
                warnings.push(format!(
                    "{}: diplotype {} is not in the translation table; phenotype Unknown",
                    table.gene(),
                    d
                ));
                Phenotype::Unknown
            }
        },
        None => {
            let found: Vec<&str> = alleles.alleles.iter().map(|a| a.allele_name.as_str()).collect();
            warnings.push(format!(
                "{}: {} allele copies resolved ({}); diplotype indeterminate",
                table.gene(),
                alleles.total_copies(),
                found.join(", ")
            ));
            Phenotype::Unknown
        }
    };

    if phenotype == Phenotype::Unknown {
        warn!("{}: phenotype Unknown", table.gene());
    } else {
        debug!(
            "{}: {} -> {}",
            table.gene(),
            diplotype.as_ref().map(|d| d.to_string()).unwrap_or_default(),
            phenotype.as_str()
        );
    }

    GeneProfile {
        assignment: PhenotypeAssignment {
            gene: table.gene().to_string(),
            phenotype,
            diplotype,
        },
        alleles,
        warnings,
    }
}

/// Resolve and classify one gene
pub fn profile_gene(table: &GeneTable, variants: &VariantSet, min_quality: f64) -> GeneProfile {
    classify(table, resolve_gene(table, variants, min_quality))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_base::KnowledgeBase;
    use crate::models::ResolvedAllele;
    use crate::parsers::parse_record;

    fn variants(lines: &[&str]) -> VariantSet {
        lines.iter().map(|l| parse_record(l).unwrap()).collect()
    }

    fn resolved(names: &[(&str, Zygosity)]) -> GeneAlleles {
        GeneAlleles {
            gene: "CYP2C9".to_string(),
            alleles: names
                .iter()
                .map(|(name, zygosity)| ResolvedAllele {
                    gene: "CYP2C9".to_string(),
                    allele_name: name.to_string(),
                    zygosity: *zygosity,
                })
                .collect(),
            supporting_variants: Vec::new(),
            warnings: Vec::new(),
            ambiguous: false,
            low_quality: false,
        }
    }

    #[test]
    fn test_diplotype_shapes() {
        use Zygosity::*;
        assert_eq!(build_diplotype("*1", &resolved(&[])), Some(Diplotype::new("*1", "*1")));
        assert_eq!(
            build_diplotype("*1", &resolved(&[("*2", Heterozygous)])),
            Some(Diplotype::new("*1", "*2"))
        );
        assert_eq!(
            build_diplotype("*1", &resolved(&[("*3", Homozygous)])),
            Some(Diplotype::new("*3", "*3"))
        );
        assert_eq!(
            build_diplotype("*1", &resolved(&[("*3", Heterozygous), ("*2", Heterozygous)])),
            Some(Diplotype::new("*2", "*3"))
        );
        assert_eq!(
            build_diplotype("*1", &resolved(&[("*2", Homozygous), ("*3", Heterozygous)])),
            None
        );
    }

    #[test]
    fn test_poor_metabolizer() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&[
            "10\t94942290\t.\tC\tT\t60\tPASS\t.\tGT\t0/1",
            "10\t94981296\t.\tA\tC\t60\tPASS\t.\tGT\t0/1",
        ]);
        let profile = profile_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert_eq!(profile.phenotype(), Phenotype::PoorMetabolizer);
        assert_eq!(profile.assignment.diplotype_label(), "*2/*3");
        assert!(profile.warnings.is_empty());
    }

    #[test]
    fn test_reference_diplotype() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&["1\t100\t.\tA\tG\t60\tPASS\t.\tGT\t0/1"]);
        let profile = profile_gene(kb.gene("CYP2C19").unwrap(), &calls, 20.0);
        assert_eq!(profile.phenotype(), Phenotype::NormalMetabolizer);
        assert_eq!(profile.assignment.diplotype_label(), "*1/*1");
    }

    #[test]
    fn test_untranslated_diplotype_is_unknown() {
        let kb = KnowledgeBase::builtin().unwrap();
        // *3A/*3B is absent from the TPMT table
        let calls = variants(&[
            "6\t18138997\t.\tC\tT\t60\tPASS\t.\tGT\t1/1",
            "6\t18130687\t.\tT\tC\t60\tPASS\t.\tGT\t0/1",
        ]);
        let profile = profile_gene(kb.gene("TPMT").unwrap(), &calls, 20.0);
        assert_eq!(profile.phenotype(), Phenotype::Unknown);
        assert_eq!(profile.assignment.diplotype_label(), "*3A/*3B");
        assert!(profile.warnings[0].contains("not in the translation table"));
    }

    #[test]
    fn test_too_many_copies_is_indeterminate() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&[
            "10\t94942290\t.\tC\tT\t60\tPASS\t.\tGT\t1/1",
            "10\t94981296\t.\tA\tC\t60\tPASS\t.\tGT\t0/1",
        ]);
        let profile = profile_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert_eq!(profile.phenotype(), Phenotype::Unknown);
        assert!(profile.assignment.diplotype.is_none());
        assert_eq!(profile.assignment.diplotype_label(), "indeterminate");
        assert!(profile.warnings[0].contains("3 allele copies"));
    }
}
