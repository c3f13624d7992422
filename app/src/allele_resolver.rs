// ==============================================================================
// allele_resolver.rs - Star Allele Resolution
// ==============================================================================
// Description: Recognizes named pharmacogenetic alleles from normalized variant calls
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================
// Algorithm:
//   For each allele of a gene, copies = min over its signature of the number of
//   times the defining ALT index appears in the call's genotype (0, 1 or 2).
//   Candidates are accepted longest signature first (table order within equal
//   length). An accepted allele consumes its copies at every (locus, alternate)
//   it is defined by, so a shorter overlapping allele only matches with copies
//   the longer one left unexplained.
//
//   Example (two-variant *4 = {A, B}, one-variant *10 = {B}):
//   - het A, het B          → *4 (1 copy), *10 gets nothing
//   - het A, hom B          → *4 (1 copy), *10 (1 copy)
//   - ref A, het B          → *10 (1 copy)
//
//   A defining variant is looked up by position first. When the sample has no
//   call there and the definition carries an rsID, the call with that ID is
//   used instead and the gene is flagged (coordinates from another build).
// ==============================================================================

use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::knowledge_base::{GeneAlleleDefinition, GeneTable, VariantSignature};
use crate::models::{Locus, ResolvedAllele, VariantCall, Zygosity};
use crate::parsers::VariantSet;

/// Alleles recognized for one gene plus what the resolver noticed on the way
#[derive(Debug, Clone, PartialEq)]
pub struct GeneAlleles {
    pub gene: String,

    /// Accepted alleles in acceptance order (empty = reference only)
    pub alleles: Vec<ResolvedAllele>,

    /// Calls that support an accepted allele
    pub supporting_variants: Vec<SupportingVariant>,

    /// Resolver warnings (ties, variants matched by rsID only)
    pub warnings: Vec<String>,

    /// True when a tie was broken by table order or a defining variant was
    /// only found by rsID
    pub ambiguous: bool,

    /// True when a supporting call is below the quality minimum or failed FILTER
    pub low_quality: bool,
}

impl GeneAlleles {
    /// Total allele copies accounted for (0-2 for a consistent sample)
    pub fn total_copies(&self) -> u8 {
        self.alleles.iter().map(|a| a.zygosity.copies()).sum()
    }
}

/// A sample call backing an accepted allele
#[derive(Debug, Clone, PartialEq)]
pub struct SupportingVariant {
    /// Where the call sits in the sample
    pub locus: Locus,
    pub rsid: Option<String>,
    /// Found through the ID column, away from the defined position
    pub matched_by_id: bool,
}

impl fmt::Display for SupportingVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rsid {
            Some(rsid) => write!(f, "{} ({})", rsid, self.locus),
            None => write!(f, "{}", self.locus),
        }
    }
}

/// Call for a defining variant: by position, else by rsID (second value true)
fn locate<'v>(
    signature: &VariantSignature,
    variants: &'v VariantSet,
) -> Option<(&'v VariantCall, bool)> {
    if let Some(call) = variants.get(&signature.locus()) {
        return Some((call, false));
    }
    let rsid = signature.rsid.as_deref()?;
    variants.get_by_id(rsid).map(|call| (call, true))
}

/// Copies of one defining variant carried by the sample
fn signature_copies(signature: &VariantSignature, variants: &VariantSet) -> u8 {
    locate(signature, variants)
        .map(|(call, _)| call.alternate_copies(&signature.alternate))
        .unwrap_or(0)
}

fn allele_copies(allele: &GeneAlleleDefinition, variants: &VariantSet) -> u8 {
    allele
        .signature
        .iter()
        .map(|s| signature_copies(s, variants))
        .min()
        .unwrap_or(0)
}

fn overlaps(a: &GeneAlleleDefinition, b: &GeneAlleleDefinition) -> bool {
    a.signature
        .iter()
        .any(|sa| b.signature.iter().any(|sb| sa.key() == sb.key()))
}

/// Resolve the named alleles of one gene
///
/// # Arguments
/// * `table` - The gene's allele definitions from the knowledge base
/// * `variants` - All calls of the sample
/// * `min_quality` - QUAL below which a supporting call is flagged low-quality
pub fn resolve_gene(table: &GeneTable, variants: &VariantSet, min_quality: f64) -> GeneAlleles {
    let definitions = table.alleles();
    let mut result = GeneAlleles {
        gene: table.gene().to_string(),
        alleles: Vec::new(),
        supporting_variants: Vec::new(),
        warnings: Vec::new(),
        ambiguous: false,
        low_quality: false,
    };

    let mut relocated: Vec<&str> = Vec::new();
    for signature in definitions.iter().flat_map(|a| a.signature.iter()) {
        let (Some((call, true)), Some(rsid)) =
            (locate(signature, variants), signature.rsid.as_deref())
        else {
            continue;
        };
        if relocated.iter().any(|r| r.eq_ignore_ascii_case(rsid)) {
            continue;
        }
        relocated.push(rsid);
        let message = format!(
            "{}: {} found at {} instead of {}; matched by rsID (check the genome build)",
            table.gene(),
            rsid,
            call.locus(),
            signature.locus()
        );
        warn!("Position mismatch: {}", message);
        result.warnings.push(message);
        result.ambiguous = true;
    }

    // (table index, copies before any consumption)
    let mut candidates: Vec<(usize, u8)> = definitions
        .iter()
        .enumerate()
        .map(|(i, allele)| (i, allele_copies(allele, variants)))
        .filter(|(_, copies)| *copies > 0)
        .collect();

    // Stable: table order survives within equal signature length
    candidates.sort_by(|(a, _), (b, _)| {
        definitions[*b]
            .signature
            .len()
            .cmp(&definitions[*a].signature.len())
    });

    let mut remaining: HashMap<(Locus, String), u8> = HashMap::new();
    for (index, _) in &candidates {
        for signature in &definitions[*index].signature {
            remaining
                .entry(signature.key())
                .or_insert_with(|| signature_copies(signature, variants));
        }
    }

    let mut accepted: Vec<usize> = Vec::new();

    for (index, initial) in candidates {
        let allele = &definitions[index];
        let available = allele
            .signature
            .iter()
            .map(|s| remaining.get(&s.key()).copied().unwrap_or(0))
            .min()
            .unwrap_or(0);

        if available < initial {
            let rival = accepted.iter().map(|i| &definitions[*i]).find(|other| {
                other.signature.len() == allele.signature.len() && overlaps(other, allele)
            });
            match rival {
                Some(kept) => {
                    let message = format!(
                        "{}: {} and {} both match the same calls; kept {} (listed first)",
                        table.gene(),
                        kept.name,
                        allele.name,
                        kept.name
                    );
                    warn!("Allele tie: {}", message);
                    result.warnings.push(message);
                    result.ambiguous = true;
                }
                None => debug!(
                    "{} {}: {} of {} copies already explained by a more specific allele",
                    table.gene(),
                    allele.name,
                    initial - available,
                    initial
                ),
            }
        }

        let Some(zygosity) = Zygosity::from_copies(available) else {
            continue;
        };

        for signature in &allele.signature {
            if let Some(left) = remaining.get_mut(&signature.key()) {
                *left = left.saturating_sub(available);
            }

            let Some((call, matched_by_id)) = locate(signature, variants) else {
                continue;
            };
            if call.is_low_quality(min_quality) {
                result.low_quality = true;
            }
            let support = SupportingVariant {
                locus: call.locus(),
                rsid: signature
                    .rsid
                    .clone()
                    .or_else(|| call.ids().next().map(str::to_string)),
                matched_by_id,
            };
            if !result.supporting_variants.contains(&support) {
                result.supporting_variants.push(support);
            }
        }

        debug!("{}: resolved {} ({:?})", table.gene(), allele.name, zygosity);
        result.alleles.push(ResolvedAllele {
            gene: table.gene().to_string(),
            allele_name: allele.name.clone(),
            zygosity,
        });
        accepted.push(index);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_base::KnowledgeBase;
    use crate::parsers::parse_record;

    fn variants(lines: &[&str]) -> VariantSet {
        lines.iter().map(|l| parse_record(l).unwrap()).collect()
    }

    fn names(resolved: &GeneAlleles) -> Vec<(&str, Zygosity)> {
        resolved
            .alleles
            .iter()
            .map(|a| (a.allele_name.as_str(), a.zygosity))
            .collect()
    }

    #[test]
    fn test_compound_heterozygote() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&[
            "10\t94942290\trs1799853\tC\tT\t60\tPASS\t.\tGT\t0/1",
            "chr10\t94981296\trs1057910\tA\tC\t60\tPASS\t.\tGT\t1/0",
        ]);
        let resolved = resolve_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert_eq!(
            names(&resolved),
            vec![("*2", Zygosity::Heterozygous), ("*3", Zygosity::Heterozygous)]
        );
        assert!(!resolved.ambiguous);
        assert!(!resolved.low_quality);
        assert_eq!(resolved.total_copies(), 2);
    }

    #[test]
    fn test_homozygous_allele() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&["10\t94781859\trs4244285\tG\tA\t60\tPASS\t.\tGT\t1|1"]);
        let resolved = resolve_gene(kb.gene("CYP2C19").unwrap(), &calls, 20.0);
        assert_eq!(names(&resolved), vec![("*2", Zygosity::Homozygous)]);
    }

    #[test]
    fn test_reference_calls_resolve_nothing() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&[
            "10\t94942290\trs1799853\tC\tT\t60\tPASS\t.\tGT\t0/0",
            "10\t94981296\trs1057910\tA\t.\t60\tPASS\t.\tGT\t0/0",
        ]);
        let resolved = resolve_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert!(resolved.alleles.is_empty());
        assert!(resolved.supporting_variants.is_empty());
    }

    #[test]
    fn test_wrong_alternate_does_not_match() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&["10\t94942290\t.\tC\tG\t60\tPASS\t.\tGT\t0/1"]);
        let resolved = resolve_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert!(resolved.alleles.is_empty());
    }

    #[test]
    fn test_multi_allelic_site_uses_matching_index() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&["10\t94942290\t.\tC\tG,T\t60\tPASS\t.\tGT\t1/2"]);
        let resolved = resolve_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert_eq!(names(&resolved), vec![("*2", Zygosity::Heterozygous)]);
    }

    #[test]
    fn test_longer_signature_is_preferred() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&[
            "22\t42128945\trs3892097\tC\tT\t60\tPASS\t.\tGT\t0/1",
            "22\t42130692\trs1065852\tG\tA\t60\tPASS\t.\tGT\t0/1",
        ]);
        let resolved = resolve_gene(kb.gene("CYP2D6").unwrap(), &calls, 20.0);
        assert_eq!(names(&resolved), vec![("*4", Zygosity::Heterozygous)]);
        assert!(!resolved.ambiguous);
    }

    #[test]
    fn test_leftover_copy_goes_to_shorter_allele() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&[
            "22\t42128945\trs3892097\tC\tT\t60\tPASS\t.\tGT\t0/1",
            "22\t42130692\trs1065852\tG\tA\t60\tPASS\t.\tGT\t1/1",
        ]);
        let resolved = resolve_gene(kb.gene("CYP2D6").unwrap(), &calls, 20.0);
        assert_eq!(
            names(&resolved),
            vec![("*4", Zygosity::Heterozygous), ("*10", Zygosity::Heterozygous)]
        );
    }

    #[test]
    fn test_equal_length_overlap_is_a_tie() {
        let kb = KnowledgeBase::from_json_str(
            r#"{
                "version": "tie",
                "genes": [{
                    "gene": "GENE1",
                    "reference_allele": "*1",
                    "alleles": [
                        { "name": "*5", "signature": [{ "chromosome": "1", "position": 10, "alternate": "A" }] },
                        { "name": "*6", "signature": [{ "chromosome": "1", "position": 10, "alternate": "A" }] }
                    ],
                    "diplotypes": [{ "alleles": ["*1", "*1"], "phenotype": "NormalFunction" }]
                }]
            }"#,
        )
        .unwrap();
        let calls = variants(&["1\t10\t.\tG\tA\t60\tPASS\t.\tGT\t0/1"]);
        let resolved = resolve_gene(kb.gene("GENE1").unwrap(), &calls, 20.0);
        assert_eq!(names(&resolved), vec![("*5", Zygosity::Heterozygous)]);
        assert!(resolved.ambiguous);
        assert_eq!(resolved.warnings.len(), 1);
        assert!(resolved.warnings[0].contains("kept *5"));
    }

    #[test]
    fn test_low_quality_support_is_flagged() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&["10\t94942290\t.\tC\tT\t8\tPASS\t.\tGT\t0/1"]);
        let resolved = resolve_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert!(resolved.low_quality);

        let calls = variants(&["10\t94942290\t.\tC\tT\t60\tLowQual\t.\tGT\t0/1"]);
        let resolved = resolve_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert!(resolved.low_quality);
    }

    #[test]
    fn test_low_quality_reference_call_is_not_flagged() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&["10\t94942290\t.\tC\tT\t3\tPASS\t.\tGT\t0/0"]);
        let resolved = resolve_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert!(!resolved.low_quality);
    }

    #[test]
    fn test_supporting_variants_carry_rsids() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&["10\t94942290\t.\tC\tT\t60\tPASS\t.\tGT\t0/1"]);
        let resolved = resolve_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert_eq!(resolved.supporting_variants.len(), 1);
        let support = &resolved.supporting_variants[0];
        assert!(!support.matched_by_id);
        assert_eq!(support.to_string(), "rs1799853 (chr10:94942290)");
    }

    #[test]
    fn test_other_build_coordinates_match_by_rsid() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&[
            "10\t96702047\trs1799853\tC\tT\t60\tPASS\t.\tGT\t0/1",
            "10\t96741053\trs1057910\tA\tC\t60\tPASS\t.\tGT\t0/1",
        ]);
        let resolved = resolve_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert_eq!(
            names(&resolved),
            vec![("*2", Zygosity::Heterozygous), ("*3", Zygosity::Heterozygous)]
        );
        assert!(resolved.ambiguous);
        assert_eq!(resolved.warnings.len(), 2);
        assert!(resolved.warnings[0].contains("rs1799853 found at chr10:96702047"));
        assert!(resolved.supporting_variants.iter().all(|v| v.matched_by_id));
    }

    #[test]
    fn test_reference_call_found_by_rsid_still_flags_gene() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&["10\t96702047\trs1799853\tC\tT\t60\tPASS\t.\tGT\t0/0"]);
        let resolved = resolve_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert!(resolved.alleles.is_empty());
        assert!(resolved.ambiguous);
        assert_eq!(resolved.warnings.len(), 1);
    }

    #[test]
    fn test_positional_call_wins_over_rsid() {
        let kb = KnowledgeBase::builtin().unwrap();
        let calls = variants(&[
            "10\t94942290\t.\tC\tT\t60\tPASS\t.\tGT\t0/0",
            "10\t96702047\trs1799853\tC\tT\t60\tPASS\t.\tGT\t1/1",
        ]);
        let resolved = resolve_gene(kb.gene("CYP2C9").unwrap(), &calls, 20.0);
        assert!(resolved.alleles.is_empty());
        assert!(!resolved.ambiguous);
    }
}
