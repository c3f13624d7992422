// ==============================================================================
// parsers/vcf.rs - VCF variant reader
// ==============================================================================
// Description: Lenient, streaming reader that turns VCF lines into variant calls
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================
// References:
// - VCF 4.2 Spec: https://samtools.github.io/hts-specs/VCFv4.2.pdf
// ==============================================================================
// Layout (tab-delimited, first sample only):
//   #CHROM  POS  ID  REF  ALT  QUAL  FILTER  INFO  FORMAT  SAMPLE
//   10  94942290  rs1799853  C  T  60  PASS  .  GT  0/1
// Malformed lines are skipped and recorded as warnings. Only an input with no
// usable record at all is an error.
// ==============================================================================

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::BufRead;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{AnalysisError, InputError, TimeoutError};
use crate::models::{normalize_chromosome, Genotype, GenotypeError, Locus, VariantCall};

const MIN_FIELDS: usize = 10;
const COL_CHROM: usize = 0;
const COL_POS: usize = 1;
const COL_ID: usize = 2;
const COL_REF: usize = 3;
const COL_ALT: usize = 4;
const COL_QUAL: usize = 5;
const COL_FILTER: usize = 6;
const COL_FORMAT: usize = 8;
const COL_SAMPLE: usize = 9;

/// Why a single data line was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("expected at least 10 tab-delimited fields, found {0}")]
    FieldCount(usize),

    #[error("empty chromosome")]
    EmptyChromosome,

    #[error("invalid position '{0}'")]
    InvalidPosition(String),

    #[error("missing reference allele")]
    EmptyReference,

    #[error("invalid QUAL '{0}'")]
    InvalidQuality(String),

    #[error("FORMAT has no GT key")]
    MissingGenotypeField,

    #[error(transparent)]
    Genotype(#[from] GenotypeError),

    #[error("genotype allele index {index} exceeds {alternates} alternate allele(s)")]
    AlleleIndexOutOfRange { index: usize, alternates: usize },
}

/// A skipped line or overridden record, kept for the result's rationale
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// Size and time bounds for one read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadLimits {
    pub max_bytes: u64,
    pub timeout: Duration,
}

impl From<&EngineConfig> for ReadLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_bytes: config.max_input_bytes,
            timeout: config.read_timeout(),
        }
    }
}

/// Lazy, single-pass reader over a VCF stream
///
/// Yields `Ok(call)` for each usable record and at most one `Err` for a fatal
/// condition (unreadable stream, size or time limit), after which it is done.
/// Header lines (`#`) and blank lines are ignored; malformed lines are skipped
/// and recorded in [`VariantReader::warnings`].
pub struct VariantReader<R: BufRead> {
    reader: R,
    limits: ReadLimits,
    started: Instant,
    bytes_read: u64,
    line_number: usize,
    buffer: Vec<u8>,
    warnings: Vec<ParseWarning>,
    finished: bool,
}

impl<R: BufRead> VariantReader<R> {
    pub fn new(reader: R, limits: ReadLimits) -> Self {
        Self {
            reader,
            limits,
            started: Instant::now(),
            bytes_read: 0,
            line_number: 0,
            buffer: Vec::with_capacity(256),
            warnings: Vec::new(),
            finished: false,
        }
    }

    /// Warnings for lines skipped so far
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// Line number of the most recently read line (1-based)
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn into_warnings(self) -> Vec<ParseWarning> {
        self.warnings
    }

    fn fail(&mut self, error: AnalysisError) -> Option<Result<VariantCall, AnalysisError>> {
        self.finished = true;
        Some(Err(error))
    }
}

impl<R: BufRead> Iterator for VariantReader<R> {
    type Item = Result<VariantCall, AnalysisError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            self.buffer.clear();
            let n = match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(n) => n,
                Err(e) => {
                    return self.fail(InputError::Unreadable(e.to_string()).into());
                }
            };

            if n == 0 {
                self.finished = true;
                return None;
            }

            self.bytes_read += n as u64;
            if self.bytes_read > self.limits.max_bytes {
                return self.fail(
                    TimeoutError::InputTooLarge {
                        limit_bytes: self.limits.max_bytes,
                    }
                    .into(),
                );
            }
            if self.started.elapsed() >= self.limits.timeout {
                return self.fail(
                    TimeoutError::ReadTimedOut {
                        limit: self.limits.timeout,
                    }
                    .into(),
                );
            }

            self.line_number += 1;

            // Garbage bytes become replacement characters and fail field parsing
            let text = String::from_utf8_lossy(&self.buffer);
            let line = text.trim_end_matches(['\n', '\r']);

            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_record(line) {
                Ok(call) => return Some(Ok(call)),
                Err(e) => {
                    debug!("Skipping line {}: {}", self.line_number, e);
                    self.warnings.push(ParseWarning {
                        line: self.line_number,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Parse one VCF data line
pub fn parse_record(line: &str) -> Result<VariantCall, RecordError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < MIN_FIELDS {
        return Err(RecordError::FieldCount(fields.len()));
    }

    let chromosome = normalize_chromosome(fields[COL_CHROM]);
    if chromosome.is_empty() {
        return Err(RecordError::EmptyChromosome);
    }

    let position_str = fields[COL_POS].trim();
    let position = position_str
        .parse::<u64>()
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| RecordError::InvalidPosition(position_str.to_string()))?;

    let id = match fields[COL_ID].trim() {
        "" | "." => None,
        id => Some(id.to_string()),
    };

    let reference_allele = fields[COL_REF].trim().to_ascii_uppercase();
    if reference_allele.is_empty() || reference_allele == "." {
        return Err(RecordError::EmptyReference);
    }

    let alternate_alleles: Vec<String> = match fields[COL_ALT].trim() {
        "" | "." => Vec::new(),
        alts => alts.split(',').map(|a| a.trim().to_ascii_uppercase()).collect(),
    };

    let quality_score = match fields[COL_QUAL].trim() {
        "" | "." => None,
        qual => Some(
            qual.parse::<f64>()
                .ok()
                .filter(|q| q.is_finite())
                .ok_or_else(|| RecordError::InvalidQuality(qual.to_string()))?,
        ),
    };

    let filter = match fields[COL_FILTER].trim() {
        "" | "." => None,
        filter => Some(filter.to_string()),
    };

    let genotype = extract_genotype(fields[COL_FORMAT], fields[COL_SAMPLE])?;
    if genotype.max_index() > alternate_alleles.len() {
        return Err(RecordError::AlleleIndexOutOfRange {
            index: genotype.max_index(),
            alternates: alternate_alleles.len(),
        });
    }

    Ok(VariantCall {
        chromosome,
        position,
        id,
        reference_allele,
        alternate_alleles,
        genotype,
        quality_score,
        filter,
    })
}

/// Pull GT out of the FORMAT/sample pair
fn extract_genotype(format: &str, sample: &str) -> Result<Genotype, RecordError> {
    let gt_index = format
        .trim()
        .split(':')
        .position(|key| key == "GT")
        .ok_or(RecordError::MissingGenotypeField)?;

    let value = sample
        .trim()
        .split(':')
        .nth(gt_index)
        .ok_or(RecordError::MissingGenotypeField)?;

    Ok(Genotype::parse(value)?)
}

/// All usable calls of one file, keyed by locus (last record wins)
#[derive(Debug, Clone, Default)]
pub struct VariantSet {
    calls: BTreeMap<Locus, VariantCall>,
    /// Lowercased identifier -> locus of the last record carrying it
    ids: HashMap<String, Locus>,
    warnings: Vec<ParseWarning>,
    records_read: usize,
    overrides: usize,
}

impl VariantSet {
    pub fn get(&self, locus: &Locus) -> Option<&VariantCall> {
        self.calls.get(locus)
    }

    /// Call whose ID column carries `rsid`, wherever it sits
    pub fn get_by_id(&self, rsid: &str) -> Option<&VariantCall> {
        let locus = self.ids.get(&rsid.to_ascii_lowercase())?;
        self.calls.get(locus).filter(|call| call.has_id(rsid))
    }

    /// Store a call; returns true when it replaced one at the same locus
    fn insert(&mut self, call: VariantCall) -> bool {
        let locus = call.locus();
        for id in call.ids() {
            self.ids.insert(id.to_ascii_lowercase(), locus.clone());
        }
        self.records_read += 1;
        let replaced = self.calls.insert(locus, call).is_some();
        if replaced {
            self.overrides += 1;
        }
        replaced
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantCall> {
        self.calls.values()
    }

    /// Skipped lines and duplicate overrides, in file order
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// Valid records read, including ones later overridden
    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Records replaced by a later record at the same locus
    pub fn overrides(&self) -> usize {
        self.overrides
    }
}

impl FromIterator<VariantCall> for VariantSet {
    fn from_iter<I: IntoIterator<Item = VariantCall>>(iter: I) -> Self {
        let mut set = VariantSet::default();
        for call in iter {
            set.insert(call);
        }
        set
    }
}

/// Read a whole stream into a [`VariantSet`]
///
/// # Returns
/// * `Ok(VariantSet)` - at least one usable record
/// * `Err(InputError::EmptyOrUnparseableVariantFile)` - no usable record
/// * `Err(TimeoutError)` - size or time limit exceeded
/// * `Err(InputError::Unreadable)` - the stream failed
///
/// # Example
/// ```
/// use pgx_engine::parsers::vcf::{read_variant_calls, ReadLimits};
/// use std::time::Duration;
///
/// let vcf = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n\
///            10\t94942290\trs1799853\tC\tT\t60\tPASS\t.\tGT\t0/1\n";
/// let limits = ReadLimits { max_bytes: 1 << 20, timeout: Duration::from_secs(5) };
/// let set = read_variant_calls(vcf.as_bytes(), limits).unwrap();
/// assert_eq!(set.len(), 1);
/// ```
pub fn read_variant_calls<R: BufRead>(
    reader: R,
    limits: ReadLimits,
) -> Result<VariantSet, AnalysisError> {
    let mut reader = VariantReader::new(reader, limits);
    let mut set = VariantSet::default();
    let mut duplicate_warnings = Vec::new();

    while let Some(result) = reader.next() {
        let call = result?;
        let locus = call.locus();
        if set.insert(call) {
            duplicate_warnings.push(ParseWarning {
                line: reader.line_number(),
                reason: format!("duplicate record at {}, later record kept", locus),
            });
        }
    }

    let mut warnings = reader.into_warnings();
    let skipped_lines = warnings.len();
    warnings.extend(duplicate_warnings);
    warnings.sort_by_key(|w| w.line);
    set.warnings = warnings;

    if set.is_empty() {
        return Err(InputError::EmptyOrUnparseableVariantFile { skipped_lines }.into());
    }

    info!(
        "Read {} variant records ({} unique loci, {} skipped lines, {} overrides)",
        set.records_read,
        set.len(),
        skipped_lines,
        set.overrides
    );

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tSAMPLE\n";

    fn limits() -> ReadLimits {
        ReadLimits {
            max_bytes: 1024 * 1024,
            timeout: Duration::from_secs(30),
        }
    }

    fn vcf(body: &str) -> String {
        format!("{}{}", HEADER, body)
    }

    #[test]
    fn test_parse_valid_record() {
        let call = parse_record("chr10\t94942290\trs1799853\tc\tT\t60\tPASS\t.\tGT:DP\t0|1:30").unwrap();
        assert_eq!(call.chromosome, "10");
        assert_eq!(call.position, 94942290);
        assert_eq!(call.id.as_deref(), Some("rs1799853"));
        assert_eq!(call.reference_allele, "C");
        assert_eq!(call.alternate_alleles, vec!["T".to_string()]);
        assert_eq!(call.genotype.copies_of(1), 1);
        assert!(call.genotype.phased);
        assert_eq!(call.quality_score, Some(60.0));
        assert_eq!(call.filter.as_deref(), Some("PASS"));
    }

    #[test]
    fn test_parse_record_gt_not_first_in_format() {
        let call = parse_record("10\t100\t.\tA\tG,T\t.\t.\t.\tDP:GT\t12:1/2").unwrap();
        assert_eq!(call.id, None);
        assert_eq!(call.quality_score, None);
        assert_eq!(call.filter, None);
        assert_eq!(call.alternate_copies("G"), 1);
        assert_eq!(call.alternate_copies("T"), 1);
    }

    #[test]
    fn test_parse_record_rejections() {
        assert_eq!(
            parse_record("10\t100\t.\tA\tG").unwrap_err(),
            RecordError::FieldCount(5)
        );
        assert_eq!(
            parse_record("10\tabc\t.\tA\tG\t.\t.\t.\tGT\t0/1").unwrap_err(),
            RecordError::InvalidPosition("abc".to_string())
        );
        assert_eq!(
            parse_record("10\t0\t.\tA\tG\t.\t.\t.\tGT\t0/1").unwrap_err(),
            RecordError::InvalidPosition("0".to_string())
        );
        assert_eq!(
            parse_record("10\t100\t.\tA\tG\t.\t.\t.\tDP\t7").unwrap_err(),
            RecordError::MissingGenotypeField
        );
        assert!(matches!(
            parse_record("10\t100\t.\tA\tG\t.\t.\t.\tGT\t./.").unwrap_err(),
            RecordError::Genotype(GenotypeError::NoCall(_))
        ));
        assert_eq!(
            parse_record("10\t100\t.\tA\tG\t.\t.\t.\tGT\t0/2").unwrap_err(),
            RecordError::AlleleIndexOutOfRange { index: 2, alternates: 1 }
        );
        assert_eq!(
            parse_record("10\t100\t.\tA\tG\thigh\t.\t.\tGT\t0/1").unwrap_err(),
            RecordError::InvalidQuality("high".to_string())
        );
    }

    #[test]
    fn test_reader_is_lazy_and_skips_malformed_lines() {
        let input = vcf("10\t1\t.\tA\tG\t.\t.\t.\tGT\t0/1\nbroken line\n10\t2\t.\tC\tT\t.\t.\t.\tGT\t1/1\n");
        let mut reader = VariantReader::new(input.as_bytes(), limits());

        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.position, 1);
        assert!(reader.warnings().is_empty());

        let second = reader.next().unwrap().unwrap();
        assert_eq!(second.position, 2);
        assert_eq!(reader.warnings().len(), 1);
        assert_eq!(reader.warnings()[0].line, 4);

        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_duplicates_last_record_wins() {
        let input = vcf("10\t5\t.\tA\tG\t.\t.\t.\tGT\t0/1\n10\t5\t.\tA\tG\t.\t.\t.\tGT\t1/1\n");
        let set = read_variant_calls(input.as_bytes(), limits()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.records_read(), 2);
        assert_eq!(set.overrides(), 1);
        let call = set.get(&Locus::new("10", 5)).unwrap();
        assert_eq!(call.alternate_copies("G"), 2);
        assert!(set.warnings()[0].reason.contains("duplicate"));
    }

    #[test]
    fn test_chr_prefix_and_plain_names_are_the_same_locus() {
        let input = vcf("chr10\t5\t.\tA\tG\t.\t.\t.\tGT\t0/1\n10\t5\t.\tA\tG\t.\t.\t.\tGT\t0/0\n");
        let set = read_variant_calls(input.as_bytes(), limits()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.overrides(), 1);
    }

    #[test]
    fn test_empty_and_garbage_inputs_fail() {
        let err = read_variant_calls(HEADER.as_bytes(), limits()).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::Input(InputError::EmptyOrUnparseableVariantFile { skipped_lines: 0 })
        );

        let garbage: &[u8] = &[0xff, 0xfe, 0x00, b'\n', b'x', b'y', b'\n'];
        let err = read_variant_calls(garbage, limits()).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::Input(InputError::EmptyOrUnparseableVariantFile { skipped_lines: 2 })
        );

        let err = read_variant_calls(&b""[..], limits()).unwrap_err();
        assert!(matches!(err, AnalysisError::Input(InputError::EmptyOrUnparseableVariantFile { .. })));
    }

    #[test]
    fn test_size_limit() {
        let input = vcf("10\t1\t.\tA\tG\t.\t.\t.\tGT\t0/1\n");
        let tight = ReadLimits {
            max_bytes: 16,
            timeout: Duration::from_secs(30),
        };
        let err = read_variant_calls(input.as_bytes(), tight).unwrap_err();
        assert_eq!(err, AnalysisError::Timeout(TimeoutError::InputTooLarge { limit_bytes: 16 }));
    }

    #[test]
    fn test_time_limit() {
        let input = vcf("10\t1\t.\tA\tG\t.\t.\t.\tGT\t0/1\n");
        let expired = ReadLimits {
            max_bytes: 1024 * 1024,
            timeout: Duration::ZERO,
        };
        let err = read_variant_calls(input.as_bytes(), expired).unwrap_err();
        assert!(matches!(err, AnalysisError::Timeout(TimeoutError::ReadTimedOut { .. })));
    }

    #[test]
    fn test_collect_from_iterator() {
        let calls = vec![
            parse_record("10\t1\t.\tA\tG\t.\t.\t.\tGT\t0/1").unwrap(),
            parse_record("10\t1\t.\tA\tG\t.\t.\t.\tGT\t1/1").unwrap(),
        ];
        let set: VariantSet = calls.into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(set.overrides(), 1);
    }

    #[test]
    fn test_lookup_by_identifier() {
        let calls = vec![
            parse_record("10\t96702047\trs1799853\tC\tT\t60\tPASS\t.\tGT\t0/1").unwrap(),
            parse_record("10\t2\trs11;rs12\tA\tG\t.\t.\t.\tGT\t0/1").unwrap(),
        ];
        let set: VariantSet = calls.into_iter().collect();
        let call = set.get_by_id("RS1799853").unwrap();
        assert_eq!(call.position, 96702047);
        assert_eq!(set.get_by_id("rs12").unwrap().position, 2);
        assert!(set.get_by_id("rs4244285").is_none());
    }

    #[test]
    fn test_identifier_of_overridden_record_is_dropped() {
        let calls = vec![
            parse_record("10\t1\trs1\tA\tG\t.\t.\t.\tGT\t0/1").unwrap(),
            parse_record("10\t1\t.\tA\tG\t.\t.\t.\tGT\t1/1").unwrap(),
        ];
        let set: VariantSet = calls.into_iter().collect();
        assert!(set.get_by_id("rs1").is_none());
    }
}
