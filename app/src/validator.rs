// ==============================================================================
// validator.rs - Request Validation
// ==============================================================================
// Description: Validates an analysis request (drug name, co-medications, variant
//              bytes) and opens the variant stream, decompressing gzip/BGZF
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-18
// Version: 2.0.0
// Security: Magic number detection, decompressed size bound, input digest only
// ==============================================================================

use flate2::read::MultiGzDecoder;
use sha2::{Digest, Sha256};
use std::io::{BufRead, BufReader, Read};
use tracing::{debug, warn};

use crate::error::{AnalysisError, InputError, TimeoutError};
use crate::knowledge_base::drug_key;

/// Gzip member header (BGZF is a series of gzip members)
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    /// Drug name, trimmed
    pub drug: String,
    pub co_medications: CoMedications,
    /// SHA-256 of the raw (possibly compressed) variant bytes
    pub input_sha256: String,
    pub input_bytes: u64,
    pub compressed: bool,
}

/// Normalized co-medication list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoMedications {
    /// Distinct names in the order given, first spelling kept
    pub names: Vec<String>,
    /// Entries dropped during normalization
    pub notes: Vec<String>,
}

/// True when the bytes start with the gzip magic number
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Hex SHA-256 digest
pub fn compute_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Open the variant bytes as a line stream
///
/// At most `max_bytes + 1` decompressed bytes are ever produced, so the reader
/// can report an oversized input without inflating all of it.
pub fn open_variant_stream<'a>(bytes: &'a [u8], max_bytes: u64) -> Box<dyn BufRead + 'a> {
    let limit = max_bytes.saturating_add(1);
    if is_gzip(bytes) {
        debug!("Variant input is gzip compressed ({} bytes)", bytes.len());
        Box::new(BufReader::new(MultiGzDecoder::new(bytes).take(limit)))
    } else {
        Box::new(BufReader::new(Read::take(bytes, limit)))
    }
}

/// Trimmed, non-empty drug name
pub fn validate_drug_name(raw: &str) -> Result<String, InputError> {
    let drug = raw.trim();
    if drug.is_empty() {
        return Err(InputError::MissingDrugName);
    }
    Ok(drug.to_string())
}

/// Split a comma-separated co-medication list
///
/// Entries are trimmed, empty entries dropped, duplicates removed
/// case-insensitively, and the requested drug itself ignored.
pub fn parse_co_medications(raw: &str, drug: &str) -> CoMedications {
    let drug = drug_key(drug);
    let mut result = CoMedications::default();
    let mut seen: Vec<String> = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let key = drug_key(entry);
        if key == drug {
            warn!("Co-medication '{}' is the requested drug; ignored", entry);
            result
                .notes
                .push(format!("co-medication '{}' is the requested drug and was ignored", entry));
            continue;
        }
        if seen.contains(&key) {
            debug!("Duplicate co-medication '{}' dropped", entry);
            continue;
        }
        seen.push(key);
        result.names.push(entry.to_string());
    }

    result
}

/// Reject a raw input longer than the limit before it is read or hashed
///
/// Applies to compressed input too: gzip output is never meaningfully smaller
/// than its framing, so an oversized archive cannot inflate within the limit.
pub fn check_input_size(input_bytes: u64, max_bytes: u64) -> Result<(), TimeoutError> {
    if input_bytes > max_bytes {
        warn!(
            "Variant input of {} bytes exceeds the {} byte limit",
            input_bytes, max_bytes
        );
        return Err(TimeoutError::InputTooLarge {
            limit_bytes: max_bytes,
        });
    }
    Ok(())
}

/// Validate everything about a request that can be checked before reading
pub fn validate_request(
    variant_bytes: &[u8],
    drug: &str,
    co_medications: &str,
    max_bytes: u64,
) -> Result<ValidatedRequest, AnalysisError> {
    let drug = validate_drug_name(drug)?;
    let co_medications = parse_co_medications(co_medications, &drug);
    check_input_size(variant_bytes.len() as u64, max_bytes)?;

    Ok(ValidatedRequest {
        input_sha256: compute_sha256(variant_bytes),
        input_bytes: variant_bytes.len() as u64,
        compressed: is_gzip(variant_bytes),
        drug,
        co_medications,
    })
}
