// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for genetic variant file formats
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

pub mod vcf;

pub use vcf::{
    parse_record, read_variant_calls, ParseWarning, ReadLimits, RecordError, VariantReader,
    VariantSet,
};
