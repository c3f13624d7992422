// ==============================================================================
// audit.rs - Audit Logging for Analysis Requests
// ==============================================================================
// Description: Audit trail for every analysis, written as structured tracing
//              records on the "audit" target
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-18
// Version: 2.0.0
// Compliance: HIPAA § 164.312(b), GDPR Article 30
// ==============================================================================
// Records carry a digest of the variant input, never genotypes.
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Tracing target for audit records
pub const AUDIT_TARGET: &str = "audit";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AnalysisRequested,
    AnalysisCompleted,
    /// Caller-correctable problem (input, timeout, cancellation)
    AnalysisRejected,
    /// Knowledge base or internal failure
    AnalysisFailed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AuditEvent {
    pub id: Uuid,
    /// Shared by all events of one analysis
    pub analysis_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Requested drug
    pub resource: Option<String>,
    pub input_sha256: Option<String>,
    pub knowledge_base_version: String,
    pub knowledge_base_fingerprint: String,
    pub result: String,
    pub details: serde_json::Value,
    pub severity: LogSeverity,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        analysis_id: Uuid,
        resource: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        let (severity, result) = match event_type {
            AuditEventType::AnalysisRequested => (LogSeverity::Info, "pending"),
            AuditEventType::AnalysisCompleted => (LogSeverity::Info, "success"),
            AuditEventType::AnalysisRejected => (LogSeverity::Warning, "rejected"),
            AuditEventType::AnalysisFailed => (LogSeverity::Error, "failure"),
        };

        Self {
            id: Uuid::new_v4(),
            analysis_id,
            timestamp: Utc::now(),
            event_type,
            resource,
            input_sha256: None,
            knowledge_base_version: String::new(),
            knowledge_base_fingerprint: String::new(),
            result: result.to_string(),
            details,
            severity,
        }
    }

    pub fn with_input_digest(mut self, sha256: impl Into<String>) -> Self {
        self.input_sha256 = Some(sha256.into());
        self
    }

    pub fn with_knowledge_base(mut self, version: &str, fingerprint: &str) -> Self {
        self.knowledge_base_version = version.to_string();
        self.knowledge_base_fingerprint = fingerprint.to_string();
        self
    }

    /// Escalate severity (e.g., internal consistency failures)
    pub fn with_severity(mut self, severity: LogSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Emit the event as one JSON record on the audit target
    pub fn log(&self) {
        let record = match serde_json::to_string(self) {
            Ok(record) => record,
            Err(e) => {
                error!(target: AUDIT_TARGET, "Failed to serialize audit event {}: {}", self.id, e);
                return;
            }
        };

        match self.severity {
            LogSeverity::Info => info!(target: AUDIT_TARGET, "{}", record),
            LogSeverity::Warning => warn!(target: AUDIT_TARGET, "{}", record),
            LogSeverity::Error | LogSeverity::Critical => error!(target: AUDIT_TARGET, "{}", record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_creation() {
        let analysis_id = Uuid::new_v4();
        let event = AuditEvent::new(
            AuditEventType::AnalysisRequested,
            analysis_id,
            Some("warfarin".to_string()),
            serde_json::json!({ "co_medications": 1 }),
        )
        .with_input_digest("abc123")
        .with_knowledge_base("v1", "f00d");

        assert_eq!(event.analysis_id, analysis_id);
        assert_eq!(event.resource, Some("warfarin".to_string()));
        assert_eq!(event.input_sha256.as_deref(), Some("abc123"));
        assert_eq!(event.knowledge_base_version, "v1");
        assert_eq!(event.severity, LogSeverity::Info);
        assert_ne!(event.id, analysis_id);
    }

    #[test]
    fn test_failure_severity() {
        let event = AuditEvent::new(
            AuditEventType::AnalysisFailed,
            Uuid::new_v4(),
            None,
            serde_json::json!({}),
        );
        assert_eq!(event.severity, LogSeverity::Error);
        assert_eq!(event.result, "failure");

        let event = event.with_severity(LogSeverity::Critical);
        assert_eq!(event.severity, LogSeverity::Critical);
    }

    #[test]
    fn test_serialized_form() {
        let event = AuditEvent::new(
            AuditEventType::AnalysisRejected,
            Uuid::new_v4(),
            Some("codeine".to_string()),
            serde_json::json!({ "category": "InputError" }),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "analysis_rejected");
        assert_eq!(json["severity"], "warning");
        event.log();
    }
}
