//! Persisted row models shared across Sitebill services

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// BOQ contracting layer
///
/// The two types are independent per-project state machines; the only
/// coupling is that a sub-contractor upload requires the contractor BOQ
/// to be processed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoqType {
    Contractor,
    SubContractor,
}

impl BoqType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoqType::Contractor => "contractor",
            BoqType::SubContractor => "sub_contractor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contractor" => Some(BoqType::Contractor),
            "sub_contractor" => Some(BoqType::SubContractor),
            _ => None,
        }
    }
}

/// BOQ header lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoqStatus {
    /// Header created, upload not yet picked up
    Pending,
    /// Parse/materialize in flight
    Processing,
    /// Materialization committed
    Processed,
    /// Materialization failed; `error_message` carries the cause
    Failed,
}

impl BoqStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoqStatus::Pending => "pending",
            BoqStatus::Processing => "processing",
            BoqStatus::Processed => "processed",
            BoqStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BoqStatus::Pending),
            "processing" => Some(BoqStatus::Processing),
            "processed" => Some(BoqStatus::Processed),
            "failed" => Some(BoqStatus::Failed),
            _ => None,
        }
    }
}

/// Phase lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    NotStarted,
    InProgress,
    Completed,
    OnHold,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::NotStarted => "not_started",
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Completed => "completed",
            PhaseStatus::OnHold => "on_hold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(PhaseStatus::NotStarted),
            "in_progress" => Some(PhaseStatus::InProgress),
            "completed" => Some(PhaseStatus::Completed),
            "on_hold" => Some(PhaseStatus::OnHold),
            _ => None,
        }
    }
}

/// Construction project (collaborator surface: this service reads the
/// project and updates its cached budget)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub total_budget: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// BOQ header: one row owns the outcome of the most recent upload of a
/// given type for a given project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectBoq {
    pub id: Uuid,
    pub project_id: Uuid,
    pub boq_type: BoqType,
    pub status: BoqStatus,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub file_mimetype: Option<String>,
    pub file_size: i64,
    pub total_amount: f64,
    pub phases_count: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted unit of billable work, materialized from one BOQ line item
/// or created manually
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub budget: f64,
    pub status: PhaseStatus,
    pub is_active: bool,
    pub from_boq: bool,
    /// Which BOQ upload type created this phase (manual phases carry none)
    pub source_boq_type: Option<BoqType>,
    pub parent_phase_id: Option<Uuid>,
    /// Counterpart phase for the other BOQ type, when linked
    pub linked_phase_id: Option<Uuid>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
