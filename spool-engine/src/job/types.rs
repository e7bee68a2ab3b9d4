//! Print job types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::Protocol;
use crate::lock;

/// Unknown enum tag read from storage or config
#[derive(Debug, Clone, Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseTagError {
    pub kind: &'static str,
    pub value: String,
}

/// What a job prints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// Kitchen ticket for a chef order (ESC/POS receipt printer)
    ChefOrder,
    /// Per-item sticker labels (TSPL label printer)
    LabelTicket,
    /// Customer invoice; no rendering yet
    Invoice,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::ChefOrder, JobType::LabelTicket, JobType::Invoice];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ChefOrder => "chef-order",
            JobType::LabelTicket => "label-ticket",
            JobType::Invoice => "invoice",
        }
    }

    /// Device protocol used for this kind of job
    pub fn protocol(&self) -> Protocol {
        match self {
            JobType::LabelTicket => Protocol::Raw,
            JobType::ChefOrder | JobType::Invoice => Protocol::EscPos,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseTagError {
                kind: "job type",
                value: s.to_string(),
            })
    }
}

/// Job lifecycle
///
/// `pending → printing → printed | failed`. A failed job only returns to
/// `pending` through an operator re-print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Printing,
    Printed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Printing => "printing",
            JobStatus::Printed => "printed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "printing" => Ok(JobStatus::Printing),
            "printed" => Ok(JobStatus::Printed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ParseTagError {
                kind: "job status",
                value: other.to_string(),
            }),
        }
    }
}

/// Persisted unit of print work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: i64,
    pub slug: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub printer_ip: String,
    pub printer_port: u16,
    /// Reference id into the domain table the renderer reads from
    pub data: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrintJob {
    /// Distributed lock key for the target printer
    pub fn lock_resource(&self) -> String {
        lock::resource_key(&self.printer_ip, self.printer_port)
    }
}

/// Insert payload for a new pending job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrintJob {
    pub job_type: JobType,
    pub printer_ip: String,
    pub printer_port: u16,
    pub data: String,
}

impl NewPrintJob {
    pub fn new(
        job_type: JobType,
        printer_ip: impl Into<String>,
        printer_port: u16,
        data: impl Into<String>,
    ) -> Self {
        Self {
            job_type,
            printer_ip: printer_ip.into(),
            printer_port,
            data: data.into(),
        }
    }

    /// Human-readable unique slug, e.g. `label-ticket-1b4e28ba`
    pub fn make_slug(&self) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", self.job_type, &id[..8])
    }
}

/// Job counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: u64,
    pub printing: u64,
    pub printed: u64,
    pub failed: u64,
}

impl JobStats {
    pub fn total(&self) -> u64 {
        self.pending + self.printing + self.printed + self.failed
    }

    pub(crate) fn bump(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Printing => self.printing += 1,
            JobStatus::Printed => self.printed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_round_trips_through_str() {
        for t in JobType::ALL {
            assert_eq!(t.as_str().parse::<JobType>().unwrap(), t);
        }
        assert!("receipt".parse::<JobType>().is_err());
    }

    #[test]
    fn test_job_type_serde_is_kebab_case() {
        let json = serde_json::to_string(&JobType::LabelTicket).unwrap();
        assert_eq!(json, "\"label-ticket\"");
    }

    #[test]
    fn test_protocol_mapping() {
        assert_eq!(JobType::LabelTicket.protocol(), Protocol::Raw);
        assert_eq!(JobType::ChefOrder.protocol(), Protocol::EscPos);
    }

    #[test]
    fn test_slug_prefix() {
        let job = NewPrintJob::new(JobType::ChefOrder, "10.0.0.5", 9100, "order-1");
        let slug = job.make_slug();
        assert!(slug.starts_with("chef-order-"));
        assert_eq!(slug.len(), "chef-order-".len() + 8);
    }
}
