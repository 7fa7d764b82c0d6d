use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::CertifyError;

/// Which completion category a record belongs to. Selects the body wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    Internship,
    Training,
}

impl Track {
    pub fn as_str(self) -> &'static str {
        match self {
            Track::Internship => "internship",
            Track::Training => "training",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Track::Internship => "Internship",
            Track::Training => "Training",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "internship" => Some(Track::Internship),
            "training" => Some(Track::Training),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Approved,
    Rejected,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Approved => "approved",
            Status::Rejected => "rejected",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Status::Pending),
            "approved" => Some(Status::Approved),
            "rejected" => Some(Status::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct RecordRow {
    pub id: i64,
    pub track: String,
    pub name: String,
    pub email: String,
    pub track_label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub verification_code: Option<String>,
    pub certificate_sent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateRecord {
    pub id: i64,
    pub track: Track,
    pub name: String,
    pub email: String,
    pub track_label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: Status,
    pub verification_code: Option<String>,
    pub certificate_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl CertificateRecord {
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }
}

impl TryFrom<RecordRow> for CertificateRecord {
    type Error = CertifyError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let track = Track::parse(&row.track).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown track {:?} on record {}", row.track, row.id).into())
        })?;
        let status = Status::parse(&row.status).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown status {:?} on record {}", row.status, row.id).into())
        })?;
        Ok(Self {
            id: row.id,
            track,
            name: row.name,
            email: row.email,
            track_label: row.track_label,
            start_date: row.start_date,
            end_date: row.end_date,
            status,
            verification_code: row.verification_code,
            certificate_sent: row.certificate_sent,
            created_at: row.created_at,
        })
    }
}

/// Intake payload as submitted by the admin form. Dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecord {
    pub track: Track,
    pub name: String,
    pub email: String,
    pub track_label: String,
    pub start_date: String,
    pub end_date: String,
}

/// A validated [`NewRecord`], ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub track: Track,
    pub name: String,
    pub email: String,
    pub track_label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl NewRecord {
    pub fn validate(&self) -> Result<RecordDraft, CertifyError> {
        let name = required(&self.name, "name")?;
        let email = required(&self.email, "email")?;
        if !email.contains('@') {
            return Err(CertifyError::Validation(format!(
                "email {email:?} is not an address"
            )));
        }
        let track_label = required(&self.track_label, "track_label")?;
        let start_date = parse_date(&self.start_date, "start_date")?;
        let end_date = parse_date(&self.end_date, "end_date")?;
        if end_date < start_date {
            return Err(CertifyError::Validation(format!(
                "end_date {end_date} is before start_date {start_date}"
            )));
        }

        Ok(RecordDraft {
            track: self.track,
            name,
            email,
            track_label,
            start_date,
            end_date,
        })
    }
}

fn required(value: &str, field: &str) -> Result<String, CertifyError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CertifyError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, CertifyError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        CertifyError::Validation(format!("{field} {value:?} is not a YYYY-MM-DD date: {e}"))
    })
}
