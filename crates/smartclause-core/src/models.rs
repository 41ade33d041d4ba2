//! Core data models.
//!
//! These types mirror the Postgres schema created by `smartclause init`.
//! Status enums are stored uppercase (`COMPLETED`) and rendered lowercase
//! (`completed`) in API responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account role carried in the `role` token claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::System => "SYSTEM",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            "SYSTEM" => Ok(Role::System),
            other => anyhow::bail!("unknown role: {}", other),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub email_verification_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// "First Last", trimmed; empty when neither name is set.
    pub fn full_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("");
        let last = self.last_name.as_deref().unwrap_or("");
        format!("{} {}", first, last).trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceStatus {
    Active,
    Processing,
    Error,
}

impl SpaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceStatus::Active => "ACTIVE",
            SpaceStatus::Processing => "PROCESSING",
            SpaceStatus::Error => "ERROR",
        }
    }

    pub fn label(&self) -> String {
        self.as_str().to_lowercase()
    }
}

impl FromStr for SpaceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(SpaceStatus::Active),
            "PROCESSING" => Ok(SpaceStatus::Processing),
            "ERROR" => Ok(SpaceStatus::Error),
            other => anyhow::bail!("unknown space status: {}", other),
        }
    }
}

/// A named container of documents owned by one user.
#[derive(Debug, Clone)]
pub struct Space {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub user_id: String,
    pub status: SpaceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Uploading,
    Processing,
    Completed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploading => "UPLOADING",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Error => "ERROR",
        }
    }

    pub fn label(&self) -> String {
        self.as_str().to_lowercase()
    }

    /// Human-readable summary shown in document listings.
    pub fn summary(&self) -> &'static str {
        match self {
            DocumentStatus::Completed => "Analysis completed - Found potential issues",
            DocumentStatus::Processing => "Analysis in progress...",
            DocumentStatus::Error => "Analysis failed",
            DocumentStatus::Uploading => "Pending analysis",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOADING" => Ok(DocumentStatus::Uploading),
            "PROCESSING" => Ok(DocumentStatus::Processing),
            "COMPLETED" => Ok(DocumentStatus::Completed),
            "ERROR" => Ok(DocumentStatus::Error),
            other => anyhow::bail!("unknown document status: {}", other),
        }
    }
}

/// An uploaded file and its analysis state.
///
/// `content_hash` is the lowercase hex SHA-256 of `content`. Together with
/// `space_id` and `user_id` it identifies a document uniquely.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub space_id: Uuid,
    pub user_id: String,
    pub name: String,
    pub original_filename: String,
    pub file_path: String,
    pub size: i64,
    pub content_type: String,
    pub content: Vec<u8>,
    pub content_hash: String,
    pub status: DocumentStatus,
    pub analysis_document_id: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored analysis. Rows carrying `content_hash` and `expires_at`
/// double as entries of the analysis cache.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub id: i64,
    /// The analysis id (`Document::analysis_document_id`), or the caller
    /// supplied id for public analyses.
    pub document_id: String,
    pub user_id: Option<String>,
    pub content_hash: Option<String>,
    pub analysis_points: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AnalysisResult {
    /// A row is live strictly before its expiry instant.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires) if expires > now)
    }
}

/// Insert payload for [`AnalysisResult`]; the store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub document_id: String,
    pub user_id: Option<String>,
    pub content_hash: Option<String>,
    pub analysis_points: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}
