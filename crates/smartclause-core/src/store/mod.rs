//! Storage abstraction for SmartClause.
//!
//! The [`Store`] trait defines every persistence operation the services
//! need, enabling pluggable backends (Postgres in production, in-memory
//! for tests).
//!
//! # Analysis cache contract
//!
//! Analysis rows with a `content_hash` and an `expires_at` form a TTL cache
//! keyed by `(content_hash, user_id)`:
//!
//! - a row is live while `expires_at > now`;
//! - lookups return the newest live row by `created_at` (ties broken by id);
//! - cleanup removes every row with `expires_at <= now`.
//!
//! There is no at-most-one computation guarantee per key.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{AnalysisResult, Document, DocumentStatus, NewAnalysis, Space, User};

/// Abstract storage backend.
///
/// | Group | Methods |
/// |-------|---------|
/// | users | [`insert_user`](Store::insert_user), [`update_user`](Store::update_user), [`get_user`](Store::get_user), [`find_user_by_login`](Store::find_user_by_login), ... |
/// | spaces | [`insert_space`](Store::insert_space), [`list_spaces_for_user`](Store::list_spaces_for_user), [`delete_space`](Store::delete_space), ... |
/// | documents | [`insert_document`](Store::insert_document), [`find_duplicate_document`](Store::find_duplicate_document), ... |
/// | analyses | [`insert_analysis`](Store::insert_analysis), [`find_cached_analysis`](Store::find_cached_analysis), [`delete_expired_analyses`](Store::delete_expired_analyses), ... |
#[async_trait]
pub trait Store: Send + Sync {
    // ---- users ----

    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn update_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Look up an account by username or email (exact match on either).
    async fn find_user_by_login(&self, username_or_email: &str) -> Result<Option<User>>;

    async fn find_user_by_verification_token(&self, token: &str) -> Result<Option<User>>;

    async fn username_taken(&self, username: &str) -> Result<bool>;

    async fn email_taken(&self, email: &str) -> Result<bool>;

    // ---- spaces ----

    async fn insert_space(&self, space: &Space) -> Result<()>;

    async fn update_space(&self, space: &Space) -> Result<()>;

    /// Fetch a space only if it belongs to `user_id`.
    async fn get_space_for_user(&self, id: Uuid, user_id: &str) -> Result<Option<Space>>;

    /// All spaces of `user_id`, newest first.
    async fn list_spaces_for_user(&self, user_id: &str) -> Result<Vec<Space>>;

    async fn space_name_taken(&self, name: &str, user_id: &str) -> Result<bool>;

    /// Delete a space row. Callers remove its documents first.
    async fn delete_space(&self, id: Uuid) -> Result<()>;

    // ---- documents ----

    /// Insert a document.
    ///
    /// Fails if another document already has the same
    /// `(content_hash, space_id, user_id)`.
    async fn insert_document(&self, doc: &Document) -> Result<()>;

    async fn update_document(&self, doc: &Document) -> Result<()>;

    /// Set `status` only while the document's current analysis is
    /// `analysis_document_id`. Returns whether the row changed.
    async fn set_document_status(
        &self,
        id: Uuid,
        analysis_document_id: &str,
        status: DocumentStatus,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;

    async fn get_document_for_user(&self, id: Uuid, user_id: &str) -> Result<Option<Document>>;

    /// Documents of a space owned by `user_id`, newest upload first.
    async fn list_documents(&self, space_id: Uuid, user_id: &str) -> Result<Vec<Document>>;

    async fn count_documents(&self, space_id: Uuid) -> Result<i64>;

    async fn find_duplicate_document(
        &self,
        content_hash: &str,
        space_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Document>>;

    async fn delete_document(&self, id: Uuid) -> Result<()>;

    // ---- analyses ----

    async fn insert_analysis(&self, analysis: &NewAnalysis) -> Result<AnalysisResult>;

    /// Newest analysis stored under `document_id`, expired or not.
    async fn latest_analysis(&self, document_id: &str) -> Result<Option<AnalysisResult>>;

    async fn delete_analyses(&self, document_id: &str) -> Result<u64>;

    /// Newest live cache row for `(content_hash, user_id)` at `now`.
    async fn find_cached_analysis(
        &self,
        content_hash: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AnalysisResult>>;

    /// Delete every row with `expires_at <= now`; returns the count removed.
    async fn delete_expired_analyses(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Live rows that carry a content hash.
    async fn count_active_cache_entries(&self, now: DateTime<Utc>) -> Result<i64>;

    async fn count_active_cache_entries_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<i64>;
}
