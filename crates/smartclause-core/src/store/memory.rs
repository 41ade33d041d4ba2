//! In-memory [`Store`] implementation for tests and local development.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Query semantics (ordering, TTL predicates, ownership filters, document
//! uniqueness) match the Postgres store.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{AnalysisResult, Document, DocumentStatus, NewAnalysis, Space, User};

use super::Store;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    spaces: HashMap<Uuid, Space>,
    documents: HashMap<Uuid, Document>,
    analyses: Vec<AnalysisResult>,
    next_analysis_id: i64,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(a: &AnalysisResult, b: &AnalysisResult) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut t = self.write();
        if t
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            bail!("duplicate username or email: {}", user.username);
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut t = self.write();
        if t.users.values().any(|u| {
            u.id != user.id && (u.username == user.username || u.email == user.email)
        }) {
            bail!("duplicate username or email: {}", user.username);
        }
        t.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.read().users.get(&id).cloned())
    }

    async fn find_user_by_login(&self, username_or_email: &str) -> Result<Option<User>> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.username == username_or_email || u.email == username_or_email)
            .cloned())
    }

    async fn find_user_by_verification_token(&self, token: &str) -> Result<Option<User>> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.email_verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        Ok(self.read().users.values().any(|u| u.username == username))
    }

    async fn email_taken(&self, email: &str) -> Result<bool> {
        Ok(self.read().users.values().any(|u| u.email == email))
    }

    async fn insert_space(&self, space: &Space) -> Result<()> {
        self.write().spaces.insert(space.id, space.clone());
        Ok(())
    }

    async fn update_space(&self, space: &Space) -> Result<()> {
        self.write().spaces.insert(space.id, space.clone());
        Ok(())
    }

    async fn get_space_for_user(&self, id: Uuid, user_id: &str) -> Result<Option<Space>> {
        Ok(self
            .read()
            .spaces
            .get(&id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn list_spaces_for_user(&self, user_id: &str) -> Result<Vec<Space>> {
        let mut spaces: Vec<Space> = self
            .read()
            .spaces
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        spaces.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(spaces)
    }

    async fn space_name_taken(&self, name: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .read()
            .spaces
            .values()
            .any(|s| s.name == name && s.user_id == user_id))
    }

    async fn delete_space(&self, id: Uuid) -> Result<()> {
        let mut t = self.write();
        t.documents.retain(|_, d| d.space_id != id);
        t.spaces.remove(&id);
        Ok(())
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let mut t = self.write();
        if t.documents.values().any(|d| {
            d.content_hash == doc.content_hash
                && d.space_id == doc.space_id
                && d.user_id == doc.user_id
        }) {
            bail!(
                "document with content hash {} already exists in space {}",
                doc.content_hash,
                doc.space_id
            );
        }
        t.documents.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn update_document(&self, doc: &Document) -> Result<()> {
        self.write().documents.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn set_document_status(
        &self,
        id: Uuid,
        analysis_document_id: &str,
        status: DocumentStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut t = self.write();
        match t.documents.get_mut(&id) {
            Some(doc) if doc.analysis_document_id.as_deref() == Some(analysis_document_id) => {
                doc.status = status;
                doc.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.read().documents.get(&id).cloned())
    }

    async fn get_document_for_user(&self, id: Uuid, user_id: &str) -> Result<Option<Document>> {
        Ok(self
            .read()
            .documents
            .get(&id)
            .filter(|d| d.user_id == user_id)
            .cloned())
    }

    async fn list_documents(&self, space_id: Uuid, user_id: &str) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .read()
            .documents
            .values()
            .filter(|d| d.space_id == space_id && d.user_id == user_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(docs)
    }

    async fn count_documents(&self, space_id: Uuid) -> Result<i64> {
        Ok(self
            .read()
            .documents
            .values()
            .filter(|d| d.space_id == space_id)
            .count() as i64)
    }

    async fn find_duplicate_document(
        &self,
        content_hash: &str,
        space_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Document>> {
        Ok(self
            .read()
            .documents
            .values()
            .find(|d| {
                d.content_hash == content_hash && d.space_id == space_id && d.user_id == user_id
            })
            .cloned())
    }

    async fn delete_document(&self, id: Uuid) -> Result<()> {
        self.write().documents.remove(&id);
        Ok(())
    }

    async fn insert_analysis(&self, analysis: &NewAnalysis) -> Result<AnalysisResult> {
        let mut t = self.write();
        t.next_analysis_id += 1;
        let row = AnalysisResult {
            id: t.next_analysis_id,
            document_id: analysis.document_id.clone(),
            user_id: analysis.user_id.clone(),
            content_hash: analysis.content_hash.clone(),
            analysis_points: analysis.analysis_points.clone(),
            created_at: analysis.created_at,
            expires_at: analysis.expires_at,
        };
        t.analyses.push(row.clone());
        Ok(row)
    }

    async fn latest_analysis(&self, document_id: &str) -> Result<Option<AnalysisResult>> {
        Ok(self
            .read()
            .analyses
            .iter()
            .filter(|a| a.document_id == document_id)
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn delete_analyses(&self, document_id: &str) -> Result<u64> {
        let mut t = self.write();
        let before = t.analyses.len();
        t.analyses.retain(|a| a.document_id != document_id);
        Ok((before - t.analyses.len()) as u64)
    }

    async fn find_cached_analysis(
        &self,
        content_hash: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AnalysisResult>> {
        Ok(self
            .read()
            .analyses
            .iter()
            .filter(|a| {
                a.content_hash.as_deref() == Some(content_hash)
                    && a.user_id.as_deref() == Some(user_id)
                    && a.is_live(now)
            })
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn delete_expired_analyses(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut t = self.write();
        let before = t.analyses.len();
        t.analyses
            .retain(|a| !matches!(a.expires_at, Some(expires) if expires <= now));
        Ok((before - t.analyses.len()) as u64)
    }

    async fn count_active_cache_entries(&self, now: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .read()
            .analyses
            .iter()
            .filter(|a| a.content_hash.is_some() && a.is_live(now))
            .count() as i64)
    }

    async fn count_active_cache_entries_for_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self
            .read()
            .analyses
            .iter()
            .filter(|a| {
                a.content_hash.is_some() && a.user_id.as_deref() == Some(user_id) && a.is_live(now)
            })
            .count() as i64)
    }
}
