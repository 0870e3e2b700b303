use async_trait::async_trait;
use chrono::NaiveDate;
use derive_more::Display;

use crate::model::absence::{Absence, AbsenceStatus, NewAbsence};

#[cfg(test)]
pub mod memory;
pub mod mysql;

pub use mysql::MySqlAbsenceRepository;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Narrowing criteria for paged absence listings; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AbsenceFilter {
    pub user_id: Option<u64>,
    pub status: Option<AbsenceStatus>,
    /// Only absences covering this date
    pub date: Option<NaiveDate>,
    /// Substring of the justification text or the username
    pub search: Option<String>,
}

/// 1-based page request, already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(DEFAULT_PAGE).max(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

/// Why a checked write was refused.
#[derive(Debug, Display)]
pub enum WriteError {
    #[display(fmt = "absence intersects another absence of the same user")]
    Overlap,
    #[display(fmt = "user {} does not exist", _0)]
    UnknownUser(u64),
    #[display(fmt = "{}", _0)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for WriteError {
    fn from(e: sqlx::Error) -> Self {
        WriteError::Database(e)
    }
}

#[async_trait]
pub trait AbsenceRepository: Send + Sync {
    /// Inserts a `PENDING` absence. The user must exist and no other absence
    /// of theirs may intersect the range; both are checked atomically with the write.
    async fn insert(&self, absence: NewAbsence) -> Result<Absence, WriteError>;

    async fn find_by_id(&self, id: u64) -> Result<Option<Absence>, sqlx::Error>;

    /// One page of matches, newest start date first, plus the total match count.
    async fn find_page(
        &self,
        filter: &AbsenceFilter,
        page: PageRequest,
    ) -> Result<(Vec<Absence>, i64), sqlx::Error>;

    async fn find_covering(&self, date: NaiveDate) -> Result<Vec<Absence>, sqlx::Error>;

    /// Persists the mutable columns of an existing absence, under the same
    /// overlap rule as `insert`.
    async fn save(&self, absence: &Absence) -> Result<Absence, WriteError>;

    /// Returns false when nothing was deleted.
    async fn delete(&self, id: u64) -> Result<bool, sqlx::Error>;
}
