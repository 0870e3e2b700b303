use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use super::{AbsenceFilter, AbsenceRepository, PageRequest, WriteError};
use crate::model::absence::{Absence, AbsenceStatus, NewAbsence};

/// Process-local repository backing the endpoint and service tests.
#[derive(Default)]
pub struct InMemoryAbsenceRepository {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    rows: Vec<Absence>,
    usernames: HashMap<u64, String>,
    // when set, writes for users never registered with `with_user` fail
    known_users_only: bool,
}

impl InMemoryAbsenceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a username so that joins and searches can see it.
    pub fn with_user(self, user_id: u64, username: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .usernames
            .insert(user_id, username.to_string());
        self
    }

    /// Rejects writes for users that were not registered, like the users foreign key.
    pub fn known_users_only(self) -> Self {
        self.inner.lock().unwrap().known_users_only = true;
        self
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().rows.len()
    }
}

impl Inner {
    fn check_range(
        &self,
        user_id: u64,
        start: NaiveDate,
        end: NaiveDate,
        exclude_id: Option<u64>,
    ) -> Result<(), WriteError> {
        if self.known_users_only && !self.usernames.contains_key(&user_id) {
            return Err(WriteError::UnknownUser(user_id));
        }
        let overlapping = self.rows.iter().any(|a| {
            a.user_id == user_id
                && Some(a.id) != exclude_id
                && a.start_date <= end
                && a.end_date >= start
        });
        if overlapping {
            return Err(WriteError::Overlap);
        }
        Ok(())
    }
}

fn covers(absence: &Absence, date: NaiveDate) -> bool {
    absence.start_date <= date && date <= absence.end_date
}

fn matches(filter: &AbsenceFilter, absence: &Absence) -> bool {
    if filter.user_id.is_some_and(|id| id != absence.user_id) {
        return false;
    }
    if filter.status.is_some_and(|s| s != absence.status) {
        return false;
    }
    if filter.date.is_some_and(|d| !covers(absence, d)) {
        return false;
    }
    match filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(term) => {
            let term = term.to_lowercase();
            let hit = |field: &Option<String>| {
                field
                    .as_deref()
                    .is_some_and(|v| v.to_lowercase().contains(&term))
            };
            hit(&absence.justification_text) || hit(&absence.username)
        }
        None => true,
    }
}

#[async_trait]
impl AbsenceRepository for InMemoryAbsenceRepository {
    async fn insert(&self, absence: NewAbsence) -> Result<Absence, WriteError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_range(absence.user_id, absence.start_date, absence.end_date, None)?;
        inner.next_id += 1;

        let row = Absence {
            id: inner.next_id,
            user_id: absence.user_id,
            username: inner.usernames.get(&absence.user_id).cloned(),
            start_date: absence.start_date,
            end_date: absence.end_date,
            is_recurring: absence.is_recurring,
            justification_text: None,
            justification_file: None,
            status: AbsenceStatus::Pending,
            created_at: Some(Utc::now()),
        };
        inner.rows.push(row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Absence>, sqlx::Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rows.iter().find(|a| a.id == id).cloned())
    }

    async fn find_page(
        &self,
        filter: &AbsenceFilter,
        page: PageRequest,
    ) -> Result<(Vec<Absence>, i64), sqlx::Error> {
        let inner = self.inner.lock().unwrap();
        let mut hits: Vec<Absence> = inner
            .rows
            .iter()
            .filter(|a| matches(filter, a))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));

        let total = hits.len() as i64;
        let data = hits
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Ok((data, total))
    }

    async fn find_covering(&self, date: NaiveDate) -> Result<Vec<Absence>, sqlx::Error> {
        let inner = self.inner.lock().unwrap();
        let mut hits: Vec<Absence> = inner
            .rows
            .iter()
            .filter(|a| covers(a, date))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(hits)
    }

    async fn save(&self, absence: &Absence) -> Result<Absence, WriteError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_range(
            absence.user_id,
            absence.start_date,
            absence.end_date,
            Some(absence.id),
        )?;
        let row = inner
            .rows
            .iter_mut()
            .find(|a| a.id == absence.id)
            .ok_or(sqlx::Error::RowNotFound)?;

        row.start_date = absence.start_date;
        row.end_date = absence.end_date;
        row.is_recurring = absence.is_recurring;
        row.justification_text = absence.justification_text.clone();
        row.justification_file = absence.justification_file.clone();
        row.status = absence.status;
        Ok(row.clone())
    }

    async fn delete(&self, id: u64) -> Result<bool, sqlx::Error> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.rows.len();
        inner.rows.retain(|a| a.id != id);
        Ok(inner.rows.len() != before)
    }
}
