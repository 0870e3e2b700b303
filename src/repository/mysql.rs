use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{MySqlConnection, MySqlPool};

use super::{AbsenceFilter, AbsenceRepository, PageRequest, WriteError};
use crate::model::absence::{Absence, AbsenceRow, AbsenceStatus, NewAbsence};
use crate::utils::db_utils::{SqlValue, WhereClause, bind_query_as, bind_query_scalar, like_pattern};

const SELECT_ABSENCE: &str = r#"
    SELECT
        a.id,
        a.user_id,
        u.username,
        a.start_date,
        a.end_date,
        a.is_recurring,
        a.justification_text,
        a.justification_file,
        a.status,
        a.created_at
    FROM absences a
    LEFT JOIN users u ON u.id = a.user_id
"#;

#[derive(Clone)]
pub struct MySqlAbsenceRepository {
    pool: MySqlPool,
}

impl MySqlAbsenceRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn where_clause(filter: &AbsenceFilter) -> WhereClause {
        let mut clause = WhereClause::new();

        if let Some(user_id) = filter.user_id {
            clause.push("a.user_id = ?", [SqlValue::U64(user_id)]);
        }

        if let Some(status) = filter.status {
            clause.push("a.status = ?", [SqlValue::String(status.as_str().to_string())]);
        }

        if let Some(date) = filter.date {
            clause.push(
                "a.start_date <= ? AND a.end_date >= ?",
                [SqlValue::Date(date), SqlValue::Date(date)],
            );
        }

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let like = like_pattern(search);
            clause.push(
                "(a.justification_text LIKE ? OR u.username LIKE ?)",
                [SqlValue::String(like.clone()), SqlValue::String(like)],
            );
        }

        clause
    }

    async fn fetch_required(&self, id: u64) -> Result<Absence, sqlx::Error> {
        self.find_by_id(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Locks the user row for the rest of the transaction, then checks that
    /// `[start, end]` is free. Concurrent writers for one user queue on the lock.
    async fn lock_user_range(
        conn: &mut MySqlConnection,
        user_id: u64,
        start: NaiveDate,
        end: NaiveDate,
        exclude_id: Option<u64>,
    ) -> Result<(), WriteError> {
        let locked = sqlx::query_scalar::<_, u64>("SELECT id FROM users WHERE id = ? FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
        if locked.is_none() {
            return Err(WriteError::UnknownUser(user_id));
        }

        let overlapping = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM absences
                WHERE user_id = ?
                AND start_date <= ?
                AND end_date >= ?
                AND id <> ?
            )
            "#,
        )
        .bind(user_id)
        .bind(end)
        .bind(start)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(&mut *conn)
        .await?;

        if overlapping != 0 {
            return Err(WriteError::Overlap);
        }
        Ok(())
    }
}

#[async_trait]
impl AbsenceRepository for MySqlAbsenceRepository {
    async fn insert(&self, absence: NewAbsence) -> Result<Absence, WriteError> {
        let mut tx = self.pool.begin().await?;

        Self::lock_user_range(
            &mut tx,
            absence.user_id,
            absence.start_date,
            absence.end_date,
            None,
        )
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO absences (user_id, start_date, end_date, is_recurring, status)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(absence.user_id)
        .bind(absence.start_date)
        .bind(absence.end_date)
        .bind(absence.is_recurring)
        .bind(AbsenceStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(self.fetch_required(result.last_insert_id()).await?)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Absence>, sqlx::Error> {
        let sql = format!("{SELECT_ABSENCE} WHERE a.id = ?");

        sqlx::query_as::<_, AbsenceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Absence::try_from)
            .transpose()
    }

    async fn find_page(
        &self,
        filter: &AbsenceFilter,
        page: PageRequest,
    ) -> Result<(Vec<Absence>, i64), sqlx::Error> {
        let clause = Self::where_clause(filter);
        let where_sql = clause.sql();

        // -------------------------
        // COUNT query
        // -------------------------
        let count_sql = format!(
            "SELECT COUNT(*) FROM absences a LEFT JOIN users u ON u.id = a.user_id{where_sql}"
        );
        tracing::debug!(sql = %count_sql, bindings = ?clause.values(), "Counting absences");

        let total = bind_query_scalar(sqlx::query_scalar::<_, i64>(&count_sql), clause.values())
            .fetch_one(&self.pool)
            .await?;

        // -------------------------
        // DATA query
        // -------------------------
        let data_sql = format!(
            "{SELECT_ABSENCE}{where_sql} ORDER BY a.start_date DESC, a.id DESC LIMIT ? OFFSET ?"
        );
        tracing::debug!(sql = %data_sql, page = page.page, limit = page.limit, "Fetching absences");

        let rows = bind_query_as(sqlx::query_as::<_, AbsenceRow>(&data_sql), clause.values())
            .bind(page.limit as u64)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let data = rows
            .into_iter()
            .map(Absence::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((data, total))
    }

    async fn find_covering(&self, date: NaiveDate) -> Result<Vec<Absence>, sqlx::Error> {
        let sql = format!(
            "{SELECT_ABSENCE} WHERE a.start_date <= ? AND a.end_date >= ? ORDER BY a.id DESC"
        );

        sqlx::query_as::<_, AbsenceRow>(&sql)
            .bind(date)
            .bind(date)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Absence::try_from)
            .collect()
    }

    async fn save(&self, absence: &Absence) -> Result<Absence, WriteError> {
        let mut tx = self.pool.begin().await?;

        Self::lock_user_range(
            &mut tx,
            absence.user_id,
            absence.start_date,
            absence.end_date,
            Some(absence.id),
        )
        .await?;

        sqlx::query(
            r#"
            UPDATE absences
            SET start_date = ?,
                end_date = ?,
                is_recurring = ?,
                justification_text = ?,
                justification_file = ?,
                status = ?
            WHERE id = ?
            "#,
        )
        .bind(absence.start_date)
        .bind(absence.end_date)
        .bind(absence.is_recurring)
        .bind(absence.justification_text.as_deref())
        .bind(absence.justification_file.as_deref())
        .bind(absence.status.as_str())
        .bind(absence.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(self.fetch_required(absence.id).await?)
    }

    async fn delete(&self, id: u64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM absences WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_has_no_where_clause() {
        let clause = MySqlAbsenceRepository::where_clause(&AbsenceFilter::default());
        assert_eq!(clause.sql(), "");
    }

    #[test]
    fn full_filter_binds_every_value() {
        let date = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let filter = AbsenceFilter {
            user_id: Some(9),
            status: Some(AbsenceStatus::Justified),
            date: Some(date),
            search: Some(" flu ".to_string()),
        };

        let clause = MySqlAbsenceRepository::where_clause(&filter);
        assert_eq!(
            clause.sql(),
            " WHERE a.user_id = ? AND a.status = ? AND a.start_date <= ? AND a.end_date >= ? \
             AND (a.justification_text LIKE ? OR u.username LIKE ?)"
        );
        assert_eq!(
            clause.values(),
            &[
                SqlValue::U64(9),
                SqlValue::String("JUSTIFIED".into()),
                SqlValue::Date(date),
                SqlValue::Date(date),
                SqlValue::String("%flu%".into()),
                SqlValue::String("%flu%".into()),
            ]
        );
    }

    #[test]
    fn blank_search_is_ignored() {
        let filter = AbsenceFilter {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(MySqlAbsenceRepository::where_clause(&filter).sql(), "");
    }
}
