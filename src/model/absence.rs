use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AbsenceStatus {
    Pending,
    Justified,
    Validated,
}

impl AbsenceStatus {
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": 1,
    "userId": 1000,
    "username": "jdoe",
    "startDate": "2026-01-05",
    "endDate": "2026-01-06",
    "isRecurring": false,
    "justificationText": "Medical appointment",
    "justificationFile": "uploads/4f1c0e9a-6b7d-4c3e-9d55-0c2f1b8e7a10_note.pdf",
    "status": "JUSTIFIED",
    "createdAt": "2026-01-05T08:00:00Z"
}))]
pub struct Absence {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub user_id: u64,
    #[schema(example = "jdoe", nullable = true)]
    pub username: Option<String>,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-06", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub is_recurring: bool,
    pub justification_text: Option<String>,
    /// Path of the stored justification file, relative to the server
    pub justification_file: Option<String>,
    pub status: AbsenceStatus,
    #[schema(example = "2026-01-05T08:00:00Z", format = "date-time", value_type = String)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Row as read from MySQL; status is kept as text and parsed afterwards.
#[derive(Debug, FromRow)]
pub struct AbsenceRow {
    pub id: u64,
    pub user_id: u64,
    pub username: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_recurring: bool,
    pub justification_text: Option<String>,
    pub justification_file: Option<String>,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl TryFrom<AbsenceRow> for Absence {
    type Error = sqlx::Error;

    fn try_from(row: AbsenceRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<AbsenceStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Absence {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            start_date: row.start_date,
            end_date: row.end_date,
            is_recurring: row.is_recurring,
            justification_text: row.justification_text,
            justification_file: row.justification_file,
            status,
            created_at: row.created_at,
        })
    }
}

/// Values needed to insert a fresh absence; it always starts as `PENDING`.
#[derive(Debug, Clone)]
pub struct NewAbsence {
    pub user_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_recurring: bool,
}
