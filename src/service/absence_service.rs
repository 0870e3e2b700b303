use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::error::AbsenceError;
use crate::model::absence::{Absence, AbsenceStatus, NewAbsence};
use crate::repository::{AbsenceFilter, AbsenceRepository, PageRequest, WriteError};
use crate::utils::upload_store::{UploadStore, original_filename};

/// Input for creating an absence; `end_date` defaults to `start_date`.
#[derive(Debug, Clone)]
pub struct CreateAbsence {
    pub user_id: u64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_recurring: bool,
}

/// Justification fields shared by the JSON and the multipart endpoints.
#[derive(Debug, Clone)]
pub struct Justification {
    pub text: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_recurring: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AbsencePage {
    pub data: Vec<Absence>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub limit: u32,
    #[schema(example = 1)]
    pub total: i64,
    #[schema(example = 1)]
    pub total_pages: u32,
}

impl AbsencePage {
    fn new(data: Vec<Absence>, total: i64, page: PageRequest) -> Self {
        let total_pages = (total.max(0) as u64).div_ceil(page.limit as u64) as u32;
        Self {
            data,
            page: page.page,
            limit: page.limit,
            total,
            total_pages,
        }
    }
}

/// Downloadable justification attachment.
pub struct JustificationFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub struct AbsenceService {
    repo: Arc<dyn AbsenceRepository>,
    uploads: UploadStore,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), AbsenceError> {
    if start > end {
        return Err(AbsenceError::bad_request("startDate cannot be after endDate"));
    }
    Ok(())
}

fn write_failed(e: WriteError, user_id: u64, start: NaiveDate, end: NaiveDate) -> AbsenceError {
    match e {
        WriteError::Overlap => AbsenceError::Conflict(format!(
            "User {user_id} already has an absence between {start} and {end}"
        )),
        WriteError::UnknownUser(id) => AbsenceError::NotFound(format!("User {id} not found")),
        WriteError::Database(e) => e.into(),
    }
}

impl AbsenceService {
    pub fn new(repo: Arc<dyn AbsenceRepository>, uploads: UploadStore) -> Self {
        Self { repo, uploads }
    }

    async fn load(&self, id: u64) -> Result<Absence, AbsenceError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AbsenceError::not_found(id))
    }

    async fn insert_checked(&self, absence: NewAbsence) -> Result<Absence, AbsenceError> {
        check_range(absence.start_date, absence.end_date)?;

        let (user_id, start, end) = (absence.user_id, absence.start_date, absence.end_date);
        let created = self
            .repo
            .insert(absence)
            .await
            .map_err(|e| write_failed(e, user_id, start, end))?;

        info!(absence_id = created.id, user_id = created.user_id, "Absence created");
        Ok(created)
    }

    async fn save(&self, absence: &Absence) -> Result<Absence, AbsenceError> {
        self.repo.save(absence).await.map_err(|e| {
            write_failed(e, absence.user_id, absence.start_date, absence.end_date)
        })
    }

    pub async fn create_absence(
        &self,
        caller: &AuthUser,
        request: CreateAbsence,
    ) -> Result<Absence, AbsenceError> {
        caller.require_self_or_hr(request.user_id)?;

        self.insert_checked(NewAbsence {
            user_id: request.user_id,
            start_date: request.start_date,
            end_date: request.end_date.unwrap_or(request.start_date),
            is_recurring: request.is_recurring,
        })
        .await
    }

    pub async fn create_today_absence(
        &self,
        caller: &AuthUser,
        user_id: u64,
    ) -> Result<Absence, AbsenceError> {
        caller.require_self_or_hr(user_id)?;

        let today = today();
        self.insert_checked(NewAbsence {
            user_id,
            start_date: today,
            end_date: today,
            is_recurring: false,
        })
        .await
    }

    pub async fn get_absences(
        &self,
        filter: AbsenceFilter,
        page: PageRequest,
    ) -> Result<AbsencePage, AbsenceError> {
        let (data, total) = self.repo.find_page(&filter, page).await?;
        Ok(AbsencePage::new(data, total, page))
    }

    /// The caller's absences still waiting for a justification.
    pub async fn get_my_absences(
        &self,
        caller: &AuthUser,
        page: PageRequest,
    ) -> Result<AbsencePage, AbsenceError> {
        let filter = AbsenceFilter {
            user_id: Some(caller.user_id),
            status: Some(AbsenceStatus::Pending),
            ..Default::default()
        };
        self.get_absences(filter, page).await
    }

    pub async fn get_today_absences(&self) -> Result<Vec<Absence>, AbsenceError> {
        Ok(self.repo.find_covering(today()).await?)
    }

    pub async fn get_absence_by_id(
        &self,
        caller: &AuthUser,
        id: u64,
    ) -> Result<Absence, AbsenceError> {
        let absence = self.load(id).await?;
        caller.require_self_or_hr(absence.user_id)?;
        Ok(absence)
    }

    /// Loads an absence and applies justification fields without persisting.
    async fn prepare_justification(
        &self,
        caller: &AuthUser,
        id: u64,
        justification: Justification,
    ) -> Result<Absence, AbsenceError> {
        let text = justification.text.trim();
        if text.is_empty() {
            return Err(AbsenceError::bad_request("Justification text is required"));
        }

        let mut absence = self.load(id).await?;
        caller.require_self_or_hr(absence.user_id)?;

        if absence.status == AbsenceStatus::Validated {
            return Err(AbsenceError::Conflict(format!(
                "Absence {id} is already validated"
            )));
        }

        let start = justification.start_date.unwrap_or(absence.start_date);
        let end = justification.end_date.unwrap_or(absence.end_date);
        check_range(start, end)?;

        absence.start_date = start;
        absence.end_date = end;
        if let Some(is_recurring) = justification.is_recurring {
            absence.is_recurring = is_recurring;
        }
        absence.justification_text = Some(text.to_string());
        absence.status = AbsenceStatus::Justified;
        Ok(absence)
    }

    pub async fn update_justification(
        &self,
        caller: &AuthUser,
        id: u64,
        justification: Justification,
    ) -> Result<Absence, AbsenceError> {
        let absence = self.prepare_justification(caller, id, justification).await?;
        let saved = self.save(&absence).await?;
        info!(absence_id = id, "Absence justified");
        Ok(saved)
    }

    /// Justifies an absence and stores the attached file, if one was sent.
    ///
    /// Without a new file the previously stored one is kept.
    pub async fn justify_with_file(
        &self,
        caller: &AuthUser,
        id: u64,
        justification: Justification,
        file: Option<UploadedFile>,
    ) -> Result<Absence, AbsenceError> {
        let mut absence = self.prepare_justification(caller, id, justification).await?;

        let previous = absence.justification_file.clone();
        let stored = match file {
            Some(file) => Some(self.uploads.store(&file.filename, &file.bytes).await?),
            None => None,
        };
        if let Some(path) = &stored {
            absence.justification_file = Some(path.clone());
        }

        let saved = match self.save(&absence).await {
            Ok(saved) => saved,
            Err(e) => {
                if let Some(path) = &stored {
                    if let Err(rm) = self.uploads.remove(path).await {
                        warn!(error = %rm, path = %path, "Failed to remove orphaned upload");
                    }
                }
                return Err(e);
            }
        };

        if let (Some(_), Some(old)) = (&stored, previous) {
            if let Err(e) = self.uploads.remove(&old).await {
                warn!(error = %e, path = %old, "Failed to remove replaced justification file");
            }
        }

        info!(absence_id = id, file = ?saved.justification_file, "Absence justified with file");
        Ok(saved)
    }

    pub async fn justification_file(
        &self,
        caller: &AuthUser,
        id: u64,
    ) -> Result<JustificationFile, AbsenceError> {
        let absence = self.get_absence_by_id(caller, id).await?;
        let path = absence.justification_file.ok_or_else(|| {
            AbsenceError::NotFound(format!("Absence {id} has no justification file"))
        })?;

        let bytes = match self.uploads.read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(absence_id = id, path = %path, "Justification file missing on disk");
                return Err(AbsenceError::NotFound(format!(
                    "Justification file of absence {id} is missing"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(JustificationFile {
            filename: original_filename(&path),
            bytes,
        })
    }

    pub async fn validate_absence(&self, id: u64) -> Result<Absence, AbsenceError> {
        let mut absence = self.load(id).await?;

        if absence.status != AbsenceStatus::Justified {
            return Err(AbsenceError::Conflict(format!(
                "Absence {id} cannot be validated from status {}",
                absence.status.as_str()
            )));
        }

        absence.status = AbsenceStatus::Validated;
        let saved = self.save(&absence).await?;
        info!(absence_id = id, "Absence validated");
        Ok(saved)
    }

    pub async fn delete_absence(&self, id: u64) -> Result<(), AbsenceError> {
        let absence = self.load(id).await?;

        if !self.repo.delete(id).await? {
            return Err(AbsenceError::not_found(id));
        }

        if let Some(path) = absence.justification_file {
            if let Err(e) = self.uploads.remove(&path).await {
                warn!(error = %e, path = %path, "Failed to remove justification file");
            }
        }

        info!(absence_id = id, "Absence deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use crate::repository::memory::InMemoryAbsenceRepository;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn caller(user_id: u64, role: Role) -> AuthUser {
        AuthUser {
            user_id,
            username: format!("user{user_id}"),
            role,
        }
    }

    fn service(dir: &tempfile::TempDir) -> (AbsenceService, Arc<InMemoryAbsenceRepository>) {
        let repo = Arc::new(InMemoryAbsenceRepository::new());
        let svc = AbsenceService::new(repo.clone(), UploadStore::new(dir.path().join("uploads")));
        (svc, repo)
    }

    fn request(user_id: u64, start: &str, end: Option<&str>) -> CreateAbsence {
        CreateAbsence {
            user_id,
            start_date: date(start),
            end_date: end.map(date),
            is_recurring: false,
        }
    }

    fn justification(text: &str) -> Justification {
        Justification {
            text: text.to_string(),
            start_date: None,
            end_date: None,
            is_recurring: None,
        }
    }

    #[actix_web::test]
    async fn create_defaults_end_date_and_starts_pending() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);

        let absence = svc
            .create_absence(&caller(3, Role::Employee), request(3, "2026-03-02", None))
            .await
            .unwrap();

        assert_eq!(absence.end_date, date("2026-03-02"));
        assert_eq!(absence.status, AbsenceStatus::Pending);
    }

    #[actix_web::test]
    async fn create_rejects_inverted_range_and_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let hr = caller(1, Role::Hr);

        let err = svc
            .create_absence(&hr, request(3, "2026-03-05", Some("2026-03-01")))
            .await
            .unwrap_err();
        assert!(matches!(err, AbsenceError::BadRequest(_)));

        svc.create_absence(&hr, request(3, "2026-03-01", Some("2026-03-05")))
            .await
            .unwrap();
        let err = svc
            .create_absence(&hr, request(3, "2026-03-05", Some("2026-03-06")))
            .await
            .unwrap_err();
        assert!(matches!(err, AbsenceError::Conflict(_)));

        // other users are unaffected
        svc.create_absence(&hr, request(4, "2026-03-05", None))
            .await
            .unwrap();
    }

    #[actix_web::test]
    async fn employee_cannot_create_for_someone_else() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, repo) = service(&dir);

        let err = svc
            .create_absence(&caller(3, Role::Employee), request(4, "2026-03-02", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AbsenceError::Forbidden(_)));
        assert_eq!(repo.len(), 0);
    }

    #[actix_web::test]
    async fn today_absence_covers_today_and_is_listed() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);

        let created = svc
            .create_today_absence(&caller(1, Role::Admin), 8)
            .await
            .unwrap();
        assert_eq!(created.start_date, today());

        let err = svc
            .create_today_absence(&caller(1, Role::Admin), 8)
            .await
            .unwrap_err();
        assert!(matches!(err, AbsenceError::Conflict(_)));

        let listed = svc.get_today_absences().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
    }

    #[actix_web::test]
    async fn justify_then_validate_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let owner = caller(3, Role::Employee);
        let hr = caller(1, Role::Hr);

        let absence = svc
            .create_absence(&owner, request(3, "2026-03-02", None))
            .await
            .unwrap();

        let err = svc.validate_absence(absence.id).await.unwrap_err();
        assert!(matches!(err, AbsenceError::Conflict(_)));

        let justified = svc
            .update_justification(&owner, absence.id, justification("  Flu  "))
            .await
            .unwrap();
        assert_eq!(justified.status, AbsenceStatus::Justified);
        assert_eq!(justified.justification_text.as_deref(), Some("Flu"));

        let validated = svc.validate_absence(absence.id).await.unwrap();
        assert_eq!(validated.status, AbsenceStatus::Validated);

        let err = svc
            .update_justification(&hr, absence.id, justification("Again"))
            .await
            .unwrap_err();
        assert!(matches!(err, AbsenceError::Conflict(_)));
    }

    #[actix_web::test]
    async fn justification_requires_text_and_existing_absence() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let hr = caller(1, Role::Hr);

        let err = svc
            .update_justification(&hr, 99, justification("Flu"))
            .await
            .unwrap_err();
        assert!(matches!(err, AbsenceError::NotFound(_)));

        let absence = svc
            .create_absence(&hr, request(3, "2026-03-02", None))
            .await
            .unwrap();
        let err = svc
            .update_justification(&hr, absence.id, justification("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, AbsenceError::BadRequest(_)));
    }

    #[actix_web::test]
    async fn justification_can_move_dates_but_not_onto_another_absence() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let hr = caller(1, Role::Hr);

        let first = svc
            .create_absence(&hr, request(3, "2026-03-02", None))
            .await
            .unwrap();
        svc.create_absence(&hr, request(3, "2026-03-10", None))
            .await
            .unwrap();

        let mut moved = justification("Trip");
        moved.end_date = Some(date("2026-03-04"));
        moved.is_recurring = Some(true);
        let updated = svc.update_justification(&hr, first.id, moved).await.unwrap();
        assert_eq!(updated.end_date, date("2026-03-04"));
        assert!(updated.is_recurring);

        let mut clash = justification("Trip");
        clash.end_date = Some(date("2026-03-10"));
        let err = svc.update_justification(&hr, first.id, clash).await.unwrap_err();
        assert!(matches!(err, AbsenceError::Conflict(_)));
    }

    #[actix_web::test]
    async fn file_justification_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let owner = caller(3, Role::Employee);

        let absence = svc
            .create_absence(&owner, request(3, "2026-03-02", None))
            .await
            .unwrap();

        let first = svc
            .justify_with_file(
                &owner,
                absence.id,
                justification("Doctor"),
                Some(UploadedFile {
                    filename: "a.pdf".into(),
                    bytes: b"first".to_vec(),
                }),
            )
            .await
            .unwrap();
        let first_path = first.justification_file.clone().unwrap();

        // no new file keeps the stored one
        let kept = svc
            .justify_with_file(&owner, absence.id, justification("Doctor, again"), None)
            .await
            .unwrap();
        assert_eq!(kept.justification_file.as_deref(), Some(first_path.as_str()));

        let second = svc
            .justify_with_file(
                &owner,
                absence.id,
                justification("Doctor"),
                Some(UploadedFile {
                    filename: "b.pdf".into(),
                    bytes: b"second".to_vec(),
                }),
            )
            .await
            .unwrap();
        assert!(second.justification_file.unwrap().ends_with("_b.pdf"));
        assert!(!std::path::Path::new(&first_path).exists());

        let file = svc.justification_file(&owner, absence.id).await.unwrap();
        assert_eq!(file.filename, "b.pdf");
        assert_eq!(file.bytes, b"second");
    }

    #[actix_web::test]
    async fn create_for_unknown_user_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(
            InMemoryAbsenceRepository::new()
                .with_user(3, "jdoe")
                .known_users_only(),
        );
        let svc = AbsenceService::new(repo.clone(), UploadStore::new(dir.path().join("uploads")));

        let err = svc
            .create_absence(&caller(1, Role::Hr), request(42, "2026-03-02", None))
            .await
            .unwrap_err();
        assert!(matches!(&err, AbsenceError::NotFound(msg) if msg == "User 42 not found"));
        assert_eq!(repo.len(), 0);
    }

    #[actix_web::test]
    async fn clashing_file_justification_discards_the_upload() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let owner = caller(3, Role::Employee);

        let first = svc
            .create_absence(&owner, request(3, "2026-03-02", None))
            .await
            .unwrap();
        svc.create_absence(&owner, request(3, "2026-03-05", None))
            .await
            .unwrap();

        let mut clash = justification("Trip");
        clash.end_date = Some(date("2026-03-05"));
        let err = svc
            .justify_with_file(
                &owner,
                first.id,
                clash,
                Some(UploadedFile {
                    filename: "ticket.pdf".into(),
                    bytes: b"ticket".to_vec(),
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AbsenceError::Conflict(_)));

        let leftovers = std::fs::read_dir(dir.path().join("uploads"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);

        let unchanged = svc.get_absence_by_id(&owner, first.id).await.unwrap();
        assert_eq!(unchanged.status, AbsenceStatus::Pending);
        assert!(unchanged.justification_file.is_none());
    }

    #[actix_web::test]
    async fn delete_removes_record_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, repo) = service(&dir);
        let hr = caller(1, Role::Hr);

        let absence = svc
            .create_absence(&hr, request(3, "2026-03-02", None))
            .await
            .unwrap();
        let justified = svc
            .justify_with_file(
                &hr,
                absence.id,
                justification("Doctor"),
                Some(UploadedFile {
                    filename: "a.pdf".into(),
                    bytes: b"x".to_vec(),
                }),
            )
            .await
            .unwrap();
        let path = justified.justification_file.unwrap();

        svc.delete_absence(absence.id).await.unwrap();
        assert_eq!(repo.len(), 0);
        assert!(!std::path::Path::new(&path).exists());

        let err = svc.delete_absence(absence.id).await.unwrap_err();
        assert!(matches!(err, AbsenceError::NotFound(_)));
    }

    #[actix_web::test]
    async fn my_absences_only_lists_own_pending() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let me = caller(3, Role::Employee);
        let hr = caller(1, Role::Hr);

        let pending = svc
            .create_absence(&hr, request(3, "2026-03-02", None))
            .await
            .unwrap();
        let justified = svc
            .create_absence(&hr, request(3, "2026-03-04", None))
            .await
            .unwrap();
        svc.update_justification(&me, justified.id, justification("Flu"))
            .await
            .unwrap();
        svc.create_absence(&hr, request(4, "2026-03-02", None))
            .await
            .unwrap();

        let page = svc
            .get_my_absences(&me, PageRequest::new(None, None))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].id, pending.id);
    }

    #[test]
    fn page_metadata_rounds_total_pages_up() {
        let page = AbsencePage::new(Vec::new(), 21, PageRequest::new(Some(2), Some(10)));
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);

        let empty = AbsencePage::new(Vec::new(), 0, PageRequest::new(None, None));
        assert_eq!(empty.total_pages, 0);
    }
}
