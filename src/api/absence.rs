use crate::auth::auth::AuthUser;
use crate::error::AbsenceError;
use crate::model::absence::AbsenceStatus;
use crate::repository::{AbsenceFilter, PageRequest};
use crate::service::absence_service::{AbsenceService, CreateAbsence, Justification, UploadedFile};
use crate::config::Config;
use actix_multipart::Multipart;
use actix_web::{HttpResponse, http::header, web};
use chrono::NaiveDate;
use futures_util::TryStreamExt;
use serde::Deserialize;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

// Plain form fields are small; anything larger is a malformed request.
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceRequest {
    #[schema(example = 1000)]
    pub user_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    /// Defaults to `startDate`
    #[schema(example = "2026-01-06", format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_recurring: bool,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JustificationUpdate {
    #[schema(example = "Medical appointment")]
    pub justification_text: String,
    #[schema(example = "2026-01-05", format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2026-01-06", format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    pub is_recurring: Option<bool>,
}

/// Multipart form accepted by `justify-with-files` (documentation only)
#[derive(Deserialize, ToSchema)]
#[allow(dead_code)]
#[serde(rename_all = "camelCase")]
pub struct JustificationUpload {
    #[schema(example = "Medical appointment")]
    description: String,
    #[schema(example = "2026-01-05", format = "date", value_type = Option<String>)]
    start_date: Option<String>,
    #[schema(example = "2026-01-06", format = "date", value_type = Option<String>)]
    end_date: Option<String>,
    #[schema(example = false)]
    is_recurring: Option<bool>,
    /// One or more files; only the first non-empty one is stored
    #[schema(value_type = Vec<String>)]
    files: Vec<Vec<u8>>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AbsenceListQuery {
    /// Page number (starts with 1)
    #[param(example = 1)]
    pub page: Option<u32>,
    /// Items per page (max 100)
    #[param(example = 10)]
    pub limit: Option<u32>,
    /// Substring of the justification text or username
    pub search: Option<String>,
    /// PENDING, JUSTIFIED or VALIDATED
    #[param(example = "PENDING")]
    pub status: Option<String>,
    /// Only absences covering this date
    #[param(value_type = Option<String>, example = "2026-01-05")]
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    #[param(example = 1)]
    pub page: Option<u32>,
    #[param(example = 10)]
    pub limit: Option<u32>,
}

fn parse_status(raw: Option<&str>) -> Result<Option<AbsenceStatus>, AbsenceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s.parse::<AbsenceStatus>().map(Some).map_err(|_| {
            AbsenceError::bad_request(format!(
                "Invalid status '{s}'. Allowed: PENDING, JUSTIFIED, VALIDATED"
            ))
        }),
    }
}

/* =========================
Create absence
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/absences",
    request_body = AbsenceRequest,
    responses(
        (status = 201, description = "Absence created", body = crate::model::absence::Absence),
        (status = 400, description = "Invalid dates"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Overlapping absence", body = Object, example = json!({
            "message": "User 1000 already has an absence between 2026-01-05 and 2026-01-06"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Absence"
)]
pub async fn create_absence(
    auth: AuthUser,
    service: web::Data<AbsenceService>,
    payload: web::Json<AbsenceRequest>,
) -> Result<HttpResponse, AbsenceError> {
    let payload = payload.into_inner();
    info!(user_id = payload.user_id, "REST request to create absence");

    let created = service
        .create_absence(
            &auth,
            CreateAbsence {
                user_id: payload.user_id,
                start_date: payload.start_date,
                end_date: payload.end_date,
                is_recurring: payload.is_recurring,
            },
        )
        .await?;

    Ok(HttpResponse::Created().json(created))
}

/* =========================
Create absence for today
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/absences/today/{user_id}",
    params(
        ("user_id" = u64, Path, description = "User the absence is recorded for")
    ),
    responses(
        (status = 201, description = "Absence created for today", body = crate::model::absence::Absence),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "User already absent today")
    ),
    security(("bearer_auth" = [])),
    tag = "Absence"
)]
pub async fn create_today_absence(
    auth: AuthUser,
    service: web::Data<AbsenceService>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AbsenceError> {
    let user_id = path.into_inner();
    info!(user_id, "REST request to create today's absence");

    let created = service.create_today_absence(&auth, user_id).await?;
    Ok(HttpResponse::Created().json(created))
}

/* =========================
List absences (HR/Admin)
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/absences",
    params(AbsenceListQuery),
    responses(
        (status = 200, description = "Paginated absence list", body = crate::service::absence_service::AbsencePage),
        (status = 400, description = "Invalid filter"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Absence"
)]
pub async fn list_absences(
    auth: AuthUser,
    service: web::Data<AbsenceService>,
    query: web::Query<AbsenceListQuery>,
) -> Result<HttpResponse, AbsenceError> {
    auth.require_hr_or_admin()?;

    let query = query.into_inner();
    debug!(
        page = ?query.page,
        limit = ?query.limit,
        search = ?query.search,
        status = ?query.status,
        date = ?query.date,
        "REST request to get absences"
    );

    let filter = AbsenceFilter {
        user_id: None,
        status: parse_status(query.status.as_deref())?,
        date: query.date,
        search: query.search,
    };

    let page = service
        .get_absences(filter, PageRequest::new(query.page, query.limit))
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/* =========================
Caller's absences needing justification
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/absences/needing-justification",
    params(PageQuery),
    responses(
        (status = 200, description = "Caller's pending absences", body = crate::service::absence_service::AbsencePage),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Absence"
)]
pub async fn needing_justification(
    auth: AuthUser,
    service: web::Data<AbsenceService>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AbsenceError> {
    debug!(user_id = auth.user_id, page = ?query.page, limit = ?query.limit, "REST request to get absences needing justification");

    let page = service
        .get_my_absences(&auth, PageRequest::new(query.page, query.limit))
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/* =========================
Today's absences (HR/Admin)
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/absences/today",
    responses(
        (status = 200, description = "Absences covering today", body = Vec<crate::model::absence::Absence>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Absence"
)]
pub async fn today_absences(
    auth: AuthUser,
    service: web::Data<AbsenceService>,
) -> Result<HttpResponse, AbsenceError> {
    auth.require_hr_or_admin()?;
    debug!("REST request to get today's absences");

    let absences = service.get_today_absences().await?;
    Ok(HttpResponse::Ok().json(absences))
}

/* =========================
Get absence
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/absences/{absence_id}",
    params(
        ("absence_id" = u64, Path, description = "ID of the absence to fetch")
    ),
    responses(
        (status = 200, description = "Absence found", body = crate::model::absence::Absence),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Absence not found", body = Object, example = json!({
            "message": "Absence 1 not found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Absence"
)]
pub async fn get_absence(
    auth: AuthUser,
    service: web::Data<AbsenceService>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AbsenceError> {
    let absence_id = path.into_inner();
    debug!(absence_id, "REST request to get absence");

    let absence = service.get_absence_by_id(&auth, absence_id).await?;
    Ok(HttpResponse::Ok().json(absence))
}

/* =========================
Justify absence
========================= */
#[utoipa::path(
    patch,
    path = "/api/v1/absences/{absence_id}/justify",
    params(
        ("absence_id" = u64, Path, description = "ID of the absence to justify")
    ),
    request_body = JustificationUpdate,
    responses(
        (status = 200, description = "Absence justified", body = crate::model::absence::Absence),
        (status = 400, description = "Missing text or invalid dates"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Absence not found"),
        (status = 409, description = "Absence already validated")
    ),
    security(("bearer_auth" = [])),
    tag = "Absence"
)]
pub async fn justify_absence(
    auth: AuthUser,
    service: web::Data<AbsenceService>,
    path: web::Path<u64>,
    payload: web::Json<JustificationUpdate>,
) -> Result<HttpResponse, AbsenceError> {
    let absence_id = path.into_inner();
    let payload = payload.into_inner();
    info!(absence_id, "REST request to update justification");

    let updated = service
        .update_justification(
            &auth,
            absence_id,
            Justification {
                text: payload.justification_text,
                start_date: payload.start_date,
                end_date: payload.end_date,
                is_recurring: payload.is_recurring,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(updated))
}

/* =========================
Validate absence (HR/Admin)
========================= */
#[utoipa::path(
    patch,
    path = "/api/v1/absences/{absence_id}/validate",
    params(
        ("absence_id" = u64, Path, description = "ID of the absence to validate")
    ),
    responses(
        (status = 200, description = "Absence validated", body = crate::model::absence::Absence),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Absence not found"),
        (status = 409, description = "Absence is not justified")
    ),
    security(("bearer_auth" = [])),
    tag = "Absence"
)]
pub async fn validate_absence(
    auth: AuthUser,
    service: web::Data<AbsenceService>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AbsenceError> {
    auth.require_hr_or_admin()?;

    let absence_id = path.into_inner();
    info!(absence_id, validator = %auth.username, "REST request to validate absence");

    let validated = service.validate_absence(absence_id).await?;
    Ok(HttpResponse::Ok().json(validated))
}

/* =========================
Delete absence (HR/Admin)
========================= */
#[utoipa::path(
    delete,
    path = "/api/v1/absences/{absence_id}",
    params(
        ("absence_id" = u64, Path, description = "ID of the absence to delete")
    ),
    responses(
        (status = 204, description = "Absence deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Absence not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Absence"
)]
pub async fn delete_absence(
    auth: AuthUser,
    service: web::Data<AbsenceService>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AbsenceError> {
    auth.require_hr_or_admin()?;

    let absence_id = path.into_inner();
    info!(absence_id, "REST request to delete absence");

    service.delete_absence(absence_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Fields collected from the multipart justification form.
struct JustificationForm {
    description: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    is_recurring: Option<bool>,
    saw_files: bool,
    file: Option<UploadedFile>,
}

async fn read_field(
    field: &mut actix_multipart::Field,
    limit: usize,
) -> Result<Vec<u8>, AbsenceError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|e| AbsenceError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        if buf.len() + chunk.len() > limit {
            return Err(AbsenceError::PayloadTooLarge(limit));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

async fn read_text_field(field: &mut actix_multipart::Field) -> Result<String, AbsenceError> {
    let bytes = read_field(field, MAX_TEXT_FIELD_BYTES).await?;
    String::from_utf8(bytes).map_err(|_| AbsenceError::bad_request("Form fields must be UTF-8"))
}

fn parse_form_date(name: &str, raw: &str) -> Result<Option<NaiveDate>, AbsenceError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| AbsenceError::bad_request(format!("{name} must be an ISO date (YYYY-MM-DD)")))
}

async fn read_justification_form(
    mut payload: Multipart,
    max_upload_bytes: usize,
) -> Result<JustificationForm, AbsenceError> {
    let mut form = JustificationForm {
        description: None,
        start_date: None,
        end_date: None,
        is_recurring: None,
        saw_files: false,
        file: None,
    };

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| AbsenceError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let filename = disposition.get_filename().map(str::to_string);

        match name.as_str() {
            "description" => form.description = Some(read_text_field(&mut field).await?),
            "startDate" => {
                form.start_date = parse_form_date("startDate", &read_text_field(&mut field).await?)?
            }
            "endDate" => {
                form.end_date = parse_form_date("endDate", &read_text_field(&mut field).await?)?
            }
            "isRecurring" => {
                let raw = read_text_field(&mut field).await?;
                form.is_recurring = match raw.trim() {
                    "" => None,
                    other => Some(other.parse::<bool>().map_err(|_| {
                        AbsenceError::bad_request("isRecurring must be true or false")
                    })?),
                };
            }
            "files" => {
                form.saw_files = true;
                let bytes = read_field(&mut field, max_upload_bytes).await?;
                // only the first non-empty file is kept
                if form.file.is_none() && !bytes.is_empty() {
                    form.file = Some(UploadedFile {
                        filename: filename.unwrap_or_else(|| "file".to_string()),
                        bytes,
                    });
                } else if !bytes.is_empty() {
                    debug!(filename = ?filename, "Ignoring additional justification file");
                }
            }
            other => {
                debug!(field = other, "Ignoring unknown multipart field");
                read_field(&mut field, max_upload_bytes).await?;
            }
        }
    }

    Ok(form)
}

/* =========================
Justify absence with files
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/absences/{absence_id}/justify-with-files",
    params(
        ("absence_id" = u64, Path, description = "ID of the absence to justify")
    ),
    request_body(
        content = JustificationUpload,
        description = "Justification form with attached file",
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 200, description = "Absence justified, file stored", body = crate::model::absence::Absence),
        (status = 400, description = "Missing description or files, invalid dates"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Absence not found"),
        (status = 409, description = "Absence already validated"),
        (status = 413, description = "File too large"),
        (status = 500, description = "File could not be stored")
    ),
    security(("bearer_auth" = [])),
    tag = "Absence"
)]
pub async fn justify_with_files(
    auth: AuthUser,
    service: web::Data<AbsenceService>,
    config: web::Data<Config>,
    path: web::Path<u64>,
    payload: Multipart,
) -> Result<HttpResponse, AbsenceError> {
    let absence_id = path.into_inner();
    info!(absence_id, "REST request to update justification with files");

    // unknown or foreign absences fail before the upload is read
    service.get_absence_by_id(&auth, absence_id).await?;

    let form = read_justification_form(payload, config.max_upload_bytes).await?;

    let description = form
        .description
        .ok_or_else(|| AbsenceError::bad_request("description is required"))?;
    if !form.saw_files {
        return Err(AbsenceError::bad_request("At least one files part is required"));
    }

    let updated = service
        .justify_with_file(
            &auth,
            absence_id,
            Justification {
                text: description,
                start_date: form.start_date,
                end_date: form.end_date,
                is_recurring: form.is_recurring,
            },
            form.file,
        )
        .await?;
    Ok(HttpResponse::Ok().json(updated))
}

/* =========================
Download justification file
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/absences/{absence_id}/justification-file",
    params(
        ("absence_id" = u64, Path, description = "ID of the absence")
    ),
    responses(
        (status = 200, description = "Stored justification file", content_type = "application/octet-stream"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Absence or file not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Absence"
)]
pub async fn download_justification_file(
    auth: AuthUser,
    service: web::Data<AbsenceService>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AbsenceError> {
    let absence_id = path.into_inner();
    debug!(absence_id, "REST request to download justification file");

    let file = service.justification_file(&auth, absence_id).await?;

    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .insert_header(header::ContentDisposition::attachment(file.filename))
        .body(file.bytes))
}
