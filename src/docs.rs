use crate::api::absence::{AbsenceRequest, JustificationUpdate, JustificationUpload};
use crate::model::absence::{Absence, AbsenceStatus};
use crate::models::{LoginReqDto, LoginResponse};
use crate::service::absence_service::AbsencePage;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Absence Management API",
        version = "1.0.0",
        description = r#"
## Absence Management

Records employee **absences** and drives their justification and validation workflow.

### 🔹 Key Features
- **Absences**
  - Create an absence for a date range, or for today in one call
  - Paginated listing filtered by status, date and free text
  - Each employee sees the absences still waiting for their justification
- **Justification**
  - Plain text, or a multipart form with an attached document
- **Validation**
  - HR or Admin approve justified absences

### 🔐 Security
Every absence endpoint requires a **JWT Bearer** token obtained from `/auth/login`.
Employees act on their own absences; **Admin** and **HR** act on everyone's.

### 📦 Response Format
- JSON responses with camelCase fields
- Errors are `{"message": "..."}`

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::login,

        crate::api::absence::create_absence,
        crate::api::absence::create_today_absence,
        crate::api::absence::list_absences,
        crate::api::absence::needing_justification,
        crate::api::absence::today_absences,
        crate::api::absence::get_absence,
        crate::api::absence::justify_absence,
        crate::api::absence::validate_absence,
        crate::api::absence::delete_absence,
        crate::api::absence::justify_with_files,
        crate::api::absence::download_justification_file
    ),
    components(
        schemas(
            Absence,
            AbsenceStatus,
            AbsencePage,
            AbsenceRequest,
            JustificationUpdate,
            JustificationUpload,
            LoginReqDto,
            LoginResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Absence", description = "Absence management APIs"),
        (name = "Auth", description = "Authentication APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
