use crate::{
    auth::{jwt::generate_access_token, password::verify_password},
    config::Config,
    error::AbsenceError,
    models::{LoginReqDto, LoginResponse, UserSql},
};
use actix_web::{HttpResponse, web};
use sqlx::MySqlPool;
use tracing::{debug, info, instrument};

/// Exchange username and password for a bearer access token
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Username or password missing"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many login attempts")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AbsenceError> {
    info!("Login request received");

    // 1️⃣ Basic validation
    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return Err(AbsenceError::bad_request("Username or password required"));
    }

    // 2️⃣ Fetch user
    let db_user = sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, username, password, role_id
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(user.username.trim())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| {
        info!("Invalid credentials: user not found");
        invalid_credentials()
    })?;
    debug!(user_id = db_user.id, "User found");

    // 3️⃣ Verify password
    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(invalid_credentials());
    }

    // 4️⃣ Generate access token
    let access_token = generate_access_token(
        db_user.id,
        db_user.username,
        db_user.role_id,
        &config.jwt_secret,
        config.access_token_ttl,
    )?;

    info!("Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: config.access_token_ttl,
    }))
}

fn invalid_credentials() -> AbsenceError {
    AbsenceError::Unauthorized("Invalid credentials".to_string())
}
