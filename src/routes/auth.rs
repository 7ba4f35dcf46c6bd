use crate::{
    auth::{
        hash_password, verify_password, AuthResponse, AuthenticatedUser, LoginRequest,
        RegisterRequest, TokenService,
    },
    db::Database,
    error::AppError,
    models::{user::USER_COLUMNS, ChangePasswordRequest, ProfileUpdate, User},
    response::ApiResponse,
};
use actix_web::{get, post, put, web, HttpResponse, Responder};
use sqlx::FromRow;
use validator::Validate;

/// A user row together with its stored password hash. Never serialized.
#[derive(FromRow)]
struct UserCredentials {
    #[sqlx(flatten)]
    user: User,
    password_hash: String,
}

async fn find_credentials_by_email(
    db: &Database,
    email: &str,
) -> Result<Option<UserCredentials>, AppError> {
    let sql = format!(
        "SELECT {}, password_hash FROM users WHERE email = $1",
        USER_COLUMNS
    );
    let credentials = sqlx::query_as::<_, UserCredentials>(&sql)
        .bind(email)
        .fetch_optional(db.pool())
        .await?;
    Ok(credentials)
}

async fn find_user(db: &Database, user_id: i32) -> Result<User, AppError> {
    let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Register a new user
///
/// Creates a new user account and returns an authentication token.
/// A taken username or email is reported as a 400 naming the field.
#[post("/register")]
pub async fn register(
    db: web::Data<Database>,
    tokens: web::Data<TokenService>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;
    let input = register_data.into_inner();

    let password_hash = hash_password(&input.password)?;
    let full_name = input
        .full_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    let sql = format!(
        "INSERT INTO users (username, email, password_hash, full_name) \
         VALUES ($1, $2, $3, $4) RETURNING {}",
        USER_COLUMNS
    );
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(input.username.trim())
        .bind(normalize_email(&input.email))
        .bind(password_hash)
        .bind(full_name)
        .fetch_one(db.pool())
        .await?;

    log::info!("Registered user {} ({})", user.id, user.username);
    let token = tokens.generate(user.id)?;

    Ok(HttpResponse::Created().json(ApiResponse::ok(
        "User registered successfully",
        AuthResponse { token, user },
    )))
}

/// Login user
///
/// Authenticates a user and returns an authentication token.
#[post("/login")]
pub async fn login(
    db: web::Data<Database>,
    tokens: web::Data<TokenService>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    login_data.validate()?;

    let invalid = || AppError::Unauthorized("Invalid email or password".into());
    let credentials = find_credentials_by_email(&db, &normalize_email(&login_data.email))
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&login_data.password, &credentials.password_hash)? {
        return Err(invalid());
    }

    let token = tokens.generate(credentials.user.id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Login successful",
        AuthResponse {
            token,
            user: credentials.user,
        },
    )))
}

#[get("/profile")]
pub async fn get_profile(
    db: web::Data<Database>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let user = find_user(&db, user.id()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Profile retrieved", user)))
}

/// Updates the caller's username, full name or notification preference.
/// Omitted fields are left unchanged.
#[put("/profile")]
pub async fn update_profile(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    profile: web::Json<ProfileUpdate>,
) -> Result<impl Responder, AppError> {
    profile.validate()?;
    let profile = profile.into_inner();

    let sql = format!(
        "UPDATE users SET \
            username = COALESCE($2, username), \
            full_name = COALESCE($3, full_name), \
            email_notifications = COALESCE($4, email_notifications), \
            updated_at = NOW() \
         WHERE id = $1 RETURNING {}",
        USER_COLUMNS
    );
    let updated = sqlx::query_as::<_, User>(&sql)
        .bind(user.id())
        .bind(profile.username.map(|u| u.trim().to_string()))
        .bind(profile.full_name.map(|n| n.trim().to_string()))
        .bind(profile.email_notifications)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok("Profile updated", updated)))
}

#[post("/change-password")]
pub async fn change_password(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    request: web::Json<ChangePasswordRequest>,
) -> Result<impl Responder, AppError> {
    request.validate()?;

    let stored: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
        .bind(user.id())
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if !verify_password(&request.current_password, &stored)? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }
    if request.current_password == request.new_password {
        return Err(AppError::invalid(
            "New password must be different from the current password",
        ));
    }

    let new_hash = hash_password(&request.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(user.id())
        .bind(new_hash)
        .execute(db.pool())
        .await?;

    log::info!("User {} changed their password", user.id());
    Ok(HttpResponse::Ok().json(ApiResponse::message("Password changed successfully")))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(register)
        .service(login)
        .service(get_profile)
        .service(update_profile)
        .service(change_password);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
    }
}
