use crate::{
    auth::{
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    models::{LoginReqDto, RegisterReq, TokenType, UserSql},
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

#[derive(Serialize, Deserialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
}

async fn linked_employee_id(pool: &MySqlPool, user_id: u64) -> Option<u64> {
    sqlx::query_scalar::<_, u64>("SELECT id FROM employees WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()
}

/// Self-registration: creates a `user` account and links it to the employee
/// record carrying the given NIK, creating one when none exists.
pub async fn register(payload: web::Json<RegisterReq>, pool: web::Data<MySqlPool>) -> impl Responder {
    let email = payload.email.trim().to_lowercase();
    let nik = payload.nik.trim();

    if email.is_empty() || payload.password.is_empty() || nik.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "message": "Email, password and NIK must not be empty"
        }));
    }

    let hashed = hash_password(&payload.password);
    let inserted = sqlx::query(
        r#"INSERT INTO users (fullname, email, password, role) VALUES (?, ?, ?, 'user')"#,
    )
    .bind(&payload.fullname)
    .bind(&email)
    .bind(&hashed)
    .execute(pool.get_ref())
    .await;

    let user_id = match inserted {
        Ok(res) => res.last_insert_id(),
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().as_deref() == Some("23000") {
                    return HttpResponse::Conflict().json(json!({
                        "message": "Email already registered"
                    }));
                }
            }
            error!(error = %e, "Failed to register user");
            return HttpResponse::InternalServerError().json(json!({
                "message": "Failed to register user"
            }));
        }
    };

    // Link the account to its employee record, or create a fresh one.
    let linked = sqlx::query(
        "UPDATE employees SET user_id = ? WHERE nik = ? AND user_id IS NULL",
    )
    .bind(user_id)
    .bind(nik)
    .execute(pool.get_ref())
    .await;

    match linked {
        Ok(res) if res.rows_affected() == 0 => {
            let create = sqlx::query(
                "INSERT INTO employees (user_id, nik, name, status) VALUES (?, ?, ?, 'active')",
            )
            .bind(user_id)
            .bind(nik)
            .bind(&payload.fullname)
            .execute(pool.get_ref())
            .await;
            if let Err(e) = create {
                // NIK taken by an employee already linked to another account.
                error!(error = %e, nik, "Failed to create employee for new account");
                return HttpResponse::Conflict().json(json!({
                    "message": "NIK already linked to another account"
                }));
            }
        }
        Ok(_) => {}
        Err(e) => {
            error!(error = %e, "Failed to link employee record");
            return HttpResponse::InternalServerError().json(json!({
                "message": "Failed to register user"
            }));
        }
    }

    HttpResponse::Created().json(json!({
        "message": "User registered successfully"
    }))
}

#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    info!("Login request received");

    if user.email.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return HttpResponse::BadRequest().body("Email or password required");
    }

    debug!("Fetching user from database");

    let db_user = match sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, fullname, email, password, role
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(user.email.trim().to_lowercase())
    .fetch_optional(pool.get_ref())
    .await
    {
        Ok(Some(u)) => {
            debug!(user_id = u.id, "User found");
            u
        }
        Ok(None) => {
            info!("Invalid credentials: user not found");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if !verify_password(&user.password, &db_user.password) {
        info!("Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    let employee_id = linked_employee_id(pool.get_ref(), db_user.id).await;

    let access_token = generate_access_token(
        db_user.id,
        db_user.email.clone(),
        db_user.role.clone(),
        employee_id,
        &config.jwt_secret,
        config.access_token_ttl,
    );

    let refresh_token = generate_refresh_token(
        db_user.id,
        db_user.email.clone(),
        db_user.role.clone(),
        employee_id,
        &config.jwt_secret,
        config.refresh_token_ttl,
    );

    info!("Login successful");

    HttpResponse::Ok().json(LoginResponse {
        access_token,
        refresh_token,
    })
}

pub async fn refresh_token(req: HttpRequest, config: web::Data<Config>) -> impl Responder {
    let header = match req.headers().get("Authorization") {
        Some(h) => h.to_str().unwrap_or(""),
        None => return HttpResponse::Unauthorized().body("No token"),
    };

    let token = match header.strip_prefix("Bearer ") {
        Some(t) => t,
        None => return HttpResponse::Unauthorized().body("Invalid token"),
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return HttpResponse::Unauthorized().finish(),
    };

    if claims.token_type != TokenType::Refresh {
        return HttpResponse::Unauthorized().finish();
    }

    let access_token = generate_access_token(
        claims.user_id,
        claims.sub.clone(),
        claims.role.clone(),
        claims.employee_id,
        &config.jwt_secret,
        config.access_token_ttl,
    );

    let new_refresh_token = generate_refresh_token(
        claims.user_id,
        claims.sub,
        claims.role,
        claims.employee_id,
        &config.jwt_secret,
        config.refresh_token_ttl,
    );

    HttpResponse::Ok().json(json!({
        "access_token": access_token,
        "refresh_token": new_refresh_token
    }))
}
