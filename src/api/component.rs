use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::core::error::EngineError;
use crate::core::settlement::parse_period;
use crate::model::component::{CalcType, CompensationComponent, ComponentType};

#[derive(Deserialize, ToSchema)]
pub struct CreateComponentReq {
    #[schema(example = "MEAL")]
    pub code: String,
    #[schema(example = "Meal allowance")]
    pub name: String,
    #[schema(example = "allowance")]
    pub comp_type: ComponentType,
    #[schema(example = "fixed")]
    pub calc_type: CalcType,
    #[schema(example = 500000.0)]
    pub default_value: f64,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateComponentReq {
    pub name: String,
    pub comp_type: ComponentType,
    pub calc_type: CalcType,
    pub default_value: f64,
}

#[derive(Deserialize, ToSchema)]
pub struct AssignComponentReq {
    #[schema(example = 1)]
    pub component_id: u64,

    /// Overrides the catalog default when set
    #[schema(example = 600000.0, nullable = true)]
    pub value: Option<f64>,

    /// "YYYY-MM"; the assignment applies from this period onward
    #[schema(example = "2025-01", nullable = true)]
    pub start_period: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AssignmentListResponse {
    pub data: Vec<AssignmentRow>,
}

#[derive(Serialize, sqlx::FromRow, ToSchema)]
pub struct AssignmentRow {
    pub id: u64,
    pub component_id: u64,
    #[schema(example = "MEAL")]
    pub code: String,
    #[schema(example = "Meal allowance")]
    pub name: String,
    pub comp_type: String,
    pub calc_type: String,
    pub default_value: f64,
    pub value: Option<f64>,
    pub start_period: Option<String>,
    pub active: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/component",
    request_body = CreateComponentReq,
    responses(
        (status = 201, description = "Component created"),
        (status = 400, description = "Code already in use")
    ),
    security(("bearer_auth" = [])),
    tag = "Component"
)]
pub async fn create_component(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateComponentReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let code = payload.code.trim().to_uppercase();
    if code.is_empty() || payload.name.trim().is_empty() {
        return Err(EngineError::Validation("Code and name are required".into()).into());
    }

    let res = sqlx::query(
        "INSERT INTO compensation_components (code, name, comp_type, calc_type, default_value) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&code)
    .bind(payload.name.trim())
    .bind(payload.comp_type.to_string())
    .bind(payload.calc_type.to_string())
    .bind(payload.default_value)
    .execute(pool.get_ref())
    .await
    .map_err(|e| EngineError::from_insert(e, "Component code already in use"))?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Component created",
        "id": res.last_insert_id()
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/component",
    responses((status = 200, body = Vec<CompensationComponent>)),
    security(("bearer_auth" = [])),
    tag = "Component"
)]
pub async fn list_components(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let components = sqlx::query_as::<_, CompensationComponent>(
        "SELECT * FROM compensation_components ORDER BY code",
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(EngineError::Database)?;

    Ok(HttpResponse::Ok().json(components))
}

#[utoipa::path(
    put,
    path = "/api/v1/component/{component_id}",
    request_body = UpdateComponentReq,
    params(("component_id", description = "Component ID")),
    responses((status = 200, description = "Component updated"), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Component"
)]
pub async fn update_component(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateComponentReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let component_id = path.into_inner();
    let result = sqlx::query(
        "UPDATE compensation_components \
         SET name = ?, comp_type = ?, calc_type = ?, default_value = ? WHERE id = ?",
    )
    .bind(payload.name.trim())
    .bind(payload.comp_type.to_string())
    .bind(payload.calc_type.to_string())
    .bind(payload.default_value)
    .bind(component_id)
    .execute(pool.get_ref())
    .await
    .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("component", component_id).into());
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Component updated" })))
}

#[utoipa::path(
    put,
    path = "/api/v1/component/{component_id}/toggle",
    params(("component_id", description = "Component ID")),
    responses((status = 200, description = "Active flag flipped"), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Component"
)]
pub async fn toggle_component(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let component_id = path.into_inner();
    let result = sqlx::query("UPDATE compensation_components SET active = NOT active WHERE id = ?")
        .bind(component_id)
        .execute(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("component", component_id).into());
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Component toggled" })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/component/{component_id}",
    params(("component_id", description = "Component ID")),
    responses(
        (status = 200, description = "Component deleted"),
        (status = 409, description = "Component still assigned to employees")
    ),
    security(("bearer_auth" = [])),
    tag = "Component"
)]
pub async fn delete_component(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let component_id = path.into_inner();

    let assigned: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM employee_compensations WHERE component_id = ?")
            .bind(component_id)
            .fetch_one(pool.get_ref())
            .await
            .map_err(EngineError::Database)?;
    if assigned > 0 {
        return Err(EngineError::StateConflict(
            "Component is assigned to employees; deactivate it instead".into(),
        )
        .into());
    }

    let result = sqlx::query("DELETE FROM compensation_components WHERE id = ?")
        .bind(component_id)
        .execute(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("component", component_id).into());
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Component deleted" })))
}

/* =========================
Employee assignments
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/employees/{employee_id}/compensation",
    request_body = AssignComponentReq,
    params(("employee_id", description = "Employee ID")),
    responses(
        (status = 201, description = "Component assigned"),
        (status = 400, description = "Duplicate assignment for that start period"),
        (status = 404)
    ),
    security(("bearer_auth" = [])),
    tag = "Component"
)]
pub async fn assign_component(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<AssignComponentReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let employee_id = path.into_inner();

    if let Some(period) = payload.start_period.as_deref().filter(|p| !p.is_empty()) {
        if parse_period(period).is_none() {
            return Err(EngineError::Validation(
                "start_period must look like YYYY-MM".into(),
            )
            .into());
        }
    }

    let component: Option<u64> =
        sqlx::query_scalar("SELECT id FROM compensation_components WHERE id = ? AND active = 1")
            .bind(payload.component_id)
            .fetch_optional(pool.get_ref())
            .await
            .map_err(EngineError::Database)?;
    if component.is_none() {
        return Err(EngineError::not_found("component", payload.component_id).into());
    }

    let res = sqlx::query(
        "INSERT INTO employee_compensations (employee_id, component_id, value, start_period) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(employee_id)
    .bind(payload.component_id)
    .bind(payload.value)
    .bind(payload.start_period.as_deref().filter(|p| !p.is_empty()))
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        EngineError::from_insert(e, "Component already assigned for that start period")
    })?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Component assigned",
        "id": res.last_insert_id()
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/employees/{employee_id}/compensation",
    params(("employee_id", description = "Employee ID")),
    responses((status = 200, body = AssignmentListResponse)),
    security(("bearer_auth" = [])),
    tag = "Component"
)]
pub async fn list_assignments(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let employee_id = path.into_inner();
    let data = sqlx::query_as::<_, AssignmentRow>(
        "SELECT ec.id, ec.component_id, c.code, c.name, c.comp_type, c.calc_type, \
                c.default_value, ec.value, ec.start_period, ec.active \
         FROM employee_compensations ec \
         JOIN compensation_components c ON c.id = ec.component_id \
         WHERE ec.employee_id = ? ORDER BY ec.id",
    )
    .bind(employee_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(EngineError::Database)?;

    Ok(HttpResponse::Ok().json(AssignmentListResponse { data }))
}

#[utoipa::path(
    put,
    path = "/api/v1/compensation/{assignment_id}/toggle",
    params(("assignment_id", description = "Assignment ID")),
    responses((status = 200, description = "Active flag flipped"), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Component"
)]
pub async fn toggle_assignment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let assignment_id = path.into_inner();
    let result = sqlx::query("UPDATE employee_compensations SET active = NOT active WHERE id = ?")
        .bind(assignment_id)
        .execute(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("assignment", assignment_id).into());
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Assignment toggled" })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/compensation/{assignment_id}",
    params(("assignment_id", description = "Assignment ID")),
    responses((status = 200, description = "Assignment removed"), (status = 404)),
    security(("bearer_auth" = [])),
    tag = "Component"
)]
pub async fn delete_assignment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let assignment_id = path.into_inner();
    let result = sqlx::query("DELETE FROM employee_compensations WHERE id = ?")
        .bind(assignment_id)
        .execute(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("assignment", assignment_id).into());
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Assignment removed" })))
}
