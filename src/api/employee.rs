use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::core::error::EngineError;
use crate::model::employee::Employee;
use crate::model::payroll::TAKE_HOME_PAY_SQL;
use crate::utils::db_utils::{build_update_sql, execute_update};

// Columns a PUT may touch; role and user linkage stay out of reach.
const UPDATABLE_COLUMNS: &[&str] = &[
    "name",
    "position",
    "address",
    "phone",
    "bank_account",
    "hire_date",
];

#[derive(Deserialize, ToSchema)]
pub struct CreateEmployeeReq {
    #[schema(example = "Budi Santoso")]
    pub name: String,
    #[schema(example = "Supervisor", nullable = true)]
    pub position: Option<String>,
    #[schema(nullable = true)]
    pub address: Option<String>,
    #[schema(example = "+628123456789", nullable = true)]
    pub phone: Option<String>,
    #[schema(example = "1234567890", nullable = true)]
    pub bank_account: Option<String>,
    #[schema(example = "2024-01-15", format = "date", value_type = String, nullable = true)]
    pub hire_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct EmployeeQuery {
    #[schema(example = 1)]
    pub page: Option<u32>,
    #[schema(example = 10)]
    pub per_page: Option<u32>,
    /// "active" or "inactive"
    #[schema(example = "active")]
    pub status: Option<String>,
    /// Matches name or NIK
    #[schema(example = "Budi")]
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

#[derive(Serialize, sqlx::FromRow, ToSchema)]
pub struct PayrollHistoryRow {
    pub id: u64,
    #[schema(example = "2025-03")]
    pub pay_period: String,
    pub base_salary: f64,
    pub thr: f64,
    pub loan_deduction: f64,
    #[schema(example = "approved")]
    pub status: String,
    pub take_home_pay: f64,
}

/// Next NIK in the `EMP0001` sequence. Runs inside employee creation only;
/// the UNIQUE key on nik catches the rare concurrent race. Ordering by
/// length first keeps the sequence moving once the suffix outgrows four
/// digits (EMP10000 sorts below EMP9999 lexicographically).
async fn next_nik(pool: &MySqlPool) -> Result<String, sqlx::Error> {
    let last: Option<String> = sqlx::query_scalar(
        "SELECT nik FROM employees WHERE nik LIKE 'EMP%' \
         ORDER BY LENGTH(nik) DESC, nik DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(bump_nik(last.as_deref()))
}

fn bump_nik(last: Option<&str>) -> String {
    let next = last
        .and_then(|nik| nik.trim_start_matches("EMP").parse::<u32>().ok())
        .unwrap_or(0)
        + 1;
    format!("EMP{next:04}")
}

#[utoipa::path(
    post,
    path = "/api/v1/employees",
    request_body = CreateEmployeeReq,
    responses(
        (status = 201, description = "Employee created", body = Object, example = json!({
            "message": "Employee created",
            "nik": "EMP0002"
        })),
        (status = 400, description = "Name is required")
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployeeReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    if payload.name.trim().is_empty() {
        return Err(EngineError::Validation("Employee name is required".into()).into());
    }

    let nik = next_nik(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    let res = sqlx::query(
        "INSERT INTO employees (nik, name, position, address, phone, bank_account, hire_date) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&nik)
    .bind(payload.name.trim())
    .bind(payload.position.as_deref())
    .bind(payload.address.as_deref())
    .bind(payload.phone.as_deref())
    .bind(payload.bank_account.as_deref())
    .bind(payload.hire_date)
    .execute(pool.get_ref())
    .await
    .map_err(|e| EngineError::from_insert(e, "NIK already in use, retry"))?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Employee created",
        "id": res.last_insert_id(),
        "nik": nik
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/employees",
    params(EmployeeQuery),
    responses((status = 200, description = "Paginated employee list", body = EmployeeListResponse)),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        conditions.push("status = ?");
        bindings.push(status.to_string());
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        conditions.push("(name LIKE ? OR nik LIKE ?)");
        let like = format!("%{}%", search);
        bindings.push(like.clone());
        bindings.push(like);
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM employees{}", where_clause);
    debug!(sql = %count_sql, "Counting employees");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = count_query.bind(b);
    }
    let total = count_query
        .fetch_one(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    let data_sql = format!(
        "SELECT * FROM employees{} ORDER BY id DESC LIMIT ? OFFSET ?",
        where_clause
    );
    let mut data_query = sqlx::query_as::<_, Employee>(&data_sql);
    for b in &bindings {
        data_query = data_query.bind(b);
    }
    let employees = data_query
        .bind(per_page as i64)
        .bind(offset as i64)
        .fetch_all(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data: employees,
        page,
        per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/employees/{employee_id}",
    params(("employee_id", description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();

    // Workers may view their own profile only.
    if auth.require_admin().is_err() && auth.employee_id != Some(employee_id) {
        return Err(actix_web::error::ErrorForbidden("Not your profile"));
    }

    let employee = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
        .bind(employee_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(EngineError::Database)?
        .ok_or(EngineError::not_found("employee", employee_id))?;

    Ok(HttpResponse::Ok().json(employee))
}

#[utoipa::path(
    put,
    path = "/api/v1/employees/{employee_id}",
    params(("employee_id", description = "Employee ID")),
    request_body = CreateEmployeeReq,
    responses(
        (status = 200, description = "Employee updated"),
        (status = 400, description = "Unknown or empty field set"),
        (status = 404, description = "Employee not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let employee_id = path.into_inner();
    let update = build_update_sql("employees", &body, UPDATABLE_COLUMNS, "id", employee_id)?;

    let affected = execute_update(pool.get_ref(), update)
        .await
        .map_err(EngineError::Database)?;

    if affected == 0 {
        return Err(EngineError::not_found("employee", employee_id).into());
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Employee updated successfully" })))
}

#[utoipa::path(
    put,
    path = "/api/v1/employees/{employee_id}/toggle",
    params(("employee_id", description = "Employee ID")),
    responses(
        (status = 200, description = "Status flipped between active and inactive"),
        (status = 404)
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn toggle_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let employee_id = path.into_inner();
    let result = sqlx::query(
        "UPDATE employees SET status = IF(status = 'active', 'inactive', 'active') WHERE id = ?",
    )
    .bind(employee_id)
    .execute(pool.get_ref())
    .await
    .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("employee", employee_id).into());
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Employee status toggled" })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/employees/{employee_id}",
    params(("employee_id", description = "Employee ID")),
    responses(
        (status = 200, description = "Employee deleted"),
        (status = 404),
        (status = 409, description = "Employee has payroll or loan history")
    ),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let employee_id = path.into_inner();

    // History stays; archive instead of deleting once anything references
    // this employee.
    let history: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM payrolls WHERE employee_id = ?) \
              + (SELECT COUNT(*) FROM loans WHERE employee_id = ?)",
    )
    .bind(employee_id)
    .bind(employee_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(EngineError::Database)?;

    if history > 0 {
        return Err(EngineError::StateConflict(
            "Employee has payroll or loan history; archive instead".into(),
        )
        .into());
    }

    let result = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("employee", employee_id).into());
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Employee deleted" })))
}

#[utoipa::path(
    get,
    path = "/api/v1/employees/{employee_id}/payrolls",
    params(("employee_id", description = "Employee ID")),
    responses((status = 200, body = Vec<PayrollHistoryRow>)),
    security(("bearer_auth" = [])),
    tag = "Employee"
)]
pub async fn payroll_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();

    if auth.require_admin().is_err() && auth.employee_id != Some(employee_id) {
        return Err(actix_web::error::ErrorForbidden("Not your history"));
    }

    let sql = format!(
        "SELECT id, pay_period, base_salary, thr, loan_deduction, status, \
                {TAKE_HOME_PAY_SQL} AS take_home_pay \
         FROM payrolls WHERE employee_id = ? ORDER BY pay_period DESC"
    );
    let rows = sqlx::query_as::<_, PayrollHistoryRow>(&sql)
        .bind(employee_id)
        .fetch_all(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    Ok(HttpResponse::Ok().json(rows))
}

#[cfg(test)]
mod tests {
    use super::bump_nik;

    #[test]
    fn bump_starts_the_sequence() {
        assert_eq!(bump_nik(None), "EMP0001");
        assert_eq!(bump_nik(Some("EMP0041")), "EMP0042");
    }

    #[test]
    fn bump_crosses_the_four_digit_boundary() {
        assert_eq!(bump_nik(Some("EMP9999")), "EMP10000");
        assert_eq!(bump_nik(Some("EMP10000")), "EMP10001");
    }

    #[test]
    fn bump_ignores_unparseable_suffix() {
        assert_eq!(bump_nik(Some("EMP-legacy")), "EMP0001");
    }
}
