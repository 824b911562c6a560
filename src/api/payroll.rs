use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::core::compensation;
use crate::core::error::EngineError;
use crate::core::matcher::{self, CandidateInstallment};
use crate::core::settlement::{self, ApproveOutcome, CreatePayroll, PayrollFields, UpdatePayroll};
use crate::model::payroll::{Payroll, PayrollLoan, TAKE_HOME_PAY_SQL, TOTAL_DEDUCTIONS_SQL};

#[derive(Deserialize, ToSchema)]
pub struct CreatePayrollReq {
    #[schema(example = 1)]
    pub employee_id: u64,

    #[schema(example = "2025-03")]
    pub pay_period: String,

    #[schema(example = 5000000.0)]
    pub base_salary: f64,
    #[schema(example = 100000.0)]
    pub bpjs_allowance: f64,
    #[schema(example = 500000.0)]
    pub meal_allowance: f64,
    #[schema(example = 300000.0)]
    pub transport_allowance: f64,
    #[schema(example = 0.0)]
    pub other_allowance: f64,
    #[schema(example = 200000.0)]
    pub overtime_pay: f64,
    #[schema(example = 0.0)]
    pub manual_deduction: f64,

    /// Unexcused absence days; each one costs base_salary / 30.
    #[schema(example = 0)]
    pub absence_days: i32,

    /// Compute the pro-rated annual bonus for this run.
    #[schema(example = false)]
    pub with_thr: bool,

    /// Approved payment ids to post as loan deductions.
    #[schema(example = json!([12, 18]))]
    pub payment_ids: Vec<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePayrollReq {
    pub employee_id: u64,
    pub pay_period: String,
    pub base_salary: f64,
    pub bpjs_allowance: f64,
    pub meal_allowance: f64,
    pub transport_allowance: f64,
    pub other_allowance: f64,
    pub overtime_pay: f64,
    pub manual_deduction: f64,
    pub absence_days: i32,
    pub with_thr: bool,
}

fn fields_of_create(p: &CreatePayrollReq) -> PayrollFields {
    PayrollFields {
        base_salary: p.base_salary,
        bpjs_allowance: p.bpjs_allowance,
        meal_allowance: p.meal_allowance,
        transport_allowance: p.transport_allowance,
        other_allowance: p.other_allowance,
        overtime_pay: p.overtime_pay,
        manual_deduction: p.manual_deduction,
        absence_days: p.absence_days,
        with_thr: p.with_thr,
    }
}

#[derive(Serialize, sqlx::FromRow, ToSchema)]
pub struct PayrollListRow {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = "Budi Santoso")]
    pub employee_name: String,
    #[schema(example = "2025-03")]
    pub pay_period: String,
    pub base_salary: f64,
    pub thr: f64,
    pub loan_deduction: f64,
    #[schema(example = "draft")]
    pub status: String,
    /// Computed in SQL with the same formula the in-process model uses.
    pub total_deductions: f64,
    pub take_home_pay: f64,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct PayrollFilter {
    /// Substring match on employee name
    pub keyword: Option<String>,
    /// Exact pay period "YYYY-MM"
    pub pay_period: Option<String>,
    #[schema(example = 1)]
    pub page: Option<u32>,
    #[schema(example = 10)]
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedPayrollResponse {
    pub data: Vec<PayrollListRow>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    /// Runs still awaiting approval within the filtered set.
    pub draft_count: i64,
}

#[derive(Serialize, ToSchema)]
pub struct PayslipResponse {
    #[serde(flatten)]
    pub payroll: Payroll,
    pub take_home_pay: f64,
    pub total_deductions: f64,
    pub installments: Vec<PayrollLoan>,
}

/// Prefilled settlement inputs for a new payroll run: catalog-resolved pay
/// components plus the postable loan installments.
#[derive(Serialize, ToSchema)]
pub struct SettlementCandidates {
    pub compensation: compensation::ResolvedCompensation,
    pub installments: Vec<CandidateInstallment>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct CandidateQuery {
    #[schema(example = 1)]
    pub employee_id: u64,
    /// "YYYY-MM"; empty means no period context (all component totals zero).
    #[schema(example = "2025-03")]
    pub pay_period: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct BulkApproveReq {
    #[schema(example = json!([1, 2, 3]))]
    pub payroll_ids: Vec<u64>,
}

#[utoipa::path(
    post,
    path = "/api/v1/payroll",
    request_body = CreatePayrollReq,
    responses(
        (status = 201, description = "Payroll draft created"),
        (status = 400, description = "Duplicate period or invalid input"),
        (status = 401),
        (status = 403)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn create_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePayrollReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let payload = payload.into_inner();
    let input = CreatePayroll {
        employee_id: payload.employee_id,
        pay_period: payload.pay_period.clone(),
        fields: fields_of_create(&payload),
        payment_ids: payload.payment_ids.clone(),
    };

    let payroll_id = settlement::create_payroll(pool.get_ref(), auth.user_id, input).await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Payroll created successfully",
        "id": payroll_id
    })))
}

#[utoipa::path(
    put,
    path = "/api/v1/payroll/{payroll_id}",
    request_body = UpdatePayrollReq,
    params(("payroll_id", description = "Payroll ID")),
    responses(
        (status = 200, description = "Payroll updated"),
        (status = 404, description = "Payroll not found"),
        (status = 409, description = "Payroll already approved")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn update_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdatePayrollReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let payroll_id = path.into_inner();
    let b = body.into_inner();
    let input = UpdatePayroll {
        employee_id: b.employee_id,
        pay_period: b.pay_period.clone(),
        fields: PayrollFields {
            base_salary: b.base_salary,
            bpjs_allowance: b.bpjs_allowance,
            meal_allowance: b.meal_allowance,
            transport_allowance: b.transport_allowance,
            other_allowance: b.other_allowance,
            overtime_pay: b.overtime_pay,
            manual_deduction: b.manual_deduction,
            absence_days: b.absence_days,
            with_thr: b.with_thr,
        },
    };

    settlement::update_payroll(pool.get_ref(), auth.user_id, payroll_id, input).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Payroll updated successfully"
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/payroll",
    params(PayrollFilter),
    responses((status = 200, body = PaginatedPayrollResponse)),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_payrolls(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let mut where_sql = String::from(" WHERE 1=1");
    let mut binds: Vec<String> = Vec::new();

    if let Some(keyword) = query.keyword.as_deref().filter(|k| !k.is_empty()) {
        where_sql.push_str(" AND e.name LIKE ?");
        binds.push(format!("%{}%", keyword));
    }
    if let Some(period) = query.pay_period.as_deref().filter(|p| !p.is_empty()) {
        where_sql.push_str(" AND p.pay_period = ?");
        binds.push(period.to_string());
    }

    let count_sql = format!(
        "SELECT COUNT(*) FROM payrolls p JOIN employees e ON e.id = p.employee_id{}",
        where_sql
    );
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &binds {
        count_q = count_q.bind(b);
    }
    let total = count_q
        .fetch_one(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    let draft_sql = format!(
        "SELECT COUNT(*) FROM payrolls p JOIN employees e ON e.id = p.employee_id{} AND p.status != 'approved'",
        where_sql
    );
    let mut draft_q = sqlx::query_scalar::<_, i64>(&draft_sql);
    for b in &binds {
        draft_q = draft_q.bind(b);
    }
    let draft_count = draft_q
        .fetch_one(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    let data_sql = format!(
        "SELECT p.id, p.employee_id, e.name AS employee_name, p.pay_period, \
                p.base_salary, p.thr, p.loan_deduction, p.status, \
                {TOTAL_DEDUCTIONS_SQL} AS total_deductions, \
                {TAKE_HOME_PAY_SQL} AS take_home_pay \
         FROM payrolls p JOIN employees e ON e.id = p.employee_id{} \
         ORDER BY p.id DESC LIMIT ? OFFSET ?",
        where_sql
    );
    let mut data_q = sqlx::query_as::<_, PayrollListRow>(&data_sql);
    for b in &binds {
        data_q = data_q.bind(b);
    }
    let data = data_q
        .bind(per_page as i64)
        .bind(offset as i64)
        .fetch_all(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    Ok(HttpResponse::Ok().json(PaginatedPayrollResponse {
        data,
        page,
        per_page,
        total,
        draft_count,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/payroll/{payroll_id}",
    params(("payroll_id", description = "Payroll ID")),
    responses(
        (status = 200, body = PayslipResponse),
        (status = 403, description = "Payslip belongs to another employee"),
        (status = 404)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let payroll_id = path.into_inner();

    let payroll = sqlx::query_as::<_, Payroll>("SELECT * FROM payrolls WHERE id = ?")
        .bind(payroll_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(EngineError::Database)?
        .ok_or(EngineError::not_found("payroll", payroll_id))?;

    // Admins see every payslip; a worker only their own.
    if auth.require_admin().is_err() && auth.employee_id != Some(payroll.employee_id) {
        return Err(actix_web::error::ErrorForbidden("Not your payslip"));
    }

    let installments = sqlx::query_as::<_, PayrollLoan>(
        "SELECT * FROM payroll_loans WHERE payroll_id = ? ORDER BY id",
    )
    .bind(payroll_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(EngineError::Database)?;

    let take_home_pay = payroll.take_home_pay();
    let total_deductions = payroll.total_deductions();
    Ok(HttpResponse::Ok().json(PayslipResponse {
        payroll,
        take_home_pay,
        total_deductions,
        installments,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/payroll/{payroll_id}/approve",
    params(("payroll_id", description = "Payroll ID")),
    responses(
        (status = 200, description = "Payroll approved (or already approved)"),
        (status = 404)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn approve_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let payroll_id = path.into_inner();
    let outcome = settlement::approve_payroll(pool.get_ref(), auth.user_id, payroll_id).await?;

    let message = match outcome {
        ApproveOutcome::Approved => "Payroll approved and locked",
        ApproveOutcome::AlreadyApproved => "Payroll was already approved",
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": message })))
}

#[utoipa::path(
    post,
    path = "/api/v1/payroll/bulk_approve",
    request_body = BulkApproveReq,
    responses((status = 200, description = "Draft payrolls approved")),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn bulk_approve_payrolls(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<BulkApproveReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    if payload.payroll_ids.is_empty() {
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "message": "No payrolls selected"
        })));
    }

    let approved =
        settlement::bulk_approve(pool.get_ref(), auth.user_id, &payload.payroll_ids).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("{approved} payrolls approved")
    })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/payroll/{payroll_id}",
    params(("payroll_id", description = "Payroll ID")),
    responses(
        (status = 200, description = "Payroll deleted, installments restored"),
        (status = 404),
        (status = 409, description = "Payroll already approved")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn delete_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let payroll_id = path.into_inner();
    settlement::delete_payroll(pool.get_ref(), auth.user_id, payroll_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Payroll deleted and installments restored"
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/payroll/candidates",
    params(CandidateQuery),
    responses((status = 200, body = SettlementCandidates)),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn settlement_candidates(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CandidateQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let pay_period = query.pay_period.clone().unwrap_or_default();

    let rows = compensation::fetch_assignments(pool.get_ref(), query.employee_id)
        .await
        .map_err(EngineError::Database)?;
    let resolved = compensation::resolve(&rows, &pay_period);

    let installments = matcher::eligible_payments(pool.get_ref(), query.employee_id)
        .await
        .map_err(EngineError::Database)?;

    Ok(HttpResponse::Ok().json(SettlementCandidates {
        compensation: resolved,
        installments,
    }))
}
