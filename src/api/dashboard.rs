use actix_web::{HttpResponse, Responder, web};
use chrono::{Datelike, Utc};
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::core::error::EngineError;
use crate::model::payroll::{TAKE_HOME_PAY_SQL, TOTAL_DEDUCTIONS_SQL};

#[derive(Serialize, sqlx::FromRow, ToSchema)]
pub struct PeriodTotals {
    #[schema(example = 12)]
    pub payroll_count: i64,
    pub total_take_home: f64,
    pub total_deductions: f64,
    pub total_thr: f64,
    pub total_loan_deduction: f64,
}

#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    #[schema(example = "2025-03")]
    pub current_period: String,
    pub current: PeriodTotals,
    /// Totals across every approved run of the current calendar year.
    pub year_to_date: PeriodTotals,
    #[schema(example = 42)]
    pub active_employees: i64,
    #[schema(example = 3)]
    pub active_loans: i64,
    #[schema(example = 7)]
    pub pending_payments: i64,
    #[schema(example = 2)]
    pub draft_payrolls: i64,
}

async fn period_totals(
    pool: &MySqlPool,
    period_clause: &str,
    period_arg: &str,
) -> Result<PeriodTotals, sqlx::Error> {
    // Only approved runs count toward the money figures.
    let sql = format!(
        "SELECT COUNT(*) AS payroll_count, \
                COALESCE(SUM({TAKE_HOME_PAY_SQL}), 0) AS total_take_home, \
                COALESCE(SUM({TOTAL_DEDUCTIONS_SQL}), 0) AS total_deductions, \
                COALESCE(SUM(thr), 0) AS total_thr, \
                COALESCE(SUM(loan_deduction), 0) AS total_loan_deduction \
         FROM payrolls WHERE status = 'approved' AND {period_clause}"
    );
    sqlx::query_as::<_, PeriodTotals>(&sql)
        .bind(period_arg)
        .fetch_one(pool)
        .await
}

#[utoipa::path(
    get,
    path = "/api/v1/dashboard",
    responses((status = 200, body = DashboardResponse)),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn dashboard(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let now = Utc::now();
    let current_period = format!("{:04}-{:02}", now.year(), now.month());
    let year_prefix = format!("{:04}-%", now.year());

    let current = period_totals(pool.get_ref(), "pay_period = ?", &current_period)
        .await
        .map_err(EngineError::Database)?;
    let year_to_date = period_totals(pool.get_ref(), "pay_period LIKE ?", &year_prefix)
        .await
        .map_err(EngineError::Database)?;

    let active_employees: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM employees WHERE status = 'active'")
            .fetch_one(pool.get_ref())
            .await
            .map_err(EngineError::Database)?;
    let active_loans: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE status = 'approved'")
            .fetch_one(pool.get_ref())
            .await
            .map_err(EngineError::Database)?;
    let pending_payments: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE status = 'pending'")
            .fetch_one(pool.get_ref())
            .await
            .map_err(EngineError::Database)?;
    let draft_payrolls: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM payrolls WHERE status != 'approved'")
            .fetch_one(pool.get_ref())
            .await
            .map_err(EngineError::Database)?;

    Ok(HttpResponse::Ok().json(DashboardResponse {
        current_period,
        current,
        year_to_date,
        active_employees,
        active_loans,
        pending_payments,
        draft_payrolls,
    }))
}
