use actix_web::{HttpResponse, Responder, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::core::audit::log_action;
use crate::core::error::EngineError;
use crate::core::loan_ledger;
use crate::model::loan::{self, Loan};
use crate::model::payment::Payment;

#[derive(Deserialize, ToSchema)]
pub struct ApplyLoanReq {
    /// Admins may apply on behalf of any employee; workers only for themselves.
    pub employee_id: Option<u64>,

    #[schema(example = 1000000.0)]
    pub amount: f64,

    /// Number of monthly installments
    #[schema(example = 10)]
    pub tenor: i32,

    /// Flat interest over the whole principal, percent
    #[schema(example = 10.0)]
    pub interest_rate: f64,

    #[schema(example = "Motorbike repair")]
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitPaymentReq {
    #[schema(example = 110000.0)]
    pub payment_amount: f64,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LoanFilter {
    #[schema(example = 1)]
    pub employee_id: Option<u64>,
    #[schema(example = "approved")]
    pub status: Option<String>,
    #[schema(example = 1)]
    pub page: Option<u32>,
    #[schema(example = 10)]
    pub per_page: Option<u32>,
}

#[derive(Serialize, sqlx::FromRow, ToSchema)]
pub struct LoanListRow {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = "Budi Santoso")]
    pub employee_name: String,
    pub amount: f64,
    pub tenor: i32,
    pub interest_rate: f64,
    pub installment: f64,
    #[schema(example = "approved")]
    pub status: String,
    pub installments_paid: i32,
}

#[derive(Serialize, ToSchema)]
pub struct LoanListResponse {
    pub data: Vec<LoanListRow>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct LoanDetailResponse {
    #[serde(flatten)]
    pub loan: Loan,
    /// Principal plus flat interest
    pub total_value: f64,
    /// Approved + posted payments so far
    pub paid_amount: f64,
    pub remaining: f64,
    pub payments: Vec<Payment>,
}

enum FilterValue<'a> {
    U64(u64),
    Str(&'a str),
}

async fn fetch_loan(pool: &MySqlPool, loan_id: u64) -> Result<Loan, EngineError> {
    sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = ?")
        .bind(loan_id)
        .fetch_optional(pool)
        .await?
        .ok_or(EngineError::not_found("loan", loan_id))
}

/* =========================
Apply for a loan
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/loan",
    request_body = ApplyLoanReq,
    responses(
        (status = 201, description = "Loan application submitted", body = Object, example = json!({
            "message": "Loan application submitted",
            "installment": 110000.0
        })),
        (status = 400, description = "Invalid terms or an active loan already exists"),
        (status = 401),
        (status = 403)
    ),
    security(("bearer_auth" = [])),
    tag = "Loan"
)]
pub async fn apply_loan(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ApplyLoanReq>,
) -> actix_web::Result<impl Responder> {
    let employee_id = match payload.employee_id {
        Some(id) if auth.require_admin().is_ok() => id,
        _ => auth.require_employee()?,
    };

    if payload.amount <= 0.0 || payload.tenor <= 0 || payload.interest_rate < 0.0 {
        return Err(EngineError::Validation(
            "Amount and tenor must be positive, interest rate non-negative".into(),
        )
        .into());
    }

    // One running loan per employee at a time.
    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM loans WHERE employee_id = ? AND status IN ('pending', 'approved')",
    )
    .bind(employee_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(EngineError::Database)?;

    if active > 0 {
        return Err(EngineError::Validation(
            "Employee already has a pending or active loan".into(),
        )
        .into());
    }

    let installment =
        loan::installment_amount(payload.amount, payload.interest_rate, payload.tenor);

    let res = sqlx::query(
        "INSERT INTO loans (employee_id, amount, tenor, interest_rate, installment, status, reason) \
         VALUES (?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(employee_id)
    .bind(payload.amount)
    .bind(payload.tenor)
    .bind(payload.interest_rate)
    .bind(installment)
    .bind(payload.reason.as_deref())
    .execute(pool.get_ref())
    .await
    .map_err(EngineError::Database)?;

    let loan_id = res.last_insert_id();
    log_action(
        pool.get_ref(),
        Some(auth.user_id),
        "apply_loan",
        "loan",
        loan_id,
        payload.reason.as_deref(),
    )
    .await;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Loan application submitted",
        "id": loan_id,
        "installment": installment
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/loan",
    params(LoanFilter),
    responses((status = 200, body = LoanListResponse)),
    security(("bearer_auth" = [])),
    tag = "Loan"
)]
pub async fn list_loans(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LoanFilter>,
) -> actix_web::Result<impl Responder> {
    // Workers may only list their own loans.
    let forced_employee = if auth.require_admin().is_ok() {
        query.employee_id
    } else {
        Some(auth.require_employee()?)
    };

    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * per_page;

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(emp_id) = forced_employee {
        where_sql.push_str(" AND l.employee_id = ?");
        args.push(FilterValue::U64(emp_id));
    }
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        where_sql.push_str(" AND l.status = ?");
        args.push(FilterValue::Str(status));
    }

    let count_sql = format!(
        "SELECT COUNT(*) FROM loans l JOIN employees e ON e.id = l.employee_id{}",
        where_sql
    );
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(*s),
        };
    }
    let total = count_q
        .fetch_one(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    let data_sql = format!(
        "SELECT l.id, l.employee_id, e.name AS employee_name, l.amount, l.tenor, \
                l.interest_rate, l.installment, l.status, l.installments_paid \
         FROM loans l JOIN employees e ON e.id = l.employee_id{} \
         ORDER BY l.id DESC LIMIT ? OFFSET ?",
        where_sql
    );
    let mut data_q = sqlx::query_as::<_, LoanListRow>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }
    let data = data_q
        .bind(per_page as i64)
        .bind(offset as i64)
        .fetch_all(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    Ok(HttpResponse::Ok().json(LoanListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/loan/{loan_id}",
    params(("loan_id", description = "Loan ID")),
    responses(
        (status = 200, body = LoanDetailResponse),
        (status = 403, description = "Loan belongs to another employee"),
        (status = 404)
    ),
    security(("bearer_auth" = [])),
    tag = "Loan"
)]
pub async fn get_loan(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let loan_id = path.into_inner();
    let loan = fetch_loan(pool.get_ref(), loan_id).await?;

    if auth.require_admin().is_err() && auth.employee_id != Some(loan.employee_id) {
        return Err(actix_web::error::ErrorForbidden("Not your loan"));
    }

    let paid = loan_ledger::paid_amount(pool.get_ref(), loan_id)
        .await
        .map_err(EngineError::Database)?;
    let payments =
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE loan_id = ? ORDER BY id")
            .bind(loan_id)
            .fetch_all(pool.get_ref())
            .await
            .map_err(EngineError::Database)?;

    let total_value = loan.total_value();
    let remaining = loan_ledger::remaining(loan.amount, loan.interest_rate, paid);
    Ok(HttpResponse::Ok().json(LoanDetailResponse {
        loan,
        total_value,
        paid_amount: paid,
        remaining,
        payments,
    }))
}

/* =========================
Loan decisions (Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/loan/{loan_id}/approve",
    params(("loan_id", description = "Loan ID")),
    responses(
        (status = 200, description = "Loan approved"),
        (status = 409, description = "Loan not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Loan"
)]
pub async fn approve_loan(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let loan_id = path.into_inner();
    let result = sqlx::query(
        "UPDATE loans SET status = 'approved', approval_date = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(Utc::now())
    .bind(loan_id)
    .execute(pool.get_ref())
    .await
    .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::StateConflict(
            "Loan not found or already processed".into(),
        )
        .into());
    }

    log_action(pool.get_ref(), Some(auth.user_id), "approve_loan", "loan", loan_id, None).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Loan approved" })))
}

#[utoipa::path(
    put,
    path = "/api/v1/loan/{loan_id}/reject",
    params(("loan_id", description = "Loan ID")),
    responses(
        (status = 200, description = "Loan rejected"),
        (status = 409, description = "Loan not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Loan"
)]
pub async fn reject_loan(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let loan_id = path.into_inner();
    let result =
        sqlx::query("UPDATE loans SET status = 'rejected' WHERE id = ? AND status = 'pending'")
            .bind(loan_id)
            .execute(pool.get_ref())
            .await
            .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::StateConflict(
            "Loan not found or already processed".into(),
        )
        .into());
    }

    log_action(pool.get_ref(), Some(auth.user_id), "reject_loan", "loan", loan_id, None).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Loan rejected" })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/loan/{loan_id}",
    params(("loan_id", description = "Loan ID")),
    responses(
        (status = 200, description = "Loan deleted"),
        (status = 409, description = "Only pending or rejected loans can be deleted")
    ),
    security(("bearer_auth" = [])),
    tag = "Loan"
)]
pub async fn delete_loan(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let loan_id = path.into_inner();
    let result = sqlx::query("DELETE FROM loans WHERE id = ? AND status IN ('pending', 'rejected')")
        .bind(loan_id)
        .execute(pool.get_ref())
        .await
        .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::StateConflict(
            "Only pending or rejected loans can be deleted".into(),
        )
        .into());
    }

    log_action(pool.get_ref(), Some(auth.user_id), "delete_loan", "loan", loan_id, None).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Loan deleted" })))
}

/* =========================
Installment payments
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/loan/{loan_id}/payment",
    params(("loan_id", description = "Loan ID")),
    request_body = SubmitPaymentReq,
    responses(
        (status = 201, description = "Payment submitted for approval"),
        (status = 400, description = "Amount exceeds the outstanding balance"),
        (status = 409, description = "Loan is not active")
    ),
    security(("bearer_auth" = [])),
    tag = "Loan"
)]
pub async fn submit_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<SubmitPaymentReq>,
) -> actix_web::Result<impl Responder> {
    let loan_id = path.into_inner();
    let loan = fetch_loan(pool.get_ref(), loan_id).await?;

    if auth.require_admin().is_err() && auth.employee_id != Some(loan.employee_id) {
        return Err(actix_web::error::ErrorForbidden("Not your loan"));
    }
    if loan.status != "approved" {
        return Err(EngineError::StateConflict("Loan is not active".into()).into());
    }
    if payload.payment_amount <= 0.0 {
        return Err(EngineError::Validation("Payment amount must be positive".into()).into());
    }

    // Guard against over-submission: everything not rejected still counts
    // against the balance, including payments awaiting approval.
    let committed: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(payment_amount), 0) FROM payments \
         WHERE loan_id = ? AND status IN ('pending', 'approved', 'posted')",
    )
    .bind(loan_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(EngineError::Database)?;

    if committed + payload.payment_amount > loan.total_value() {
        return Err(EngineError::Validation(
            "Payment exceeds the outstanding loan balance".into(),
        )
        .into());
    }

    let res = sqlx::query(
        "INSERT INTO payments (loan_id, payment_date, payment_amount, status) \
         VALUES (?, ?, ?, 'pending')",
    )
    .bind(loan_id)
    .bind(Utc::now())
    .bind(payload.payment_amount)
    .execute(pool.get_ref())
    .await
    .map_err(EngineError::Database)?;

    let payment_id = res.last_insert_id();
    log_action(
        pool.get_ref(),
        Some(auth.user_id),
        "submit_payment",
        "payment",
        payment_id,
        None,
    )
    .await;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Payment submitted for approval",
        "id": payment_id
    })))
}

#[utoipa::path(
    put,
    path = "/api/v1/payment/{payment_id}/approve",
    params(("payment_id", description = "Payment ID")),
    responses(
        (status = 200, description = "Payment approved"),
        (status = 409, description = "Payment not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Loan"
)]
pub async fn approve_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let payment_id = path.into_inner();
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
        .bind(payment_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(EngineError::Database)?
        .ok_or(EngineError::not_found("payment", payment_id))?;

    let result =
        sqlx::query("UPDATE payments SET status = 'approved' WHERE id = ? AND status = 'pending'")
            .bind(payment_id)
            .execute(pool.get_ref())
            .await
            .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::StateConflict("Payment already processed".into()).into());
    }

    // Close the loan once approved and posted payments cover its full value.
    let loan = fetch_loan(pool.get_ref(), payment.loan_id).await?;
    let paid = loan_ledger::paid_amount(pool.get_ref(), loan.id)
        .await
        .map_err(EngineError::Database)?;
    if paid >= loan.total_value() {
        sqlx::query("UPDATE loans SET status = 'completed' WHERE id = ? AND status = 'approved'")
            .bind(loan.id)
            .execute(pool.get_ref())
            .await
            .map_err(EngineError::Database)?;
    }

    log_action(
        pool.get_ref(),
        Some(auth.user_id),
        "approve_payment",
        "payment",
        payment_id,
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Payment approved" })))
}

#[utoipa::path(
    put,
    path = "/api/v1/payment/{payment_id}/reject",
    params(("payment_id", description = "Payment ID")),
    responses(
        (status = 200, description = "Payment rejected"),
        (status = 409, description = "Payment not pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Loan"
)]
pub async fn reject_payment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let payment_id = path.into_inner();
    let result =
        sqlx::query("UPDATE payments SET status = 'rejected' WHERE id = ? AND status = 'pending'")
            .bind(payment_id)
            .execute(pool.get_ref())
            .await
            .map_err(EngineError::Database)?;

    if result.rows_affected() == 0 {
        return Err(EngineError::StateConflict("Payment already processed".into()).into());
    }

    log_action(
        pool.get_ref(),
        Some(auth.user_id),
        "reject_payment",
        "payment",
        payment_id,
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Payment rejected" })))
}
