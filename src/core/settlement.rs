use chrono::{NaiveDate, Utc};
use sqlx::MySqlPool;
use tracing::{debug, info};

use crate::core::audit::log_action;
use crate::core::error::EngineError;
use crate::core::loan_ledger;

/// "YYYY-MM" -> first day of that month.
pub fn parse_period(period: &str) -> Option<NaiveDate> {
    let (year, month) = period.split_once('-')?;
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

/// Whole months between hire and period end; one month is subtracted when
/// the end day has not yet reached the hire day. Floored at zero.
pub fn months_of_service(hire_date: NaiveDate, end_date: NaiveDate) -> i32 {
    use chrono::Datelike;
    let mut months = (end_date.year() - hire_date.year()) * 12
        + (end_date.month() as i32 - hire_date.month() as i32);
    if end_date.day() < hire_date.day() {
        months -= 1;
    }
    months.max(0)
}

/// Pro-rated annual bonus: full base pay after 12 months of service,
/// otherwise proportional.
pub fn thr_amount(base_salary: f64, months: i32) -> f64 {
    if months >= 12 {
        base_salary
    } else {
        base_salary * months as f64 / 12.0
    }
}

#[derive(Debug)]
pub struct PayrollFields {
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

#[derive(Debug)]
pub struct CreatePayroll {
    pub employee_id: u64,
    pub pay_period: String,
    pub fields: PayrollFields,
    /// Approved payments selected for posting into this run.
    pub payment_ids: Vec<u64>,
}

#[derive(Debug, sqlx::FromRow)]
struct SelectedPayment {
    id: u64,
    loan_id: u64,
    payment_amount: f64,
    status: String,
    loan_employee_id: u64,
    installments_paid: i32,
    tenor: i32,
}

/// Whether a loan's schedule still has room for one more posting after
/// `already_accepted` selections of the same loan in this run.
fn schedule_has_room(installments_paid: i32, already_accepted: i32, tenor: i32) -> bool {
    installments_paid + already_accepted < tenor
}

/// Zero rows touched by a status-guarded statement means the run flipped
/// to approved between the pre-check and the write.
fn ensure_still_draft(rows_affected: u64, action: &str) -> Result<(), EngineError> {
    if rows_affected == 0 {
        return Err(EngineError::StateConflict(format!(
            "Approved payroll is locked and cannot be {action}"
        )));
    }
    Ok(())
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ApproveOutcome {
    Approved,
    AlreadyApproved,
}

async fn employee_hire_date(
    pool: &MySqlPool,
    employee_id: u64,
) -> Result<Option<NaiveDate>, EngineError> {
    sqlx::query_scalar::<_, Option<NaiveDate>>("SELECT hire_date FROM employees WHERE id = ?")
        .bind(employee_id)
        .fetch_optional(pool)
        .await?
        .ok_or(EngineError::not_found("employee", employee_id))
}

async fn duplicate_period_exists(
    pool: &MySqlPool,
    employee_id: u64,
    pay_period: &str,
    exclude_id: Option<u64>,
) -> Result<bool, sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM payrolls WHERE employee_id = ? AND pay_period = ? AND id != ?",
    )
    .bind(employee_id)
    .bind(pay_period)
    .bind(exclude_id.unwrap_or(0))
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

fn resolve_thr(
    fields: &PayrollFields,
    hire_date: Option<NaiveDate>,
    pay_period: &str,
) -> f64 {
    if !fields.with_thr {
        return 0.0;
    }
    match (hire_date, parse_period(pay_period)) {
        (Some(hire), Some(end)) => thr_amount(fields.base_salary, months_of_service(hire, end)),
        _ => 0.0,
    }
}

/// Create a draft payroll run: compose resolved fields and THR, post the
/// selected approved payments as loan deductions, advance loan progress.
/// Payroll + links + status changes commit atomically; the audit line is
/// written after commit.
pub async fn create_payroll(
    pool: &MySqlPool,
    actor_id: u64,
    input: CreatePayroll,
) -> Result<u64, EngineError> {
    if parse_period(&input.pay_period).is_none() {
        return Err(EngineError::Validation(format!(
            "Invalid pay period '{}', expected YYYY-MM",
            input.pay_period
        )));
    }

    if duplicate_period_exists(pool, input.employee_id, &input.pay_period, None).await? {
        return Err(EngineError::Validation(
            "Payroll for this employee and period already exists".into(),
        ));
    }

    let hire_date = employee_hire_date(pool, input.employee_id).await?;
    let thr = resolve_thr(&input.fields, hire_date, &input.pay_period);

    let mut tx = pool.begin().await?;

    // Verify each selected payment inside the transaction; anything missing,
    // not approved, belonging to another employee, or landing past the
    // loan's tenor is skipped, not fatal.
    let mut accepted: Vec<SelectedPayment> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut per_loan_accepted: std::collections::HashMap<u64, i32> =
        std::collections::HashMap::new();
    for payment_id in &input.payment_ids {
        if !seen.insert(*payment_id) {
            continue;
        }
        let row = sqlx::query_as::<_, SelectedPayment>(
            r#"
            SELECT p.id, p.loan_id, p.payment_amount, p.status,
                   l.employee_id AS loan_employee_id, l.installments_paid, l.tenor
            FROM payments p
            JOIN loans l ON l.id = p.loan_id
            WHERE p.id = ?
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(p) if p.status == "approved" && p.loan_employee_id == input.employee_id => {
                let taken = per_loan_accepted.entry(p.loan_id).or_insert(0);
                if !schedule_has_room(p.installments_paid, *taken, p.tenor) {
                    debug!(payment_id, loan_id = p.loan_id, "Skipping payment past the loan tenor");
                    continue;
                }
                *taken += 1;
                accepted.push(p);
            }
            _ => debug!(payment_id, "Skipping ineligible selected payment"),
        }
    }

    let loan_deduction: f64 = accepted.iter().map(|p| p.payment_amount).sum();

    let f = &input.fields;
    let insert = sqlx::query(
        r#"
        INSERT INTO payrolls
            (employee_id, pay_period, base_salary, bpjs_allowance, meal_allowance,
             transport_allowance, other_allowance, overtime_pay, thr,
             manual_deduction, absence_days, loan_deduction, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'draft')
        "#,
    )
    .bind(input.employee_id)
    .bind(&input.pay_period)
    .bind(f.base_salary)
    .bind(f.bpjs_allowance)
    .bind(f.meal_allowance)
    .bind(f.transport_allowance)
    .bind(f.other_allowance)
    .bind(f.overtime_pay)
    .bind(thr)
    .bind(f.manual_deduction)
    .bind(f.absence_days)
    .bind(loan_deduction)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        EngineError::from_insert(e, "Payroll for this employee and period already exists")
    })?;
    let payroll_id = insert.last_insert_id();

    // Two payments of the same loan in one run take consecutive numbers.
    let mut per_loan_offset: std::collections::HashMap<u64, i32> = std::collections::HashMap::new();
    for p in &accepted {
        // Conditional update: the payment must still be approved at the
        // moment of posting, or a concurrent run got there first.
        let posted =
            sqlx::query("UPDATE payments SET status = 'posted' WHERE id = ? AND status = 'approved'")
                .bind(p.id)
                .execute(&mut *tx)
                .await?;
        if posted.rows_affected() == 0 {
            return Err(EngineError::StateConflict(format!(
                "Payment {} was posted by a concurrent payroll run",
                p.id
            )));
        }

        let offset = per_loan_offset.entry(p.loan_id).or_insert(0);
        *offset += 1;
        let installment_number = p.installments_paid + *offset;

        sqlx::query(
            r#"
            INSERT INTO payroll_loans (payroll_id, loan_id, payment_id, installment_number, amount)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(payroll_id)
        .bind(p.loan_id)
        .bind(p.id)
        .bind(installment_number)
        .bind(p.payment_amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| EngineError::from_insert(e, "Payment already posted into another payroll"))?;

        loan_ledger::record_installment_paid(&mut tx, p.loan_id).await?;
    }

    tx.commit().await?;

    info!(payroll_id, employee_id = input.employee_id, period = %input.pay_period,
          posted = accepted.len(), "Payroll draft created");
    log_action(
        pool,
        Some(actor_id),
        "create_payroll",
        "payroll",
        payroll_id,
        Some(&format!("period={}", input.pay_period)),
    )
    .await;

    Ok(payroll_id)
}

#[derive(Debug)]
pub struct UpdatePayroll {
    pub employee_id: u64,
    pub pay_period: String,
    pub fields: PayrollFields,
}

/// Edit a draft run in place. Posted installment links are untouched; only
/// the manual fields and THR are recomputed. Approved payrolls reject every
/// mutation.
pub async fn update_payroll(
    pool: &MySqlPool,
    actor_id: u64,
    payroll_id: u64,
    input: UpdatePayroll,
) -> Result<(), EngineError> {
    let status = sqlx::query_scalar::<_, String>("SELECT status FROM payrolls WHERE id = ?")
        .bind(payroll_id)
        .fetch_optional(pool)
        .await?
        .ok_or(EngineError::not_found("payroll", payroll_id))?;
    if status == "approved" {
        return Err(EngineError::StateConflict(
            "Approved payroll is locked and cannot be edited".into(),
        ));
    }

    if parse_period(&input.pay_period).is_none() {
        return Err(EngineError::Validation(format!(
            "Invalid pay period '{}', expected YYYY-MM",
            input.pay_period
        )));
    }
    if duplicate_period_exists(pool, input.employee_id, &input.pay_period, Some(payroll_id)).await?
    {
        return Err(EngineError::Validation(
            "Payroll for this employee and period already exists".into(),
        ));
    }

    let hire_date = employee_hire_date(pool, input.employee_id).await?;
    let thr = resolve_thr(&input.fields, hire_date, &input.pay_period);

    let f = &input.fields;
    let updated = sqlx::query(
        r#"
        UPDATE payrolls SET
            employee_id = ?, pay_period = ?, base_salary = ?, bpjs_allowance = ?,
            meal_allowance = ?, transport_allowance = ?, other_allowance = ?,
            overtime_pay = ?, thr = ?, manual_deduction = ?, absence_days = ?
        WHERE id = ? AND status != 'approved'
        "#,
    )
    .bind(input.employee_id)
    .bind(&input.pay_period)
    .bind(f.base_salary)
    .bind(f.bpjs_allowance)
    .bind(f.meal_allowance)
    .bind(f.transport_allowance)
    .bind(f.other_allowance)
    .bind(f.overtime_pay)
    .bind(thr)
    .bind(f.manual_deduction)
    .bind(f.absence_days)
    .bind(payroll_id)
    .execute(pool)
    .await?;
    ensure_still_draft(updated.rows_affected(), "edited")?;

    log_action(
        pool,
        Some(actor_id),
        "update_payroll",
        "payroll",
        payroll_id,
        Some(&format!("period={}", input.pay_period)),
    )
    .await;
    Ok(())
}

/// Lock a draft run. Approving an already-approved run is a reported no-op.
pub async fn approve_payroll(
    pool: &MySqlPool,
    actor_id: u64,
    payroll_id: u64,
) -> Result<ApproveOutcome, EngineError> {
    let updated = sqlx::query(
        "UPDATE payrolls SET status = 'approved', approved_by = ?, approved_at = ? \
         WHERE id = ? AND status = 'draft'",
    )
    .bind(actor_id)
    .bind(Utc::now())
    .bind(payroll_id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        let status = sqlx::query_scalar::<_, String>("SELECT status FROM payrolls WHERE id = ?")
            .bind(payroll_id)
            .fetch_optional(pool)
            .await?
            .ok_or(EngineError::not_found("payroll", payroll_id))?;
        if status == "approved" {
            return Ok(ApproveOutcome::AlreadyApproved);
        }
        return Err(EngineError::StateConflict(format!(
            "Payroll {payroll_id} is not approvable from status '{status}'"
        )));
    }

    log_action(
        pool,
        Some(actor_id),
        "approve_payroll",
        "payroll",
        payroll_id,
        Some(&format!("approved_by={actor_id}")),
    )
    .await;
    Ok(ApproveOutcome::Approved)
}

/// Approve every still-draft run among the given ids; returns how many
/// flipped. Already-approved runs are left alone.
pub async fn bulk_approve(
    pool: &MySqlPool,
    actor_id: u64,
    payroll_ids: &[u64],
) -> Result<u64, EngineError> {
    let mut tx = pool.begin().await?;
    let mut approved = 0u64;
    for &id in payroll_ids {
        let updated = sqlx::query(
            "UPDATE payrolls SET status = 'approved', approved_by = ?, approved_at = ? \
             WHERE id = ? AND status = 'draft'",
        )
        .bind(actor_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        approved += updated.rows_affected();
    }
    tx.commit().await?;

    for &id in payroll_ids {
        log_action(pool, Some(actor_id), "approve_payroll", "payroll", id, Some("bulk")).await;
    }
    Ok(approved)
}

#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    loan_id: u64,
    payment_id: u64,
}

/// Delete a draft run and restore loan progress: every posted payment goes
/// back to approved and its loan's counter steps back. Reversal and delete
/// are one transaction; a failed reversal aborts everything.
pub async fn delete_payroll(
    pool: &MySqlPool,
    actor_id: u64,
    payroll_id: u64,
) -> Result<(), EngineError> {
    let status = sqlx::query_scalar::<_, String>("SELECT status FROM payrolls WHERE id = ?")
        .bind(payroll_id)
        .fetch_optional(pool)
        .await?
        .ok_or(EngineError::not_found("payroll", payroll_id))?;
    if status == "approved" {
        return Err(EngineError::StateConflict(
            "Approved payroll is locked and cannot be deleted".into(),
        ));
    }

    let mut tx = pool.begin().await?;

    let links = sqlx::query_as::<_, LinkRow>(
        "SELECT loan_id, payment_id FROM payroll_loans WHERE payroll_id = ? ORDER BY id",
    )
    .bind(payroll_id)
    .fetch_all(&mut *tx)
    .await?;

    for link in &links {
        let reverted =
            sqlx::query("UPDATE payments SET status = 'approved' WHERE id = ? AND status = 'posted'")
                .bind(link.payment_id)
                .execute(&mut *tx)
                .await?;
        if reverted.rows_affected() == 0 {
            // Linked payment is no longer posted: the ledger would desync,
            // so the whole deletion aborts.
            return Err(EngineError::StateConflict(format!(
                "Payment {} is not in posted state; payroll deletion aborted",
                link.payment_id
            )));
        }
        loan_ledger::reverse_installment(&mut tx, link.loan_id).await?;
    }

    // payroll_loans rows go with the payroll (FK cascade). The status guard
    // repeats inside the transaction so a run approved after the pre-check
    // cannot be deleted.
    let deleted = sqlx::query("DELETE FROM payrolls WHERE id = ? AND status = 'draft'")
        .bind(payroll_id)
        .execute(&mut *tx)
        .await?;
    ensure_still_draft(deleted.rows_affected(), "deleted")?;

    tx.commit().await?;

    info!(payroll_id, reversed = links.len(), "Payroll deleted, installments restored");
    log_action(pool, Some(actor_id), "delete_payroll", "payroll", payroll_id, None).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parse_period_first_of_month() {
        assert_eq!(parse_period("2025-03"), Some(d(2025, 3, 1)));
        assert_eq!(parse_period("2025-13"), None);
        assert_eq!(parse_period(""), None);
        assert_eq!(parse_period("garbage"), None);
    }

    #[test]
    fn months_of_service_day_adjustment() {
        // 2024-01-15 to 2025-03-01: 14 raw months, end day 1 < hire day 15
        assert_eq!(months_of_service(d(2024, 1, 15), d(2025, 3, 1)), 13);
        // 2024-06-20 to 2025-03-01: 9 raw, minus 1 for the day rule
        assert_eq!(months_of_service(d(2024, 6, 20), d(2025, 3, 1)), 8);
    }

    #[test]
    fn months_of_service_floors_at_zero() {
        assert_eq!(months_of_service(d(2025, 6, 1), d(2025, 3, 1)), 0);
        assert_eq!(months_of_service(d(2025, 3, 1), d(2025, 3, 1)), 0);
    }

    #[test]
    fn thr_full_after_a_year() {
        let base = 5_000_000.0;
        let months = months_of_service(d(2024, 1, 15), d(2025, 3, 1));
        assert_eq!(months, 13);
        assert_eq!(thr_amount(base, months), base);
    }

    #[test]
    fn thr_pro_rated_under_a_year() {
        let base = 6_000_000.0;
        let months = months_of_service(d(2024, 6, 20), d(2025, 3, 1));
        assert_eq!(months, 8);
        assert_eq!(thr_amount(base, months), base * 8.0 / 12.0);
    }

    #[test]
    fn lost_draft_race_is_a_conflict() {
        assert!(ensure_still_draft(1, "edited").is_ok());
        let err = ensure_still_draft(0, "deleted").unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));
    }

    #[test]
    fn schedule_room_caps_selections_at_tenor() {
        // Fresh tenor-2 loan with four eligible selections: only the first
        // two fit the schedule, the rest are skipped.
        let tenor = 2;
        let mut accepted = 0;
        for _ in 0..4 {
            if schedule_has_room(0, accepted, tenor) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 2);
    }

    #[test]
    fn schedule_room_accounts_for_prior_installments() {
        assert!(schedule_has_room(5, 0, 6));
        assert!(!schedule_has_room(5, 1, 6));
        assert!(!schedule_has_room(6, 0, 6));
    }

    #[test]
    fn thr_skipped_without_flag_or_hire_date() {
        let fields = PayrollFields {
            base_salary: 5_000_000.0,
            bpjs_allowance: 0.0,
            meal_allowance: 0.0,
            transport_allowance: 0.0,
            other_allowance: 0.0,
            overtime_pay: 0.0,
            manual_deduction: 0.0,
            absence_days: 0,
            with_thr: false,
        };
        assert_eq!(resolve_thr(&fields, Some(d(2020, 1, 1)), "2025-03"), 0.0);

        let with_flag = PayrollFields { with_thr: true, ..fields };
        assert_eq!(resolve_thr(&with_flag, None, "2025-03"), 0.0);
        assert_eq!(
            resolve_thr(&with_flag, Some(d(2020, 1, 1)), "2025-03"),
            5_000_000.0
        );
    }
}
