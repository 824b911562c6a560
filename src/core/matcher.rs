use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

/// An approved, not-yet-posted payment row joined with its loan's progress.
#[derive(Debug, sqlx::FromRow)]
pub struct EligibleRow {
    pub payment_id: u64,
    pub loan_id: u64,
    pub payment_amount: f64,
    pub payment_date: DateTime<Utc>,
    pub installments_paid: i32,
}

/// A payment eligible for posting into a new payroll run, with its advisory
/// installment number. Authoritative progress stays on the loan.
#[derive(Debug, Serialize, ToSchema)]
pub struct CandidateInstallment {
    pub payment_id: u64,
    pub loan_id: u64,

    /// Display-only: loan progress + 1-based position within this call.
    #[schema(example = 3)]
    pub installment_number: i32,

    pub amount: f64,

    #[schema(value_type = String, format = "date-time")]
    pub payment_date: DateTime<Utc>,
}

/// Approved payments of the employee's loans that appear in no payroll_loans
/// row, oldest first. The anti-double-post check is on payment id, never on
/// amount or date.
pub async fn eligible_payments(
    pool: &MySqlPool,
    employee_id: u64,
) -> Result<Vec<CandidateInstallment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, EligibleRow>(
        r#"
        SELECT p.id AS payment_id, p.loan_id, p.payment_amount, p.payment_date,
               l.installments_paid
        FROM payments p
        JOIN loans l ON l.id = p.loan_id
        WHERE l.employee_id = ?
          AND p.status = 'approved'
          AND p.id NOT IN (SELECT payment_id FROM payroll_loans)
        ORDER BY p.payment_date ASC
        "#,
    )
    .bind(employee_id)
    .fetch_all(pool)
    .await?;

    Ok(number_candidates(rows))
}

/// Assign per-loan sequence numbers: the Nth eligible payment of a loan in
/// this list gets installments_paid + N.
pub fn number_candidates(rows: Vec<EligibleRow>) -> Vec<CandidateInstallment> {
    let mut per_loan: HashMap<u64, i32> = HashMap::new();
    rows.into_iter()
        .map(|r| {
            let seq = per_loan.entry(r.loan_id).or_insert(0);
            *seq += 1;
            CandidateInstallment {
                payment_id: r.payment_id,
                loan_id: r.loan_id,
                installment_number: r.installments_paid + *seq,
                amount: r.payment_amount,
                payment_date: r.payment_date,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(payment_id: u64, loan_id: u64, paid: i32) -> EligibleRow {
        EligibleRow {
            payment_id,
            loan_id,
            payment_amount: 110_000.0,
            payment_date: DateTime::<Utc>::UNIX_EPOCH,
            installments_paid: paid,
        }
    }

    #[test]
    fn numbering_continues_from_loan_progress() {
        // loan 1 already has 2 installments paid; loan 2 has none
        let rows = vec![row(10, 1, 2), row(11, 2, 0), row(12, 1, 2)];
        let out = number_candidates(rows);
        assert_eq!(out[0].installment_number, 3);
        assert_eq!(out[1].installment_number, 1);
        assert_eq!(out[2].installment_number, 4);
    }

    #[test]
    fn order_is_preserved() {
        let rows = vec![row(5, 1, 0), row(6, 1, 0)];
        let out = number_candidates(rows);
        assert_eq!(out[0].payment_id, 5);
        assert_eq!(out[1].payment_id, 6);
    }
}
