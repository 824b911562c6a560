use sqlx::{MySql, MySqlPool, Transaction};

use crate::core::error::EngineError;
use crate::model::loan::total_value;

/// Sum of payment amounts that count toward the balance (approved or
/// posted). Explicit query instead of relation traversal.
pub async fn paid_amount(pool: &MySqlPool, loan_id: u64) -> Result<f64, sqlx::Error> {
    sqlx::query_scalar::<_, f64>(
        r#"
        SELECT COALESCE(SUM(payment_amount), 0)
        FROM payments
        WHERE loan_id = ? AND status IN ('approved', 'posted')
        "#,
    )
    .bind(loan_id)
    .fetch_one(pool)
    .await
}

/// Outstanding balance; never negative.
pub fn remaining(amount: f64, interest_rate: f64, paid: f64) -> f64 {
    (total_value(amount, interest_rate) - paid).max(0.0)
}

/// Advance repayment progress by one installment; reaching the tenor
/// completes the loan. No built-in dedup: the caller (the settlement
/// engine, via the matcher's anti-double-post check) guarantees at most
/// one call per real installment event. The increment is conditional on
/// the schedule having room, so the counter can never pass the tenor; a
/// full schedule is a state conflict that rolls the caller back.
pub async fn record_installment_paid(
    tx: &mut Transaction<'_, MySql>,
    loan_id: u64,
) -> Result<(), EngineError> {
    let advanced = sqlx::query(
        "UPDATE loans SET installments_paid = installments_paid + 1 \
         WHERE id = ? AND installments_paid < tenor",
    )
    .bind(loan_id)
    .execute(&mut **tx)
    .await?;
    if advanced.rows_affected() == 0 {
        return Err(EngineError::StateConflict(format!(
            "Loan {loan_id} has no installments left in its schedule"
        )));
    }

    sqlx::query(
        "UPDATE loans SET status = 'completed' WHERE id = ? AND installments_paid >= tenor",
    )
    .bind(loan_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Roll repayment progress back by one installment (floor 0); a completed
/// loan becomes approved again.
pub async fn reverse_installment(
    tx: &mut Transaction<'_, MySql>,
    loan_id: u64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE loans SET installments_paid = installments_paid - 1 \
         WHERE id = ? AND installments_paid > 0",
    )
    .bind(loan_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query("UPDATE loans SET status = 'approved' WHERE id = ? AND status = 'completed'")
        .bind(loan_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// In-process mirror of [`record_installment_paid`]: next progress counter
/// and whether the loan completes, or `None` when the schedule is already
/// full (the conditional update's zero-row outcome). Kept pure so the
/// ledger invariants are testable without storage.
pub fn apply_installment(installments_paid: i32, tenor: i32) -> Option<(i32, bool)> {
    if installments_paid >= tenor {
        return None;
    }
    let next = installments_paid + 1;
    Some((next, next >= tenor))
}

/// In-process mirror of [`reverse_installment`].
pub fn roll_back_installment(installments_paid: i32) -> i32 {
    (installments_paid - 1).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn remaining_never_negative() {
        // overpayment clamps at zero
        assert_eq!(remaining(1_000_000.0, 10.0, 2_000_000.0), 0.0);
    }

    #[test]
    fn remaining_counts_approved_and_posted_only() {
        // 1,000,000 at 10% over 10 months; one approved payment of 100,000
        assert_eq!(remaining(1_000_000.0, 10.0, 100_000.0), 1_000_000.0);
    }

    #[test]
    fn final_installment_completes_loan() {
        assert_eq!(apply_installment(9, 10), Some((10, true)));
        assert_eq!(apply_installment(0, 10), Some((1, false)));
    }

    #[test]
    fn full_schedule_rejects_further_installments() {
        // four small payments against a tenor-2 loan: the first two fill
        // the schedule, the rest bounce off the conditional update
        let mut paid = 0;
        let mut accepted = 0;
        for _ in 0..4 {
            if let Some((next, _)) = apply_installment(paid, 2) {
                paid = next;
                accepted += 1;
            }
        }
        assert_eq!(paid, 2);
        assert_eq!(accepted, 2);
        assert_eq!(apply_installment(2, 2), None);
    }

    #[test]
    fn reversal_floors_at_zero() {
        assert_eq!(roll_back_installment(1), 0);
        assert_eq!(roll_back_installment(0), 0);
    }

    proptest! {
        // 0 <= installments_paid <= tenor holds across any interleaving of
        // postings and reversals starting from a valid counter.
        #[test]
        fn progress_stays_within_bounds(
            tenor in 1i32..=60,
            ops in proptest::collection::vec(any::<bool>(), 0..200),
        ) {
            // no guard here: a full schedule must refuse the posting itself
            let mut paid = 0i32;
            for post in ops {
                if post {
                    if let Some((next, _)) = apply_installment(paid, tenor) {
                        paid = next;
                    }
                } else {
                    paid = roll_back_installment(paid);
                }
                prop_assert!(paid >= 0 && paid <= tenor);
            }
        }

        #[test]
        fn post_then_reverse_round_trips(paid in 0i32..60, tenor in 1i32..=60) {
            prop_assume!(paid < tenor);
            let (next, _) = apply_installment(paid, tenor).unwrap();
            prop_assert_eq!(roll_back_installment(next), paid);
        }

        #[test]
        fn remaining_is_never_negative_for_any_paid(
            amount in 0.0f64..1e9,
            rate in 0.0f64..100.0,
            paid in 0.0f64..1e10,
        ) {
            prop_assert!(remaining(amount, rate, paid) >= 0.0);
        }
    }
}
