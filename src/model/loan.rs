use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

/// Employee loan with a simple-interest installment schedule.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Loan {
    pub id: u64,
    pub employee_id: u64,

    /// Principal.
    #[schema(example = 1_000_000.0)]
    pub amount: f64,

    /// Schedule length in months.
    #[schema(example = 10)]
    pub tenor: i32,

    /// Simple interest, percent of principal (not compounding).
    #[schema(example = 10.0)]
    pub interest_rate: f64,

    /// Monthly installment, fixed at application time.
    #[schema(example = 110_000.0)]
    pub installment: f64,

    #[schema(example = "pending")]
    pub status: String,

    #[schema(value_type = String, format = "date-time")]
    pub application_date: DateTime<Utc>,

    #[schema(value_type = String, format = "date-time", nullable = true)]
    pub approval_date: Option<DateTime<Utc>>,

    pub reason: Option<String>,

    /// Authoritative repayment progress; 0 ≤ installments_paid ≤ tenor.
    pub installments_paid: i32,
}

/// Principal plus simple interest.
pub fn total_value(amount: f64, interest_rate: f64) -> f64 {
    amount + (amount * interest_rate / 100.0)
}

/// Fixed monthly installment for a new application.
pub fn installment_amount(amount: f64, interest_rate: f64, tenor: i32) -> f64 {
    total_value(amount, interest_rate) / tenor as f64
}

impl Loan {
    pub fn total_value(&self) -> f64 {
        total_value(self.amount, self.interest_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installment_splits_principal_plus_interest() {
        // 1,000,000 over 10 months at 10% -> total 1,100,000, 110,000/month
        assert_eq!(total_value(1_000_000.0, 10.0), 1_100_000.0);
        assert_eq!(installment_amount(1_000_000.0, 10.0, 10), 110_000.0);
    }

    #[test]
    fn zero_rate_loan_splits_principal_only() {
        assert_eq!(installment_amount(600_000.0, 0.0, 6), 100_000.0);
    }
}
