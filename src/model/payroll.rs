use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayrollStatus {
    Draft,
    Approved,
}

/// One payroll run for one employee and pay period. Immutable once approved.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Payroll {
    pub id: u64,
    pub employee_id: u64,

    /// "YYYY-MM"; lexicographic order matches chronological order.
    #[schema(example = "2025-03")]
    pub pay_period: String,

    pub base_salary: f64,
    pub bpjs_allowance: f64,
    pub meal_allowance: f64,
    pub transport_allowance: f64,
    pub other_allowance: f64,
    pub overtime_pay: f64,
    pub thr: f64,
    pub manual_deduction: f64,
    pub absence_days: i32,
    pub loan_deduction: f64,

    #[schema(example = "draft")]
    pub status: String,
    pub approved_by: Option<u64>,

    #[schema(value_type = String, format = "date-time", nullable = true)]
    pub approved_at: Option<DateTime<Utc>>,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// SQL rendition of [`Payroll::take_home_pay`]. Must stay arithmetically
/// identical to the in-process method; dashboards aggregate over it.
pub const TAKE_HOME_PAY_SQL: &str = "(base_salary + bpjs_allowance + meal_allowance + transport_allowance + other_allowance + overtime_pay + thr) \
     - (manual_deduction + loan_deduction + (absence_days * (base_salary / 30)))";

/// SQL rendition of [`Payroll::total_deductions`].
pub const TOTAL_DEDUCTIONS_SQL: &str =
    "(manual_deduction + loan_deduction + (absence_days * (base_salary / 30)))";

impl Payroll {
    pub fn earnings(&self) -> f64 {
        self.base_salary
            + self.bpjs_allowance
            + self.meal_allowance
            + self.transport_allowance
            + self.other_allowance
            + self.overtime_pay
            + self.thr
    }

    pub fn absence_penalty(&self) -> f64 {
        self.absence_days as f64 * (self.base_salary / 30.0)
    }

    pub fn total_deductions(&self) -> f64 {
        self.manual_deduction + self.loan_deduction + self.absence_penalty()
    }

    pub fn take_home_pay(&self) -> f64 {
        self.earnings() - self.total_deductions()
    }

    pub fn is_approved(&self) -> bool {
        self.status == PayrollStatus::Approved.to_string()
    }
}

/// Join row linking a posted payment into a payroll run. Created only at
/// draft creation, removed only with its payroll (cascade).
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PayrollLoan {
    pub id: u64,
    pub payroll_id: u64,
    pub loan_id: u64,
    pub payment_id: u64,
    pub installment_number: i32,
    pub amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn payroll(base: f64, absence: i32) -> Payroll {
        Payroll {
            id: 1,
            employee_id: 1,
            pay_period: "2025-03".into(),
            base_salary: base,
            bpjs_allowance: 0.0,
            meal_allowance: 0.0,
            transport_allowance: 0.0,
            other_allowance: 0.0,
            overtime_pay: 0.0,
            thr: 0.0,
            manual_deduction: 0.0,
            absence_days: absence,
            loan_deduction: 0.0,
            status: "draft".into(),
            approved_by: None,
            approved_at: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn absence_penalty_is_daily_rate_times_days() {
        let p = payroll(3_000_000.0, 2);
        assert_eq!(p.absence_penalty(), 200_000.0);
        assert_eq!(p.take_home_pay(), 2_800_000.0);
    }

    #[test]
    fn take_home_pay_full_formula() {
        let mut p = payroll(5_000_000.0, 0);
        p.meal_allowance = 500_000.0;
        p.transport_allowance = 300_000.0;
        p.overtime_pay = 200_000.0;
        p.thr = 1_000_000.0;
        p.manual_deduction = 100_000.0;
        p.loan_deduction = 250_000.0;
        assert_eq!(p.take_home_pay(), 6_650_000.0);
        assert_eq!(p.total_deductions(), 350_000.0);
    }

    proptest! {
        // take_home_pay must evaluate identically in-process and as the SQL
        // expression; this mirrors TAKE_HOME_PAY_SQL term for term.
        #[test]
        fn take_home_pay_matches_sql_expression(
            base in 0.0f64..1e9,
            bpjs in 0.0f64..1e7,
            meal in 0.0f64..1e7,
            transport in 0.0f64..1e7,
            other in 0.0f64..1e7,
            overtime in 0.0f64..1e7,
            thr in 0.0f64..1e9,
            manual in 0.0f64..1e7,
            loan in 0.0f64..1e7,
            absence in 0i32..31,
        ) {
            let mut p = payroll(base, absence);
            p.bpjs_allowance = bpjs;
            p.meal_allowance = meal;
            p.transport_allowance = transport;
            p.other_allowance = other;
            p.overtime_pay = overtime;
            p.thr = thr;
            p.manual_deduction = manual;
            p.loan_deduction = loan;

            let sql_shaped = (base + bpjs + meal + transport + other + overtime + thr)
                - (manual + loan + (absence as f64 * (base / 30.0)));
            prop_assert_eq!(p.take_home_pay(), sql_shaped);

            let sql_deductions = manual + loan + (absence as f64 * (base / 30.0));
            prop_assert_eq!(p.total_deductions(), sql_deductions);
        }
    }
}
