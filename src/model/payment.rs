use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Posted,
    Rejected,
}

/// One installment payment against a loan. A payment counts toward the
/// remaining balance once approved, and toward a payroll once posted.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Payment {
    pub id: u64,
    pub loan_id: u64,

    #[schema(value_type = String, format = "date-time")]
    pub payment_date: DateTime<Utc>,

    #[schema(example = 110_000.0)]
    pub payment_amount: f64,

    #[schema(example = "pending")]
    pub status: String,
}
