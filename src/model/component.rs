use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Base,
    Allowance,
    Deduction,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CalcType {
    Fixed,
    Percentage,
}

/// Catalog entry for a pay rule. Never hard-deleted once assigned.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct CompensationComponent {
    pub id: u64,

    #[schema(example = "MEAL")]
    pub code: String,

    #[schema(example = "Meal allowance")]
    pub name: String,

    #[schema(example = "allowance")]
    pub comp_type: String,

    #[schema(example = "fixed")]
    pub calc_type: String,

    #[schema(example = 500_000.0)]
    pub default_value: f64,

    pub active: bool,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// Binds a component to an employee, optionally overriding the catalog value
/// from a given start period onward.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct EmployeeCompensation {
    pub id: u64,
    pub employee_id: u64,
    pub component_id: u64,

    /// None means the component's default_value applies.
    pub value: Option<f64>,

    /// "YYYY-MM"; None means the assignment applies to every period.
    #[schema(example = "2025-01", nullable = true)]
    pub start_period: Option<String>,

    pub active: bool,
}
