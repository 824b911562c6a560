use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Append-only record of a state-changing action.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AuditLog {
    pub id: u64,
    pub user_id: Option<u64>,

    #[schema(example = "create_payroll")]
    pub action: String,

    #[schema(example = "payroll")]
    pub entity_type: String,

    pub entity_id: u64,

    #[schema(example = "period=2025-03", nullable = true)]
    pub details: Option<String>,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
