use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "nik": "EMP0001",
        "name": "Budi Santoso",
        "position": "Supervisor",
        "address": "Jl. Melati No. 5",
        "phone": "+628123456789",
        "bank_account": "1234567890",
        "hire_date": "2024-01-15",
        "status": "active"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    pub user_id: Option<u64>,

    #[schema(example = "EMP0001")]
    pub nik: String,

    #[schema(example = "Budi Santoso")]
    pub name: String,

    #[schema(example = "Supervisor", nullable = true)]
    pub position: Option<String>,

    #[schema(nullable = true)]
    pub address: Option<String>,

    #[schema(example = "+628123456789", nullable = true)]
    pub phone: Option<String>,

    #[schema(example = "1234567890", nullable = true)]
    pub bank_account: Option<String>,

    #[schema(example = "2024-01-15", value_type = String, format = "date", nullable = true)]
    pub hire_date: Option<NaiveDate>,

    #[schema(example = "active")]
    pub status: String,
}
