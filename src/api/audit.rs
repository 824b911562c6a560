use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::core::error::EngineError;
use crate::model::audit::AuditLog;

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct AuditFilter {
    /// Filter by acting user
    pub user_id: Option<u64>,
    #[schema(example = "create_payroll")]
    pub action: Option<String>,
    #[schema(example = "payroll")]
    pub entity_type: Option<String>,
    #[schema(example = 1)]
    pub page: Option<u32>,
    #[schema(example = 20)]
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct AuditListResponse {
    pub data: Vec<AuditLog>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

enum FilterValue<'a> {
    U64(u64),
    Str(&'a str),
}

#[utoipa::path(
    get,
    path = "/api/v1/audit",
    params(AuditFilter),
    responses((status = 200, body = AuditListResponse)),
    security(("bearer_auth" = [])),
    tag = "Audit"
)]
pub async fn list_audit_logs(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AuditFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * per_page;

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(user_id) = query.user_id {
        where_sql.push_str(" AND user_id = ?");
        args.push(FilterValue::U64(user_id));
    }
    if let Some(action) = query.action.as_deref().filter(|a| !a.is_empty()) {
        where_sql.push_str(" AND action = ?");
        args.push(FilterValue::Str(action));
    }
    if let Some(entity) = query.entity_type.as_deref().filter(|e| !e.is_empty()) {
        where_sql.push_str(" AND entity_type = ?");
        args.push(FilterValue::Str(entity));
    }

    let count_sql = format!("SELECT COUNT(*) FROM audit_logs{}", where_sql);
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
        "SELECT * FROM audit_logs{} ORDER BY id DESC LIMIT ? OFFSET ?",
        where_sql
    );
    let mut data_q = sqlx::query_as::<_, AuditLog>(&data_sql);
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

    Ok(HttpResponse::Ok().json(AuditListResponse {
        data,
        page,
        per_page,
        total,
    }))
}
