use sqlx::MySqlPool;
use tracing::warn;

/// Append one audit row. Called after the business transaction commits;
/// a failure here is logged and swallowed, it never rolls the settlement
/// back. The sink receives facts and never re-derives them.
pub async fn log_action(
    pool: &MySqlPool,
    actor_id: Option<u64>,
    action: &str,
    entity_type: &str,
    entity_id: u64,
    details: Option<&str>,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_logs (user_id, action, entity_type, entity_id, details)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(actor_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(details)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!(error = %e, action, entity_type, entity_id, "Audit log write failed");
    }
}
