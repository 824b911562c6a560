use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::component::{CompensationComponent, EmployeeCompensation};

// One backup at a time; an overlapping tick skips instead of queueing.
static BACKUP_LOCK: Mutex<()> = Mutex::new(());

/// Periodic JSON snapshot of the pay configuration (component catalog and
/// per-employee assignments). Payroll rows are never part of the snapshot.
pub async fn run_backup_loop(pool: MySqlPool, config: Config) {
    let interval = Duration::from_secs(config.backup_interval_hours * 3600);
    let poll = Duration::from_secs(config.backup_poll_secs.max(1));

    loop {
        if backup_due(&config.backup_dir, interval) {
            match BACKUP_LOCK.try_lock() {
                Ok(_guard) => {
                    if let Err(e) = snapshot(&pool, &config).await {
                        warn!(error = %e, "Settings backup failed");
                    }
                }
                Err(_) => info!("Backup already in progress, skipping this tick"),
            }
        }
        actix_web::rt::time::sleep(poll).await;
    }
}

fn backup_due(dir: &str, interval: Duration) -> bool {
    match latest_backup_age(dir) {
        Some(age) => age >= interval,
        None => true,
    }
}

fn latest_backup_age(dir: &str) -> Option<Duration> {
    let entries = fs::read_dir(dir).ok()?;
    let newest = entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".json"))
        .filter_map(|e| e.metadata().ok()?.modified().ok())
        .max()?;
    newest.elapsed().ok()
}

async fn snapshot(pool: &MySqlPool, config: &Config) -> anyhow::Result<()> {
    fs::create_dir_all(&config.backup_dir)?;

    let components = sqlx::query_as::<_, CompensationComponent>(
        "SELECT * FROM compensation_components ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    let assignments = sqlx::query_as::<_, EmployeeCompensation>(
        "SELECT * FROM employee_compensations ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let path = Path::new(&config.backup_dir).join(format!("settings-{stamp}.json"));
    let body = json!({
        "taken_at": Utc::now(),
        "components": components,
        "assignments": assignments,
    });
    fs::write(&path, serde_json::to_vec_pretty(&body)?)?;
    info!(path = %path.display(), "Settings backup written");

    prune(&config.backup_dir, config.backup_retention)?;
    Ok(())
}

fn prune(dir: &str, retention: usize) -> anyhow::Result<()> {
    let mut files: Vec<_> = fs::read_dir(dir)?
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".json"))
        .collect();
    files.sort_by_key(|e| e.file_name());

    while files.len() > retention {
        let old = files.remove(0);
        fs::remove_file(old.path())?;
        info!(file = %old.path().display(), "Pruned old backup");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dir_means_backup_is_due() {
        assert!(backup_due("definitely/not/a/dir", Duration::from_secs(60)));
    }

    #[test]
    fn prune_keeps_newest_files() {
        let dir = std::env::temp_dir().join(format!("backup-prune-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for i in 0..5 {
            fs::write(dir.join(format!("settings-{i}.json")), b"{}").unwrap();
        }
        prune(dir.to_str().unwrap(), 2).unwrap();
        let left = fs::read_dir(&dir).unwrap().count();
        fs::remove_dir_all(&dir).unwrap();
        assert_eq!(left, 2);
    }
}
