/**
 * HISTORY LOG - Journal des transitions de statut
 *
 * RÔLE :
 * Une ligne JSON `{timestamp, device, status}` par changement de statut,
 * dans `<dir>/history.jsonl`. Sert à la route `/history` du dashboard.
 *
 * ROTATION :
 * - Avant chaque ajout, si le fichier dépasse `max_bytes` il est renommé en
 *   `history.jsonl.<unix-millis>`, horodaté par l'événement qui déclenche la
 *   rotation (milliseconde suivante si le nom est déjà pris)
 * - Seules les `max_backups` rotations les plus récentes sont conservées
 */

use crate::models::HistoryEvent;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const HISTORY_FILE: &str = "history.jsonl";

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct HistoryLog {
    dir: PathBuf,
    max_bytes: u64,
    max_backups: usize,
    write_lock: tokio::sync::Mutex<()>,
}

impl HistoryLog {
    pub fn new<P: Into<PathBuf>>(dir: P, max_bytes: u64, max_backups: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            max_backups,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub async fn append(&self, event: &HistoryEvent) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.dir).await?;
        self.rotate_if_needed(event.timestamp.timestamp_millis()).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn rotate_if_needed(&self, stamp: i64) -> Result<(), HistoryError> {
        let path = self.path();
        let size = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if size <= self.max_bytes {
            return Ok(());
        }

        let mut stamp = stamp.max(0);
        let mut backup = self.backup_path(stamp);
        while fs::try_exists(&backup).await? {
            stamp += 1;
            backup = self.backup_path(stamp);
        }
        fs::rename(&path, &backup).await?;
        tracing::info!("[history] rotated {:?} ({} bytes) to {:?}", path, size, backup);
        self.prune_backups().await
    }

    fn backup_path(&self, stamp: i64) -> PathBuf {
        self.dir.join(format!("{}.{}", HISTORY_FILE, stamp))
    }

    async fn prune_backups(&self) -> Result<(), HistoryError> {
        let mut backups = list_backups(&self.dir).await?;
        backups.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, path) in backups.into_iter().skip(self.max_backups) {
            fs::remove_file(&path).await?;
            tracing::debug!("[history] pruned {:?}", path);
        }
        Ok(())
    }

    /// Événements du fichier courant, plus récents en premier
    pub async fn recent(&self, device: Option<&str>, limit: usize) -> Result<Vec<HistoryEvent>, HistoryError> {
        let text = match fs::read_to_string(self.path()).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let events = text
            .lines()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<HistoryEvent>(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("[history] skipping unreadable line: {}", e);
                    None
                }
            })
            .filter(|event| device.is_none_or(|name| event.device == name))
            .take(limit)
            .collect();
        Ok(events)
    }
}

async fn list_backups(dir: &Path) -> Result<Vec<(u64, PathBuf)>, HistoryError> {
    let prefix = format!("{}.", HISTORY_FILE);
    let mut entries = fs::read_dir(dir).await?;
    let mut backups = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(stamp) = name.strip_prefix(&prefix).and_then(|s| s.parse::<u64>().ok()) {
            backups.push((stamp, entry.path()));
        }
    }
    Ok(backups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceStatus;
    use chrono::{DateTime, TimeZone, Utc};

    fn event(device: &str, status: DeviceStatus) -> HistoryEvent {
        event_at(Utc::now(), device, status)
    }

    fn event_at(timestamp: DateTime<Utc>, device: &str, status: DeviceStatus) -> HistoryEvent {
        HistoryEvent {
            timestamp,
            device: device.into(),
            status,
        }
    }

    #[tokio::test]
    async fn appends_and_reads_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path(), 1024 * 1024, 3);
        log.append(&event("r1", DeviceStatus::Offline)).await.unwrap();
        log.append(&event("cam", DeviceStatus::Online)).await.unwrap();
        log.append(&event("r1", DeviceStatus::Online)).await.unwrap();

        let all = log.recent(None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].device, "r1");
        assert_eq!(all[0].status, DeviceStatus::Online);

        let r1 = log.recent(Some("r1"), 1).await.unwrap();
        assert_eq!(r1.len(), 1);
        assert_eq!(r1[0].status, DeviceStatus::Online);
    }

    #[tokio::test]
    async fn rotates_and_keeps_newest_backups() {
        let dir = tempfile::tempdir().unwrap();
        for stamp in [100u64, 200, 300] {
            std::fs::write(dir.path().join(format!("history.jsonl.{}", stamp)), "{}\n").unwrap();
        }
        let log = HistoryLog::new(dir.path(), 10, 3);
        log.append(&event("r1", DeviceStatus::Offline)).await.unwrap();
        log.append(&event("r1", DeviceStatus::Online)).await.unwrap();

        let mut backups = list_backups(dir.path()).await.unwrap();
        backups.sort();
        assert_eq!(backups.len(), 3);
        assert!(backups.iter().all(|(stamp, _)| *stamp != 100));

        let current = log.recent(None, 10).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].status, DeviceStatus::Online);
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("nope"), 10, 3);
        assert!(log.recent(None, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn backup_name_follows_event_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let stamp = at.timestamp_millis() as u64;
        let log = HistoryLog::new(dir.path(), 10, 5);

        for _ in 0..3 {
            log.append(&event_at(at, "r1", DeviceStatus::Offline)).await.unwrap();
        }

        let mut stamps: Vec<u64> = list_backups(dir.path()).await.unwrap().into_iter().map(|(s, _)| s).collect();
        stamps.sort();
        assert_eq!(stamps, vec![stamp, stamp + 1]);
    }
}
