//! Surveillance du fichier registre par date de modification.
//!
//! Pas de notify/inotify : le kernel interroge `poll` à intervalle fixe et
//! compare la mtime au dernier filigrane connu.

use crate::registry::DeviceRegistry;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

#[derive(Debug)]
pub enum WatchOutcome {
    Unchanged,
    /// Fichier modifié : nouveau registre (vide si illisible)
    Changed(DeviceRegistry),
    /// Fichier disparu depuis le dernier poll
    Missing,
}

#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    watermark: Option<SystemTime>,
}

impl ConfigWatcher {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            watermark: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Chargement de démarrage : pose le filigrane et rend le registre
    pub async fn load_initial(&mut self) -> DeviceRegistry {
        self.watermark = modified(&self.path).await;
        DeviceRegistry::load_or_empty(&self.path).await
    }

    pub async fn poll(&mut self) -> WatchOutcome {
        let current = modified(&self.path).await;
        if current == self.watermark {
            return WatchOutcome::Unchanged;
        }
        self.watermark = current;

        if current.is_none() {
            tracing::warn!("[watcher] {:?} disappeared", self.path);
            return WatchOutcome::Missing;
        }
        tracing::info!("[watcher] {:?} modified, reloading", self.path);
        WatchOutcome::Changed(DeviceRegistry::load_or_empty(&self.path).await)
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    match fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(mtime) => Some(mtime),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("[watcher] cannot stat {:?}: {}", path, e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn touch(path: &Path, body: &str, mtime: SystemTime) {
        std::fs::write(path, body).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    #[tokio::test]
    async fn detects_modification_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        touch(&path, r#"{"r1": {"ip": "10.0.0.1"}}"#, t0);

        let mut watcher = ConfigWatcher::new(&path);
        assert_eq!(watcher.load_initial().await.len(), 1);
        assert!(matches!(watcher.poll().await, WatchOutcome::Unchanged));

        touch(&path, r#"{"r1": {"ip": "10.0.0.1"}, "r2": {"ip": "10.0.0.2"}}"#, t0 + Duration::from_secs(5));
        match watcher.poll().await {
            WatchOutcome::Changed(reg) => assert_eq!(reg.len(), 2),
            other => panic!("expected change, got {:?}", other),
        }
        assert!(matches!(watcher.poll().await, WatchOutcome::Unchanged));
    }

    #[tokio::test]
    async fn older_mtime_still_counts_as_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        touch(&path, "{}", t0);

        let mut watcher = ConfigWatcher::new(&path);
        watcher.load_initial().await;
        touch(&path, r#"{"r1": {"ip": "10.0.0.1"}}"#, t0 - Duration::from_secs(60));
        assert!(matches!(watcher.poll().await, WatchOutcome::Changed(_)));
    }

    #[tokio::test]
    async fn removed_file_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(&path, "{}").unwrap();

        let mut watcher = ConfigWatcher::new(&path);
        watcher.load_initial().await;
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(watcher.poll().await, WatchOutcome::Missing));
        assert!(matches!(watcher.poll().await, WatchOutcome::Unchanged));
    }
}
