/*!
Canal d'alerte enregistreur

Remplace le transport réel (log, MQTT) : garde chaque texte envoyé. La
disponibilité et l'échec d'envoi sont pilotables par le test.
*/

use async_trait::async_trait;
use netwatch_kernel::alerts::{AlertChannel, AlertError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct RecordingAlertChannel {
    sent: Mutex<Vec<String>>,
    ready: AtomicBool,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl Default for RecordingAlertChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingAlertChannel {
    /// Canal prêt, envois réussis
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            ready: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Les envois suivants échouent (non enregistrés, mais comptés en tentatives)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Textes effectivement livrés
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Livrés contenant `needle`
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.sent.lock().iter().filter(|t| t.contains(needle)).cloned().collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
        self.attempts.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl AlertChannel for RecordingAlertChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn send(&self, text: &str) -> Result<(), AlertError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.is_ready() {
            return Err(AlertError::NotReady);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AlertError::Transport("simulated delivery failure".into()));
        }
        tracing::debug!("[devkit] alert recorded: {}", text.lines().next().unwrap_or_default());
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}
