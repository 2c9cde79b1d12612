/*!
Prober scripté pour tester le moteur sans binaire `ping` ni réseau

Chaque adresse a une réponse par défaut (joignable par défaut), éventuellement
précédée d'une file de réponses à consommer dans l'ordre. Tous les appels sont
comptés.
*/

use async_trait::async_trait;
use netwatch_kernel::probe::{ProbeError, ProbeOutcome, Prober};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

const SCRIPTED_PACKETS: u32 = 3;

/// Réponse simulée pour un ping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Joignable avec cette latence (ms)
    Up(u32),
    /// Aucune réponse, perte totale
    Down,
    /// Échec d'exécution (binaire absent, permission...)
    Fail,
}

#[derive(Default)]
struct Script {
    defaults: HashMap<String, Reply>,
    queued: HashMap<String, VecDeque<Reply>>,
    calls: HashMap<String, usize>,
    timeouts: Vec<Duration>,
    delay: Duration,
}

#[derive(Default)]
pub struct ScriptedProber {
    script: Mutex<Script>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Réponse permanente pour `address`
    pub fn set(&self, address: &str, reply: Reply) {
        self.script.lock().defaults.insert(address.to_string(), reply);
    }

    /// Réponse à consommer avant la réponse permanente
    pub fn push(&self, address: &str, reply: Reply) {
        self.script
            .lock()
            .queued
            .entry(address.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Délai simulé de chaque ping
    pub fn set_delay(&self, delay: Duration) {
        self.script.lock().delay = delay;
    }

    pub fn calls(&self, address: &str) -> usize {
        self.script.lock().calls.get(address).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.script.lock().calls.values().sum()
    }

    /// Timeouts demandés, dans l'ordre des appels
    pub fn timeouts(&self) -> Vec<Duration> {
        self.script.lock().timeouts.clone()
    }

    pub fn reset_calls(&self) {
        let mut script = self.script.lock();
        script.calls.clear();
        script.timeouts.clear();
    }

    fn next_reply(&self, address: &str, timeout: Duration) -> (Reply, Duration) {
        let mut script = self.script.lock();
        *script.calls.entry(address.to_string()).or_default() += 1;
        script.timeouts.push(timeout);
        let queued = script.queued.get_mut(address).and_then(VecDeque::pop_front);
        let reply = queued
            .or_else(|| script.defaults.get(address).copied())
            .unwrap_or(Reply::Up(1));
        (reply, script.delay)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, address: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        let (reply, delay) = self.next_reply(address, timeout);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Reply::Up(latency) => Ok(ProbeOutcome {
                success: true,
                latency_ms: Some(latency),
                packet_loss: 0,
                sent: SCRIPTED_PACKETS,
                received: SCRIPTED_PACKETS,
            }),
            Reply::Down => Ok(ProbeOutcome::total_loss(SCRIPTED_PACKETS)),
            Reply::Fail => Err(ProbeError::Spawn {
                program: "ping".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_replies_come_first() {
        let prober = ScriptedProber::new();
        prober.set("10.0.0.1", Reply::Down);
        prober.push("10.0.0.1", Reply::Up(5));

        let first = prober.probe("10.0.0.1", Duration::from_secs(1)).await.unwrap();
        let second = prober.probe("10.0.0.1", Duration::from_secs(1)).await.unwrap();
        assert!(first.success);
        assert!(!second.success);
        assert_eq!(prober.calls("10.0.0.1"), 2);
    }

    #[tokio::test]
    async fn unknown_address_is_reachable() {
        let prober = ScriptedProber::new();
        assert!(prober.probe("10.9.9.9", Duration::from_secs(1)).await.unwrap().success);
        prober.set("10.9.9.9", Reply::Fail);
        assert!(prober.probe("10.9.9.9", Duration::from_secs(1)).await.is_err());
    }
}
