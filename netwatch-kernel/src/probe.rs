/**
 * PROBE EXECUTOR - Un ping ICMP vers une adresse, statistiques comprises
 *
 * RÔLE :
 * Lance le binaire `ping` du système une fois, attend au plus le timeout,
 * puis extrait paquets envoyés/reçus et RTT moyen de la sortie texte.
 *
 * FONCTIONNEMENT :
 * - Arguments adaptés à la plateforme (Windows `-n/-w/-l`, POSIX `-c/-W/-s`)
 * - Parsing tolérant : sorties Windows et POSIX (anglais + portugais)
 * - Réponse sans temps lisible => latence sentinelle de 1ms
 * - Timeout / perte totale => `success=false`, perte 100%
 * - Binaire absent ou permission refusée => `ProbeError`, jamais un faux négatif
 */

use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;

/// Latence rapportée quand l'hôte a répondu mais qu'aucun temps n'est lisible
pub const RESPONDED_DEFAULT_LATENCY_MS: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid probe address: {0:?}")]
    InvalidAddress(String),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Résultat brut d'un ping
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub latency_ms: Option<u32>,
    pub packet_loss: u8,
    pub sent: u32,
    pub received: u32,
}

impl ProbeOutcome {
    pub fn total_loss(sent: u32) -> Self {
        Self {
            success: false,
            latency_ms: None,
            packet_loss: 100,
            sent,
            received: 0,
        }
    }
}

/// Capacité "sonder une adresse" : le ping système en production, un script en test
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    Windows,
    Posix,
}

/// Exécuteur basé sur le binaire `ping` de la machine
#[derive(Debug, Clone)]
pub struct PingExecutor {
    program: String,
    packets: u32,
    packet_size: u32,
    platform: Platform,
}

impl PingExecutor {
    pub fn new(packets: u32, packet_size: u32) -> Self {
        Self {
            program: "ping".to_string(),
            packets: packets.max(1),
            packet_size,
            platform: if cfg!(target_os = "windows") { Platform::Windows } else { Platform::Posix },
        }
    }

    /// Remplace le binaire lancé (chemin absolu, wrapper...)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, address: &str, timeout: Duration) -> Vec<String> {
        match self.platform {
            Platform::Windows => vec![
                "-n".into(),
                self.packets.to_string(),
                "-w".into(),
                timeout.as_millis().to_string(),
                "-l".into(),
                self.packet_size.to_string(),
                address.to_string(),
            ],
            Platform::Posix => {
                let secs = ((timeout.as_millis() as f64) / 1000.0).round().max(1.0) as u64;
                vec![
                    "-c".into(),
                    self.packets.to_string(),
                    "-W".into(),
                    secs.to_string(),
                    "-s".into(),
                    self.packet_size.to_string(),
                    address.to_string(),
                ]
            }
        }
    }
}

#[async_trait]
impl Prober for PingExecutor {
    async fn probe(&self, address: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        validate_address(address)?;

        // un paquet par seconde + attente de la dernière réponse
        let deadline = timeout + Duration::from_secs(self.packets as u64 + 1);
        let child = Command::new(&self.program)
            .args(self.args(address, timeout))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(deadline, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ProbeError::Spawn {
                    program: self.program.clone(),
                    source,
                })
            }
            Err(_) => {
                tracing::debug!("[probe] {} timed out after {:?}", address, deadline);
                return Ok(ProbeOutcome::total_loss(self.packets));
            }
        };

        // ping sort en code != 0 sur perte : on parse quand même
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            text.push('\n');
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        Ok(parse_ping_output(&text, self.packets))
    }
}

/// Refuse les adresses qui seraient interprétées comme des options de `ping`
pub fn validate_address(address: &str) -> Result<(), ProbeError> {
    let trimmed = address.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('-')
        || trimmed.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(ProbeError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

static WIN_PACKETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Packets|Pacotes): (?:Sent|Enviados) = (\d+), (?:Received|Recebidos) = (\d+)")
        .expect("static regex")
});
static WIN_AVERAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:Average|Média) = (\d+)ms").expect("static regex"));
static WIN_REPLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Reply from|Resposta de) .*?(?:time|tempo)[<=](\d+)ms").expect("static regex")
});
static POSIX_PACKETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) (?:packets transmitted|pacotes transmitidos), (\d+) (?:packets )?(?:received|recebidos)")
        .expect("static regex")
});
static POSIX_RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:rtt|round-trip) min/(?:avg|méd)/max(?:/(?:mdev|stddev))? = [\d.]+/([\d.]+)/")
        .expect("static regex")
});
static POSIX_REPLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time[=<]([\d.]+) ?ms").expect("static regex"));

/// Extrait les statistiques d'une sortie `ping`, quel que soit le dialecte.
///
/// `expected_sent` sert de valeur par défaut quand aucune ligne de résumé n'est trouvée.
pub fn parse_ping_output(output: &str, expected_sent: u32) -> ProbeOutcome {
    let mut sent = expected_sent;
    let mut received = 0u32;
    let mut average: Option<f64> = None;

    if let Some(caps) = WIN_PACKETS.captures(output) {
        sent = caps[1].parse().unwrap_or(expected_sent);
        received = caps[2].parse().unwrap_or(0);
        average = WIN_AVERAGE
            .captures(output)
            .and_then(|c| c[1].parse::<f64>().ok())
            .or_else(|| mean(WIN_REPLY.captures_iter(output).filter_map(|c| c[1].parse().ok())));
    } else if let Some(caps) = POSIX_PACKETS.captures(output) {
        sent = caps[1].parse().unwrap_or(expected_sent);
        received = caps[2].parse().unwrap_or(0);
        average = POSIX_RTT
            .captures(output)
            .and_then(|c| c[1].parse::<f64>().ok())
            .or_else(|| mean(POSIX_REPLY.captures_iter(output).filter_map(|c| c[1].parse().ok())));
    }

    let received = received.min(sent);
    let packet_loss = if sent > 0 {
        (((sent - received) as f64 / sent as f64) * 100.0).round() as u8
    } else {
        100
    };
    let success = received > 0;
    let latency_ms = match average {
        Some(avg) if success => Some(avg.round() as u32),
        None if success => Some(RESPONDED_DEFAULT_LATENCY_MS),
        _ => None,
    };

    ProbeOutcome {
        success,
        latency_ms,
        packet_loss,
        sent,
        received,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u32), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}
