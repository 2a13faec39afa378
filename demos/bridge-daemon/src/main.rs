use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use switchboard::dispatch::{ConsumerError, DispatchConsumers, EventArchive, TicketSink};
use switchboard::protocol::{AccountId, InboundMessage};
use switchboard::session::SessionState;
use switchboard::transport::{WsBridgeConfig, WsBridgeProvider};
use switchboard::{MemoryAccountStore, Switchboard, SwitchboardBuilder, SwitchboardConfig};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// `SwitchboardConfig` plus the bridge settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct DaemonConfig {
    bridge_url: String,
    liveness_timeout_secs: u64,
    /// How often pending pairing codes are logged for the operator.
    pairing_report_secs: u64,
    #[serde(flatten)]
    switchboard: SwitchboardConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let bridge = WsBridgeConfig::default();
        Self {
            bridge_url: bridge.base_url,
            liveness_timeout_secs: bridge.liveness_timeout.as_secs(),
            pairing_report_secs: 15,
            switchboard: SwitchboardConfig::default(),
        }
    }
}

impl DaemonConfig {
    fn bridge(&self) -> WsBridgeConfig {
        WsBridgeConfig {
            base_url: self.bridge_url.clone(),
            liveness_timeout: Duration::from_secs(self.liveness_timeout_secs.max(1)),
        }
    }
}

fn load_config() -> Result<DaemonConfig, Box<dyn std::error::Error>> {
    match std::env::var("SWITCHBOARD_CONFIG") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&json)?)
        }
        Err(_) => Ok(DaemonConfig::default()),
    }
}

// ---------------------------------------------------------------------------
// Consumers
// ---------------------------------------------------------------------------

/// Writes every inbound message to the log.
struct LogArchive;

#[async_trait]
impl EventArchive for LogArchive {
    async fn archive(&self, account: AccountId, message: &InboundMessage) -> Result<(), ConsumerError> {
        tracing::info!(
            %account,
            id = %message.id,
            from = %message.from,
            kind = ?message.kind,
            "message received"
        );
        Ok(())
    }
}

/// Stands in for a ticketing backend.
struct LogTickets;

#[async_trait]
impl TicketSink for LogTickets {
    async fn submit(&self, account: AccountId, message: &InboundMessage) -> Result<(), ConsumerError> {
        tracing::info!(%account, from = %message.from, body = %message.body, "ticket submitted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn report_pairing_codes(switchboard: &Switchboard<WsBridgeProvider, MemoryAccountStore>) {
    for summary in switchboard.list_active_accounts().await {
        if summary.state != SessionState::AwaitingScan {
            continue;
        }
        if let Some(code) = switchboard.get_credential_artifact(summary.account_id).await {
            tracing::info!(account = %summary.account_id, name = %summary.name, code = %code.text, "waiting for scan");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = load_config()?;
    tracing::info!(bridge = %config.bridge_url, accounts = config.switchboard.accounts.len(), "starting bridge daemon");

    let consumers = DispatchConsumers::new()
        .with_archive(Arc::new(LogArchive))
        .with_tickets(Arc::new(LogTickets));
    let store = MemoryAccountStore::new(config.switchboard.accounts.clone());
    let switchboard = SwitchboardBuilder::new()
        .config(&config.switchboard)
        .consumers(consumers)
        .build(WsBridgeProvider::new(config.bridge()), store);

    switchboard.start().await?;

    let mut report = tokio::time::interval(Duration::from_secs(config.pairing_report_secs.max(1)));
    loop {
        tokio::select! {
            _ = report.tick() => report_pairing_codes(&switchboard).await,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("shutting down");
    switchboard.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_config_flattens_switchboard_sections() {
        let config: DaemonConfig = serde_json::from_str(
            r#"{
                "bridge_url": "ws://bridge:3100",
                "session": {"reconnect_grace_secs": 5},
                "accounts": [{"account_id": 9, "name": "florist", "status": "active"}]
            }"#,
        )
        .unwrap();

        assert_eq!(config.bridge().base_url, "ws://bridge:3100");
        assert_eq!(config.bridge().liveness_timeout, Duration::from_secs(10));
        assert_eq!(config.switchboard.session.reconnect_grace_secs, 5);
        assert_eq!(config.switchboard.accounts.len(), 1);
    }

    #[test]
    fn test_daemon_config_empty_object_uses_defaults() {
        let config: DaemonConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.bridge_url, "ws://127.0.0.1:3100");
        assert_eq!(config.pairing_report_secs, 15);
        assert!(config.switchboard.accounts.is_empty());
    }
}
