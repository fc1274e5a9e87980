//! Agent configuration, loadable from TOML.

use anyhow::bail;
use serde::Deserialize;
use vd_canbus::BusConfig;

use crate::scheduler::PollerConfig;

/// Top-level configuration for the agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// CAN controller and inbound queue settings.
    #[serde(default)]
    pub bus: BusConfig,
    /// OBD-II polling settings.
    #[serde(default)]
    pub poller: PollerConfig,
    /// State report interval in seconds.
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_report_interval() -> u64 {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            poller: PollerConfig::default(),
            report_interval_secs: default_report_interval(),
        }
    }
}

impl AgentConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Reject settings the bus or the poller cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let bus = &self.bus;
        if bus.tx_pin == bus.rx_pin {
            bail!("bus.tx_pin and bus.rx_pin must differ (both {})", bus.tx_pin);
        }
        if !(100_000..=1_000_000).contains(&bus.bitrate) {
            bail!("bus.bitrate {} outside 100000-1000000", bus.bitrate);
        }
        if bus.queue_depth == 0 {
            bail!("bus.queue_depth must be at least 1");
        }

        let poller = &self.poller;
        if !(100..=5000).contains(&poller.response_timeout_ms) {
            bail!(
                "poller.response_timeout_ms {} outside 100-5000",
                poller.response_timeout_ms
            );
        }
        if poller.pids.is_empty() {
            bail!("poller.pids must list at least one PID");
        }
        if let Some(pid) = poller.pids.iter().find(|&&p| vd_obd::pid::lookup(p).is_none()) {
            bail!("poller.pids contains unsupported PID 0x{pid:02X}");
        }

        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be at least 1");
        }
        Ok(())
    }
}
