use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::workflow::{GateRules, Step};

/// Main configuration structure for the workforce panel
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PanelConfig {
    /// Gating thresholds and workflow timings
    pub workflow: WorkflowConfig,
    /// Push channel and poll fallback timings
    pub sync: SyncConfig,
    /// SMS code tracker cadence
    pub sms: SmsConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Minimum whitespace separated tokens in a step note
    pub min_note_words: usize,
    /// KYC documents needed to leave the upload step
    pub required_kyc_documents: u32,
    /// Delay before the demo credentials count as viewed
    pub demo_reveal_delay_ms: u64,
    /// Steps at which an open SMS code request is waited on
    pub sms_wait_steps: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SyncConfig {
    /// How long the push channel has to confirm before polling starts
    pub push_confirm_timeout_ms: u64,
    /// Poll fallback interval
    pub poll_interval_ms: u64,
    /// Window after confirmation in which initial-load items raise no alert
    pub alert_grace_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SmsConfig {
    /// Refetch cadence while waiting on a code
    pub refresh_interval_secs: u64,
    /// Countdown tick
    pub countdown_tick_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level, used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of plain text
    pub json_logs: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            workflow: WorkflowConfig {
                min_note_words: 3,
                required_kyc_documents: 3,
                demo_reveal_delay_ms: 1500,
                sms_wait_steps: vec![Step::DOCUMENT_UPLOAD.value(), Step::SMS_CODE.value()],
            },
            sync: SyncConfig {
                push_confirm_timeout_ms: 5000,
                poll_interval_ms: 1500,
                alert_grace_ms: 1000,
            },
            sms: SmsConfig {
                refresh_interval_secs: 30,
                countdown_tick_ms: 1000,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
        }
    }
}

impl WorkflowConfig {
    pub fn gate_rules(&self) -> GateRules {
        GateRules {
            min_note_words: self.min_note_words,
            required_kyc_documents: self.required_kyc_documents,
        }
    }

    pub fn demo_reveal_delay(&self) -> Duration {
        Duration::from_millis(self.demo_reveal_delay_ms)
    }

    /// Wait steps as validated [`Step`]s; out of range entries are dropped.
    pub fn wait_steps(&self) -> Vec<Step> {
        self.sms_wait_steps.iter().filter_map(|s| Step::new(*s)).collect()
    }
}

impl SyncConfig {
    pub fn push_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.push_confirm_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn alert_grace(&self) -> Duration {
        Duration::from_millis(self.alert_grace_ms)
    }
}

impl SmsConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }
}

impl PanelConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (workforce-panel.toml, .workforce-panel-rc)
    /// 3. Environment variables (prefixed with WORKFORCE_PANEL_, `__` between levels)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&PanelConfig::default())?);

        if Path::new("workforce-panel.toml").exists() {
            builder = builder.add_source(File::with_name("workforce-panel"));
        }

        if Path::new(".workforce-panel-rc").exists() {
            builder = builder.add_source(File::new(".workforce-panel-rc", config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("WORKFORCE_PANEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let panel_config: PanelConfig = builder.build()?.try_deserialize()?;
        panel_config.validate()?;
        Ok(panel_config)
    }

    /// Defaults overlaid with a single TOML file; ignores the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let panel_config: PanelConfig = Config::builder()
            .add_source(Config::try_from(&PanelConfig::default())?)
            .add_source(File::from(path).format(config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        panel_config.validate()?;
        Ok(panel_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workflow.min_note_words == 0 {
            bail!("workflow.min_note_words must be at least 1");
        }
        if let Some(bad) = self
            .workflow
            .sms_wait_steps
            .iter()
            .find(|s| Step::new(**s).is_none())
        {
            bail!("workflow.sms_wait_steps contains {bad}, steps run from 1 to 9");
        }

        let intervals = [
            ("sync.push_confirm_timeout_ms", self.sync.push_confirm_timeout_ms),
            ("sync.poll_interval_ms", self.sync.poll_interval_ms),
            ("sms.refresh_interval_secs", self.sms.refresh_interval_secs),
            ("sms.countdown_tick_ms", self.sms.countdown_tick_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<PanelConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = PanelConfig::load_env_file();
        PanelConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static PanelConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
