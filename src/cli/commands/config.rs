use anyhow::Result;

use super::Command;
use crate::config::PanelConfig;

pub struct ConfigCommand {
    pub path: Option<String>,
}

impl ConfigCommand {
    pub fn new(path: Option<String>) -> Self {
        Self { path }
    }

    fn resolve(&self) -> Result<PanelConfig> {
        match &self.path {
            Some(path) => PanelConfig::load_from_path(path),
            None => PanelConfig::load(),
        }
    }
}

impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        let config = self.resolve()?;
        print!("{}", toml::to_string_pretty(&config)?);
        Ok(())
    }
}
