use anyhow::Result;
use clap::Parser;

use workforce_panel::cli::commands::config::ConfigCommand;
use workforce_panel::cli::commands::simulate::SimulateCommand;
use workforce_panel::cli::commands::steps::StepsCommand;
use workforce_panel::cli::commands::{show_how_to_get_started, Command};
use workforce_panel::cli::{Cli, Commands};
use workforce_panel::config::PanelConfig;
use workforce_panel::telemetry::{init_telemetry, shutdown_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = PanelConfig::load_env_file();
    let config = PanelConfig::load()?;
    init_telemetry(&config.observability)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = match cli.command {
        None => show_how_to_get_started(),
        Some(Commands::Steps) => runtime.block_on(StepsCommand::new(config).execute()),
        Some(Commands::Simulate {
            skip_identity,
            decline,
        }) => runtime.block_on(
            SimulateCommand::new(config)
                .with_skip_identity(skip_identity)
                .with_decline(decline)
                .execute(),
        ),
        Some(Commands::Config { path }) => runtime.block_on(ConfigCommand::new(path).execute()),
    };

    shutdown_telemetry();
    result
}
