use anyhow::Result;

pub mod config;
pub mod simulate;
pub mod steps;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

pub fn show_how_to_get_started() -> Result<()> {
    println!("🧭 Workforce Panel - gated task workflow");
    println!();
    println!("Commands:");
    println!("  📋 panel steps       # Steps, gates and branches");
    println!("  ▶️  panel simulate    # Walk one task through to review");
    println!("  ⚙️  panel config      # Effective configuration");
    println!();
    println!("💡 Try 'panel simulate --decline' for the declined identity path.");
    Ok(())
}
