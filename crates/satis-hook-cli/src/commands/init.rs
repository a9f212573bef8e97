//! Init command implementation

use std::path::PathBuf;

use color_eyre::eyre::{eyre, Context, Result};
use satis_hook_config::SAMPLE_CONFIG;
use tracing::info;

/// Init command implementation
pub struct InitCommand {
    output_path: PathBuf,
    force: bool,
}

impl InitCommand {
    pub fn new(output_path: PathBuf, force: bool) -> Self {
        Self { output_path, force }
    }

    pub async fn execute(&self) -> Result<()> {
        info!("Initializing configuration file at {}", self.output_path.display());

        if self.output_path.exists() && !self.force {
            return Err(eyre!(
                "Configuration file already exists: {}. Use --force to overwrite.",
                self.output_path.display()
            ));
        }

        std::fs::write(&self.output_path, SAMPLE_CONFIG)
            .with_context(|| format!("Failed to write config to {}", self.output_path.display()))?;

        println!("✓ Created configuration file: {}", self.output_path.display());
        println!("\nNext steps:");
        println!("1. List your repositories and adjust satis_config");
        println!(
            "2. Run 'satis-hook -c {} validate --check-docker' to validate the configuration",
            self.output_path.display()
        );
        println!("3. Run 'satis-hook -c {}' to build and start listening", self.output_path.display());

        Ok(())
    }
}
