//! Check-requirements command implementation.

use anyhow::bail;

use crate::config::Config;
use crate::startup_checks::validate_requirements;

/// Runs the startup checks and reports the result. Fails when a
/// requirement is not met.
pub fn command_check_requirements(config: &Config) -> anyhow::Result<()> {
    println!("🔍 Checking Runtime Requirements");
    println!("================================\n");

    match validate_requirements(&config.proc_root(), config.show_kernel.unwrap_or(false)) {
        Ok(()) => {
            println!("\n✅ All requirements met");
            Ok(())
        }
        Err(e) => {
            eprintln!("\n❌ Requirements check failed: {}", e);
            bail!(e)
        }
    }
}
