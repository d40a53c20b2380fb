//! `toolgate init` — Write the default config and policy files.

use toolgate_config::AppConfig;

pub fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🦀 toolgate — Setup");
    println!("===================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("   Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    // Loading writes the default global policy when it is missing.
    let engine = super::policy_engine(config)?;
    println!(
        "✅ Policy ready at: {} ({} rules)",
        engine.paths().global.display(),
        engine.rules().len()
    );
    if let Some(local) = &engine.paths().local {
        println!("   Local overrides are read from: {}", local.display());
    }

    println!("\n📝 Next steps:");
    println!("   1. Review the rules: toolgate policy show");
    println!("   2. Try a reply offline: toolgate parse reply.txt");
    println!("   3. Replay a session: toolgate replay transcript.json\n");
    Ok(())
}
