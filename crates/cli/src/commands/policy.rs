//! `toolgate policy` — Inspect and edit security policy rules.

use toolgate_config::AppConfig;
use toolgate_security::{Action, normalize_args};

pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::policy_engine(config)?;
    let rules = engine.rules();

    println!("Policy file: {}", engine.active_path().display());
    println!();
    if rules.is_empty() {
        println!("   (no rules — every call is escalated)");
        return Ok(());
    }

    let width = rules.iter().map(|r| r.pattern.len()).max().unwrap_or(0).max(7);
    println!("   {:<width$}  ACTION", "PATTERN");
    for rule in &rules {
        println!("   {:<width$}  {}", rule.pattern, rule.action);
    }
    Ok(())
}

pub fn check(config: &AppConfig, tool: &str, args: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::policy_engine(config)?;
    let normalized = normalize_args(args);
    let action = engine.check(tool, args);

    println!("Command:  {}", normalized.full_command(tool));
    if !normalized.has_subcommand() {
        println!("          (no subcommand found — allow rules do not apply)");
    }
    println!("Decision: {action}");
    Ok(())
}

pub fn add(config: &AppConfig, pattern: &str, action: Action) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::policy_engine(config)?;
    engine.add_rule(pattern, action)?;
    println!("✅ {pattern} → {action}");
    println!("   Saved to {}", engine.active_path().display());
    Ok(())
}

pub fn suggest(config: &AppConfig, tool: &str, args: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::policy_engine(config)?;
    println!("{}", engine.suggested_pattern(tool, args));
    Ok(())
}
