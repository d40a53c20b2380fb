//! `toolgate sanitize` — Show how raw arguments are repaired and tokenized.

use toolgate_config::AppConfig;
use toolgate_tools::coder;
use toolgate_tools::{ArgsError, sanitize_args};

pub fn run(config: &AppConfig, tool: &str, args: &str) {
    let sanitized = sanitize_args(args);
    println!("Sanitized: {}", sanitized.text);
    if sanitized.fixes.is_empty() {
        println!("   (no changes)");
    }
    for fix in &sanitized.fixes {
        println!("   fix: {fix}");
    }

    let mut argv = match coder::build_argv(&sanitized.text) {
        Ok(argv) => argv,
        Err(e) => {
            println!("❌ {e}");
            return;
        }
    };
    println!("Tokens:    {argv:?}");

    if tool != config.agent.designated_tool {
        return;
    }
    match coder::repair_and_validate(&mut argv) {
        Ok(fixes) => {
            for fix in &fixes {
                println!("   repair: {fix}");
            }
            if !fixes.is_empty() {
                println!("Repaired:  {argv:?}");
            }
            println!("✅ Valid {tool} call");
        }
        Err(e) => println!("❌ {}", ArgsError::Validation(e)),
    }
}
