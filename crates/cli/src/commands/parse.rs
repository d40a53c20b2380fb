//! `toolgate parse` — Show what a model reply would do, without running it.

use std::io::Read;
use std::path::Path;

use toolgate_agent::{extract_command_blocks, parse_reply};
use toolgate_security::normalize_args;
use toolgate_tools::coder;
use toolgate_tools::sanitize_args;

pub fn run(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = if file == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(file)?
    };

    let reply = parse_reply(&text);

    if let Some(reasoning) = &reply.reasoning {
        println!("Reasoning:");
        print_indented(reasoning);
    }
    if let Some(explanation) = &reply.explanation {
        println!("Explanation:");
        print_indented(explanation);
    }
    if !reply.display_text.is_empty() {
        println!("Text:");
        print_indented(&reply.display_text);
    }

    if let Some(error) = &reply.error {
        println!("\n❌ Parse error: {error}");
        println!("   No invocations would run; the model would get a correction.");
        return Ok(());
    }

    for (i, call) in reply.invocations.iter().enumerate() {
        println!("\nInvocation {}: {}", i + 1, call.tool_name);
        println!("   raw args:  {}", call.raw_args);
        println!(
            "   canonical: {}",
            normalize_args(&call.raw_args).full_command(&call.tool_name)
        );

        let sanitized = sanitize_args(&call.raw_args);
        for fix in &sanitized.fixes {
            println!("   fix:       {fix}");
        }
        match coder::build_argv(&sanitized.text) {
            Ok(argv) => println!("   argv:      {argv:?}"),
            Err(e) => println!("   argv:      ❌ {e}"),
        }
    }

    if reply.invocations.is_empty() {
        let blocks = extract_command_blocks(&text);
        for (i, block) in blocks.iter().enumerate() {
            println!("\nLegacy block {} ({}):", i + 1, block.lang);
            print_indented(&block.script);
        }
        if blocks.is_empty() {
            println!("\nNo tool calls: this reply is a final answer.");
        }
    }
    Ok(())
}

fn print_indented(text: &str) {
    for line in text.lines() {
        println!("   {line}");
    }
}
