//! Run read commands against one device through the full stack.
//!
//! The device is described by a JSON file in `DeviceConfig` form:
//!
//! ```json
//! {
//!     "id": "edge1",
//!     "host": "192.168.1.1",
//!     "username": "ubnt",
//!     "password": "ubnt",
//!     "flavour": "ubiquiti",
//!     "keepalive_command": "show clock"
//! }
//! ```
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=clistack=debug cargo run --example run_commands -- edge1.json "show version" "show interfaces"
//! ```
//!
//! All commands are submitted at once; the queue runs them one at a time
//! and each is then repeated to show the read cache.

use std::env;
use std::fs;

use clistack::{Cli, CliBuilder, DeviceConfig, ReadCommand};
use futures_util::future::join_all;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: run_commands <device.json> <command>...");
        std::process::exit(2);
    };
    let commands: Vec<String> = args.collect();
    if commands.is_empty() {
        eprintln!("no commands given");
        std::process::exit(2);
    }

    let config: DeviceConfig = serde_json::from_str(&fs::read_to_string(&path)?)?;
    println!("Connecting to {} ({}:{})...", config.id, config.host, config.port);
    let stack = CliBuilder::new(config).build()?;

    let results = join_all(
        commands
            .iter()
            .map(|text| stack.cli.execute_read(ReadCommand::create(text.as_str()))),
    )
    .await;

    for (text, result) in commands.iter().zip(results) {
        println!("{}", "-".repeat(50));
        println!("$ {text}");
        match result {
            Ok(output) => println!("{}", output.trim()),
            Err(e) => eprintln!("failed ({:?}): {e}", e.kind()),
        }
    }

    println!("{}", "-".repeat(50));
    for text in &commands {
        stack.cli.execute_read(ReadCommand::create(text.as_str())).await?;
    }
    println!("Repeated {} reads, {} cached entries", commands.len(), stack.cache.len());

    stack.cli.destroy().await?;
    println!("Done!");
    Ok(())
}
