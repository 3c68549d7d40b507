//! `taskgate tools`: print the CLI catalog.

use tg_domain::config::Config;
use tg_tools::catalog::{TimeoutClass, CATALOG};
use tg_tools::toolset::definition;

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    if json {
        let defs: Vec<_> = CATALOG.iter().map(definition).collect();
        println!("{}", serde_json::to_string_pretty(&defs)?);
        return Ok(());
    }

    println!("program: {}", config.cli.program);
    if !config.cli.enabled {
        println!("(CLI tools are disabled in [cli])");
    }
    println!();
    for spec in CATALOG.iter() {
        let class = match spec.class {
            TimeoutClass::Read => "read",
            TimeoutClass::Write => "write",
            TimeoutClass::Init => "init",
        };
        println!(
            "{:<20} {:<6} {} {}",
            spec.name, class, config.cli.program, spec.subcommand
        );
        println!("{:<27} {}", "", spec.description);
    }
    Ok(())
}
