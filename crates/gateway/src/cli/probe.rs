//! `taskgate probe <bridge-id>`: start one bridge, list its tools, stop it.

use tg_bridge::{BridgeSpec, StdioBridge};
use tg_domain::config::Config;

pub async fn run(config: &Config, bridge_id: &str) -> anyhow::Result<()> {
    let cfg = config
        .bridges
        .iter()
        .find(|b| b.id == bridge_id)
        .ok_or_else(|| anyhow::anyhow!("no bridge with id {bridge_id:?} in [[bridges]]"))?;

    let bridge = StdioBridge::new(BridgeSpec::from(cfg));
    let listed = bridge.list_tools().await;
    bridge.shutdown().await;

    let tools = listed.map_err(|e| anyhow::anyhow!("bridge {bridge_id}: {e}"))?;
    let prefix = cfg.tool_prefix.as_deref().unwrap_or("");
    println!("{} tool(s) from {bridge_id}:", tools.len());
    for tool in tools {
        println!("  {prefix}{:<28} {}", tool.name, tool.description);
    }
    Ok(())
}
