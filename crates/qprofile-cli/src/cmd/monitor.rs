use crate::output::print_json;
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = super::open(root, None)?;
    let monitor = project.service.monitor();
    let attributes = monitor
        .attributes()
        .context("failed to read monitoring attributes")?;

    if json {
        return print_json(&serde_json::json!({
            "name": monitor.name(),
            "attributes": attributes,
        }));
    }
    println!("{}", monitor.name());
    for (name, value) in &attributes {
        println!("  {name}: {value}");
    }
    Ok(())
}
