use anyhow::{Context, Result};

use crate::commands::open_manager;

pub fn run(name: &str, tenant: u32) -> Result<()> {
    let manager = open_manager()?;
    let handle = manager
        .get_keystore(name, tenant)
        .with_context(|| format!("Failed to load key store '{name}'"))?;

    if handle.entries.is_empty() {
        println!("Key store '{name}' has no entries.");
    }
    for (alias, entry) in &handle.entries {
        println!("{}\t{:?}\t{} bytes", alias, entry.kind, entry.data.len());
    }
    Ok(())
}
