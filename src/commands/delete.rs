use anyhow::{Context, Result};

use crate::commands::open_manager;

pub fn run(name: &str, tenant: u32) -> Result<()> {
    let manager = open_manager()?;
    manager
        .delete_keystore(name, tenant)
        .with_context(|| format!("Failed to delete key store '{name}'"))?;
    println!("Key store '{}' deleted.", name);
    Ok(())
}
