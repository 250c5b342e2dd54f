use anyhow::{Context, Result};

use crate::commands::open_manager;

pub fn run(tenant: u32) -> Result<()> {
    let manager = open_manager()?;
    let stores = manager
        .list_keystores(tenant)
        .context("Failed to list key stores")?;

    if stores.is_empty() {
        println!("No key stores for tenant {tenant}. Add one with: keystash add <name> --tenant {tenant} --file <path>");
    } else {
        for md in &stores {
            println!(
                "{}\t{}\t{}\t{}\trev {}",
                md.name,
                md.store_type,
                md.provider,
                md.last_modified.to_rfc3339(),
                md.revision
            );
        }
    }

    Ok(())
}
