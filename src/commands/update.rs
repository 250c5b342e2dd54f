use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use keystash::KeyStoreCodec;
use zeroize::Zeroizing;

use crate::commands::open_manager;

pub fn run(name: &str, tenant: u32, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }
    let content = Zeroizing::new(
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?,
    );

    let manager = open_manager()?;

    let store_type = manager
        .list_keystores(tenant)?
        .into_iter()
        .find(|md| md.name == name)
        .map(|md| md.store_type)
        .ok_or_else(|| anyhow!("Key store '{name}' not found for tenant {tenant}."))?;

    let password = manager.get_keystore_password(name, tenant)?;
    let handle = manager
        .codec()
        .decode(&content, &store_type, &password)
        .context("New content does not open with the stored key store password")?;

    let stamp = manager
        .update_keystore(name, &handle, tenant)
        .with_context(|| format!("Failed to update key store '{name}'"))?;

    println!(
        "Key store '{}' updated (revision {}).",
        name, stamp.revision
    );
    Ok(())
}
