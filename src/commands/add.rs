use std::path::Path;

use anyhow::{bail, Context, Result};
use keystash::NewKeyStore;
use zeroize::Zeroizing;

use crate::commands::{open_manager, prompt_secret};

pub fn run(name: &str, tenant: u32, file: &Path, provider: &str, store_type: &str) -> Result<()> {
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }
    let content = Zeroizing::new(
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?,
    );

    let manager = open_manager()?;

    let store_password = prompt_secret("Key store password: ")?;
    let private_key_password = prompt_secret("Private key password: ")?;

    let stamp = manager
        .add_keystore(
            tenant,
            NewKeyStore {
                name,
                content: &content,
                provider,
                store_type,
                store_password: &store_password,
                private_key_password: &private_key_password,
            },
        )
        .with_context(|| format!("Failed to add key store '{name}'"))?;

    println!(
        "Key store '{}' added for tenant {} (revision {}).",
        name, tenant, stamp.revision
    );
    Ok(())
}
