use std::sync::Arc;

use anyhow::{bail, Context, Result};
use keystash::config;
use keystash::{CipherVault, FileBackend, PassphraseKeyProvider};
use rand::RngCore;
use secrecy::SecretString;

use crate::commands::seal_canary;

pub fn run() -> Result<()> {
    let root = config::project_root()?;
    let cfg_path = config::config_path(&root);

    if cfg_path.exists() {
        bail!(
            "keystash is already initialized in this directory. \
             To reinitialize, delete .keystash/ first."
        );
    }

    println!("Initializing keystash store...");

    // Generate a fresh 32-byte salt
    let mut salt = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut cfg = config::Config::default_new(hex::encode(&salt));

    let passphrase = prompt_new_passphrase()?;
    let keys = PassphraseKeyProvider::new(&passphrase, &salt, &cfg.kdf_params(), cfg.key_version)
        .context("Failed to derive master key")?;
    cfg.canary = Some(seal_canary(&CipherVault::new(Arc::new(keys)))?);

    config::write(&root, &cfg).context("Failed to write config")?;
    FileBackend::open(&config::records_path(&root)).context("Failed to create record directory")?;

    println!("Initialized.");
    println!();
    println!("  1. Add a key store:    keystash add my-store --tenant 1 --file store.json");
    println!("  2. List key stores:    keystash list --tenant 1");
    println!("  3. Fetch its password: keystash password my-store --tenant 1");

    Ok(())
}

pub fn prompt_new_passphrase() -> Result<SecretString> {
    let passphrase = rpassword::prompt_password("New master passphrase: ")
        .context("Failed to read passphrase")?;
    let confirm = rpassword::prompt_password("Confirm master passphrase: ")
        .context("Failed to read passphrase confirmation")?;

    if passphrase != confirm {
        bail!("Passphrases do not match.");
    }
    if passphrase.is_empty() {
        bail!("Master passphrase must not be empty.");
    }

    Ok(SecretString::new(passphrase))
}
