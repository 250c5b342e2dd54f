use anyhow::Result;
use secrecy::ExposeSecret;

use crate::commands::open_manager;

pub fn run(name: &str, tenant: u32, private_key: bool) -> Result<()> {
    let manager = open_manager()?;
    let password = if private_key {
        manager.get_private_key_password(name, tenant)?
    } else {
        manager.get_keystore_password(name, tenant)?
    };
    println!("{}", password.expose_secret());
    Ok(())
}
