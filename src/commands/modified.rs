use anyhow::Result;

use crate::commands::open_manager;

pub fn run(name: &str, tenant: u32) -> Result<()> {
    let manager = open_manager()?;
    let modified = manager.get_keystore_last_modified(name, tenant)?;
    println!("{}", modified.to_rfc3339());
    Ok(())
}
