mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("keystash=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init => commands::init::run()?,
        Command::Add {
            name,
            tenant,
            file,
            provider,
            store_type,
        } => commands::add::run(&name, tenant, &file, &provider, &store_type)?,
        Command::List { tenant } => commands::list::run(tenant)?,
        Command::Show { name, tenant } => commands::show::run(&name, tenant)?,
        Command::Update { name, tenant, file } => commands::update::run(&name, tenant, &file)?,
        Command::Delete { name, tenant } => commands::delete::run(&name, tenant)?,
        Command::Modified { name, tenant } => commands::modified::run(&name, tenant)?,
        Command::Password {
            name,
            tenant,
            private_key,
        } => commands::password::run(&name, tenant, private_key)?,
    }

    Ok(())
}
