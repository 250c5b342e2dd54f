use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "keystash",
    about = "Multi-tenant key store persistence, sealed at rest.",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a new keystash store in the current directory.
    Init,

    /// Add a key store container (passwords are prompted interactively).
    Add {
        /// Key store name, unique within the tenant.
        name: String,
        #[arg(long)]
        tenant: u32,
        /// Path to the key store container file.
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "keystash")]
        provider: String,
        /// Container format.
        #[arg(long = "type", default_value = keystash::codec::ENVELOPE_TYPE)]
        store_type: String,
    },

    /// List key stores of a tenant (metadata only, never secrets).
    List {
        #[arg(long)]
        tenant: u32,
    },

    /// Show the entry aliases of a key store.
    Show {
        name: String,
        #[arg(long)]
        tenant: u32,
    },

    /// Replace the content of an existing key store.
    Update {
        name: String,
        #[arg(long)]
        tenant: u32,
        /// Path to the new container, protected with the stored key store password.
        #[arg(long)]
        file: PathBuf,
    },

    /// Delete a key store.
    Delete {
        name: String,
        #[arg(long)]
        tenant: u32,
    },

    /// Print the last-modified time of a key store.
    Modified {
        name: String,
        #[arg(long)]
        tenant: u32,
    },

    /// Print the key store password (or the private key password).
    Password {
        name: String,
        #[arg(long)]
        tenant: u32,
        #[arg(long)]
        private_key: bool,
    },
}
