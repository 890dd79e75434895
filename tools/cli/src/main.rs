//! SilentKey CLI - Command line interface for the secret vault.
//!
//! This tool is the composition root: it loads settings, builds the vault
//! and dispatches one command per invocation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use silentkey_common::SecretId;
use silentkey_crypto::EncryptedContainer;
use silentkey_vault::{
    SecretItem, SecretType, SkipReason, SshKeyItem, VaultManager, VaultSettings,
};

#[derive(Parser)]
#[command(name = "silentkey")]
#[command(about = "SilentKey - Local encrypted secret vault")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: platform config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Vault root directory, overrides the settings file.
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialise a new vault (replaces existing vault metadata).
    Init {
        /// Proceed even if a vault already exists.
        #[arg(long)]
        force: bool,
    },

    /// Add a secret. The value is prompted for.
    Add {
        #[arg(short, long)]
        title: String,

        /// apiKey, token, credential, sshKey or generic.
        #[arg(short = 'T', long = "type", default_value = "generic")]
        secret_type: String,

        #[arg(short, long)]
        notes: Option<String>,

        /// Tag to attach; repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        favorite: bool,
    },

    /// Add an SSH key pair from files.
    AddSsh {
        #[arg(short, long)]
        title: String,

        #[arg(long)]
        public_key: PathBuf,

        #[arg(long)]
        private_key: PathBuf,

        #[arg(long)]
        passphrase_hint: Option<String>,
    },

    /// Show a secret.
    Get {
        id: String,

        /// Print the secret value.
        #[arg(long)]
        show: bool,
    },

    /// List secrets and SSH keys.
    List,

    /// Search titles, notes and tags.
    Search { query: String },

    /// Change fields of a secret.
    Update {
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,

        /// Replace all tags; repeatable.
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,

        #[arg(long)]
        favorite: Option<bool>,

        /// Prompt for a new value.
        #[arg(long)]
        value: bool,
    },

    /// Move a secret to the trash.
    Delete { id: String },

    /// Manage trashed items.
    Trash {
        #[command(subcommand)]
        command: TrashCommands,
    },

    /// Create or restore a whole-vault backup.
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Export secrets to a password-protected file.
    Export { path: PathBuf },

    /// Import secrets from an exported file.
    Import { path: PathBuf },

    /// Show vault information.
    Info,
}

#[derive(Subcommand)]
enum TrashCommands {
    /// List trashed items with expiry dates.
    List,
    /// Restore a trashed item.
    Restore { id: String },
    /// Permanently delete a trashed item.
    Purge { id: String },
    /// Permanently delete everything in the trash.
    Empty,
    /// Permanently delete expired items.
    Clean,
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Write a backup file.
    Create { path: PathBuf },
    /// Restore from a backup file.
    Restore { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut settings =
        VaultSettings::load_or_default(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(root) = cli.root {
        settings.root = root;
    }

    match cli.command {
        Commands::Init { force } => cmd_init(&settings, force).await,

        Commands::Add {
            title,
            secret_type,
            notes,
            tags,
            favorite,
        } => cmd_add(&settings, title, &secret_type, notes, tags, favorite).await,

        Commands::AddSsh {
            title,
            public_key,
            private_key,
            passphrase_hint,
        } => cmd_add_ssh(&settings, title, &public_key, &private_key, passphrase_hint).await,

        Commands::Get { id, show } => cmd_get(&settings, &id, show).await,

        Commands::List => cmd_list(&settings).await,

        Commands::Search { query } => cmd_search(&settings, &query).await,

        Commands::Update {
            id,
            title,
            notes,
            tags,
            favorite,
            value,
        } => {
            let changes = ItemChanges {
                title,
                notes,
                tags,
                favorite,
                value,
            };
            cmd_update(&settings, &id, changes).await
        }

        Commands::Delete { id } => cmd_delete(&settings, &id).await,

        Commands::Trash { command } => cmd_trash(&settings, command).await,

        Commands::Backup { command } => cmd_backup(&settings, command).await,

        Commands::Export { path } => cmd_export(&settings, &path).await,

        Commands::Import { path } => cmd_import(&settings, &path).await,

        Commands::Info => cmd_info(&settings).await,
    }
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<Vec<u8>>> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password.into_bytes()))
}

/// Prompt twice and require both entries to match.
fn prompt_new_password(prompt: &str) -> Result<Zeroizing<Vec<u8>>> {
    let password = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm password: ")?;

    if *password != *confirm {
        anyhow::bail!("Passwords do not match");
    }
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }
    Ok(password)
}

fn parse_id(id: &str) -> Result<SecretId> {
    id.parse().with_context(|| format!("Invalid id: {}", id))
}

fn short_id(id: &SecretId) -> String {
    id.to_string().chars().take(8).collect()
}

/// Build the vault and unlock it with a prompted password.
async fn open_vault(settings: &VaultSettings) -> Result<VaultManager> {
    let manager = VaultManager::from_settings(settings).context("Failed to open vault storage")?;

    if !manager.is_initialized().await? {
        anyhow::bail!(
            "No vault found at {}. Run `silentkey init` first.",
            settings.root.display()
        );
    }

    let password = prompt_password("Master password: ")?;
    manager
        .unlock(&password)
        .await
        .context("Failed to unlock vault")?;
    Ok(manager)
}

fn print_item_row(item: &SecretItem) {
    let star = if item.is_favorite { "*" } else { " " };
    println!(
        "{} {}  {:<10}  {}",
        star,
        item.id,
        item.secret_type.to_string(),
        item.title
    );
}

/// Initialise a new vault.
async fn cmd_init(settings: &VaultSettings, force: bool) -> Result<()> {
    info!("Initialising vault at {}", settings.root.display());

    let manager = VaultManager::from_settings(settings).context("Failed to create vault storage")?;
    if manager.is_initialized().await? && !force {
        anyhow::bail!(
            "A vault already exists at {}. Use --force to replace its metadata.",
            settings.root.display()
        );
    }

    let password = prompt_new_password("New master password: ")?;
    manager
        .setup(&password)
        .await
        .context("Failed to initialise vault")?;

    println!("Vault initialised.");
    println!("  Location: {}", settings.root.display());

    Ok(())
}

/// Add a secret.
async fn cmd_add(
    settings: &VaultSettings,
    title: String,
    secret_type: &str,
    notes: Option<String>,
    tags: Vec<String>,
    favorite: bool,
) -> Result<()> {
    let secret_type = SecretType::parse(secret_type).with_context(|| {
        format!(
            "Invalid type '{}'. Use: apiKey, token, credential, sshKey or generic",
            secret_type
        )
    })?;

    let manager = open_vault(settings).await?;
    let value = prompt_password("Secret value: ")?;

    let mut item = SecretItem::new(title, secret_type, value.to_vec()).with_tags(tags);
    item.notes = notes;
    item.is_favorite = favorite;

    let item = manager.create(item).await.context("Failed to add secret")?;

    println!("Secret added: {}", item.id);

    Ok(())
}

/// Add an SSH key pair.
async fn cmd_add_ssh(
    settings: &VaultSettings,
    title: String,
    public_key: &Path,
    private_key: &Path,
    passphrase_hint: Option<String>,
) -> Result<()> {
    let public = tokio::fs::read_to_string(public_key)
        .await
        .context("Failed to read public key")?;
    let private = Zeroizing::new(
        tokio::fs::read(private_key)
            .await
            .context("Failed to read private key")?,
    );

    let manager = open_vault(settings).await?;

    let mut item = SshKeyItem::new(title, public.trim(), private.to_vec());
    item.passphrase_hint = passphrase_hint;

    let item = manager.create(item).await.context("Failed to add SSH key")?;

    println!("SSH key added: {}", item.id);

    Ok(())
}

/// Show one secret, or an SSH key if the id holds one.
async fn cmd_get(settings: &VaultSettings, id: &str, show: bool) -> Result<()> {
    let id = parse_id(id)?;
    let manager = open_vault(settings).await?;

    match manager.read::<SecretItem>(&id).await {
        Ok(item) => {
            println!("{}", item.title);
            println!("  ID: {}", item.id);
            println!("  Type: {} ({})", item.secret_type, item.category());
            if let Some(notes) = &item.notes {
                println!("  Notes: {}", notes);
            }
            if !item.tags.is_empty() {
                let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
                println!("  Tags: {}", tags.join(", "));
            }
            println!("  Favorite: {}", item.is_favorite);
            println!("  Created: {}", item.created_at);
            println!("  Modified: {}", item.modified_at);
            if show {
                println!("  Value: {}", String::from_utf8_lossy(&item.encrypted_value));
            }
        }
        Err(silentkey_common::Error::WrongSecretKind { .. }) => {
            let key: SshKeyItem = manager.read(&id).await.context("Failed to read SSH key")?;
            println!("{}", key.title);
            println!("  ID: {}", key.id);
            println!("  Type: SSH key pair");
            println!("  Public key: {}", key.public_key);
            if let Some(hint) = &key.passphrase_hint {
                println!("  Passphrase hint: {}", hint);
            }
            println!("  Created: {}", key.created_at);
            println!("  Modified: {}", key.modified_at);
            if show {
                println!("{}", String::from_utf8_lossy(&key.private_key));
            }
        }
        Err(e) => return Err(e).context("Failed to read secret"),
    }

    Ok(())
}

/// List secrets and SSH keys.
async fn cmd_list(settings: &VaultSettings) -> Result<()> {
    let manager = open_vault(settings).await?;

    let mut secrets = manager
        .list_detailed::<SecretItem>()
        .await
        .context("Failed to list secrets")?;
    let mut keys = manager
        .list::<SshKeyItem>()
        .await
        .context("Failed to list SSH keys")?;

    secrets.items.sort_by(|a, b| a.title.cmp(&b.title));
    keys.sort_by(|a, b| a.title.cmp(&b.title));

    if secrets.items.is_empty() && keys.is_empty() {
        println!("Vault is empty.");
    }
    for item in &secrets.items {
        print_item_row(item);
    }
    for key in &keys {
        println!("  {}  {:<10}  {}", key.id, "ssh", key.title);
    }

    let unreadable = secrets
        .skipped
        .iter()
        .filter(|s| matches!(s.reason, SkipReason::Undecodable(_)))
        .count();
    if unreadable > 0 {
        println!("\n{} item(s) could not be decrypted.", unreadable);
    }

    Ok(())
}

/// Search secrets.
async fn cmd_search(settings: &VaultSettings, query: &str) -> Result<()> {
    let manager = open_vault(settings).await?;

    let mut hits = manager
        .search::<SecretItem>(query)
        .await
        .context("Search failed")?;
    hits.sort_by(|a, b| a.title.cmp(&b.title));

    if hits.is_empty() {
        println!("No matches.");
    }
    for item in &hits {
        print_item_row(item);
    }

    Ok(())
}

struct ItemChanges {
    title: Option<String>,
    notes: Option<String>,
    tags: Option<Vec<String>>,
    favorite: Option<bool>,
    value: bool,
}

/// Update a secret.
async fn cmd_update(settings: &VaultSettings, id: &str, changes: ItemChanges) -> Result<()> {
    let id = parse_id(id)?;
    let manager = open_vault(settings).await?;

    let mut item: SecretItem = manager.read(&id).await.context("Failed to read secret")?;

    if let Some(title) = changes.title {
        item.title = title;
    }
    if let Some(notes) = changes.notes {
        item.notes = if notes.is_empty() { None } else { Some(notes) };
    }
    if let Some(tags) = changes.tags {
        item.tags = tags.into_iter().collect();
    }
    if let Some(favorite) = changes.favorite {
        item.is_favorite = favorite;
    }
    if changes.value {
        let value = prompt_password("New secret value: ")?;
        item.encrypted_value = value.to_vec();
    }

    let item = manager.update(item).await.context("Failed to update secret")?;

    println!("Secret updated: {} ({})", item.title, short_id(&item.id));

    Ok(())
}

/// Move a secret to the trash.
async fn cmd_delete(settings: &VaultSettings, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let manager = open_vault(settings).await?;

    let trashed = manager.delete(&id).await.context("Failed to delete secret")?;

    println!(
        "Moved to trash: {} (expires {})",
        id,
        trashed.expiration_date.format("%Y-%m-%d")
    );

    Ok(())
}

/// Trash subcommands.
async fn cmd_trash(settings: &VaultSettings, command: TrashCommands) -> Result<()> {
    let manager = open_vault(settings).await?;

    match command {
        TrashCommands::List => {
            let entries = manager.list_trash().await.context("Failed to list trash")?;
            if entries.is_empty() {
                println!("Trash is empty.");
            }
            for (id, metadata) in entries {
                match metadata {
                    Some(meta) => println!(
                        "  {}  deleted {}  expires {}",
                        id,
                        meta.deleted_date.format("%Y-%m-%d"),
                        meta.expiration_date.format("%Y-%m-%d")
                    ),
                    None => println!("  {}  (no expiry recorded)", id),
                }
            }
        }
        TrashCommands::Restore { id } => {
            let id = parse_id(&id)?;
            let restored = manager
                .restore_from_trash(&id)
                .await
                .context("Failed to restore item")?;
            if restored == id {
                println!("Restored: {}", id);
            } else {
                println!("Restored under new id: {} (was {})", restored, id);
            }
        }
        TrashCommands::Purge { id } => {
            let id = parse_id(&id)?;
            manager.purge(&id).await.context("Failed to purge item")?;
            println!("Permanently deleted: {}", id);
        }
        TrashCommands::Empty => {
            let count = manager.empty_trash().await.context("Failed to empty trash")?;
            println!("Permanently deleted {} item(s).", count);
        }
        TrashCommands::Clean => {
            let count = manager
                .clean_expired_trash()
                .await
                .context("Failed to clean trash")?;
            println!("Removed {} expired item(s).", count);
        }
    }

    Ok(())
}

/// Backup subcommands.
async fn cmd_backup(settings: &VaultSettings, command: BackupCommands) -> Result<()> {
    match command {
        BackupCommands::Create { path } => {
            let manager = open_vault(settings).await?;
            manager
                .create_backup(&path)
                .await
                .context("Failed to create backup")?;
            println!("Backup written: {}", path.display());
        }
        BackupCommands::Restore { path } => {
            info!("Restoring backup from {}", path.display());
            let manager =
                VaultManager::from_settings(settings).context("Failed to open vault storage")?;
            let password = prompt_password("Backup master password: ")?;
            let count = manager
                .restore_backup(&path, &password)
                .await
                .context("Failed to restore backup")?;
            println!("Restored {} item(s) from {}", count, path.display());
        }
    }

    Ok(())
}

/// Export secrets.
async fn cmd_export(settings: &VaultSettings, path: &Path) -> Result<()> {
    let manager = open_vault(settings).await?;
    let password = prompt_new_password("Export password: ")?;

    let container = manager
        .export_items::<SecretItem>(&password)
        .await
        .context("Failed to export secrets")?;
    tokio::fs::write(path, container.to_bytes()?)
        .await
        .context("Failed to write export file")?;

    println!("Secrets exported to {}", path.display());

    Ok(())
}

/// Import secrets.
async fn cmd_import(settings: &VaultSettings, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .context("Failed to read export file")?;
    let container = EncryptedContainer::from_bytes(&bytes).context("Not an export file")?;

    let manager = open_vault(settings).await?;
    let password = prompt_password("Export password: ")?;

    let count = manager
        .import_items::<SecretItem>(&container, &password)
        .await
        .context("Failed to import secrets")?;

    println!("Imported {} secret(s).", count);

    Ok(())
}

/// Show vault information.
async fn cmd_info(settings: &VaultSettings) -> Result<()> {
    let manager = VaultManager::from_settings(settings).context("Failed to open vault storage")?;
    let storage = manager.storage();

    println!("Vault Information:");
    println!("  Root: {}", settings.root.display());

    match manager.metadata().await.context("Failed to read vault metadata")? {
        Some(metadata) => {
            println!("  Version: {}", metadata.version);
            println!("  Created: {}", metadata.created_at);
            println!("  Modified: {}", metadata.last_modified);
        }
        None => println!("  Not initialised"),
    }

    println!("  Items: {}", storage.list_all_ids().await?.len());
    println!("  Trash: {}", storage.list_trash_ids().await?.len());
    println!("  Trash retention: {} days", settings.trash_retention_days);
    println!("  KDF Parameters:");
    println!("    Memory: {} KiB", settings.kdf.memory_cost);
    println!("    Time: {} iterations", settings.kdf.time_cost);
    println!("    Parallelism: {}", settings.kdf.parallelism);

    Ok(())
}
