//! Command implementations over [`AccountManager`].

use std::path::Path;

use accountmux_core::{
    AccountConfig, AccountId, AccountManager, AccountUpdate, AuthState, CredentialStore, Error,
    ListFilter, LoadError, ProviderKind, TokenAuthenticator, Validity, validate_account,
};
use accountmux_oauth::ClientSecret;
use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::Command;

/// Run one command.
pub async fn run(manager: &AccountManager, command: Command) -> Result<()> {
    match command {
        Command::List { all } => list(manager, all).await,
        Command::Add {
            id,
            provider,
            secret,
            display_name,
            default,
            disabled,
        } => {
            let new = NewAccount {
                id: AccountId::new(id),
                provider,
                display_name,
                default,
                enabled: !disabled,
            };
            add(manager, new, &secret).await
        }
        Command::Update {
            id,
            provider,
            display_name,
            secret_path,
            token_path,
        } => {
            let update = AccountUpdate {
                kind: provider,
                display_name,
                credential_secret_path: secret_path,
                token_state_path: token_path,
                ..AccountUpdate::default()
            };
            if update.is_empty() {
                bail!("nothing to update; pass at least one field");
            }
            let updated = manager.update_account(&AccountId::new(id), &update).await?;
            println!("Updated {}", describe(&updated));
            Ok(())
        }
        Command::Remove { id } => remove(manager, &AccountId::new(id)).await,
        Command::SetDefault { id } => {
            let updated = manager.set_default(&AccountId::new(id)).await?;
            println!("{} is now the default {} account", updated.id, updated.kind);
            Ok(())
        }
        Command::Enable { id } => set_enabled(manager, &AccountId::new(id), true).await,
        Command::Disable { id } => set_enabled(manager, &AccountId::new(id), false).await,
        Command::Login { id } => login(manager, &AccountId::new(id)).await,
        Command::Logout { id } => {
            let id = AccountId::new(id);
            manager.forget_credentials(&id).await?;
            println!("Removed stored credential for {id}");
            Ok(())
        }
        Command::Status => status(manager).await,
    }
}

struct NewAccount {
    id: AccountId,
    provider: ProviderKind,
    display_name: Option<String>,
    default: bool,
    enabled: bool,
}

async fn list(manager: &AccountManager, all: bool) -> Result<()> {
    let filter = if all {
        ListFilter::ALL
    } else {
        ListFilter::ENABLED
    };
    let accounts = manager.list_accounts(filter).await;
    if accounts.is_empty() {
        println!("No accounts configured. Add one with `accountmux add`.");
        return Ok(());
    }

    for account in &accounts {
        println!(
            "{} {:<16} {:<9} {:<8} {}",
            if account.is_default { '*' } else { ' ' },
            account.id,
            account.kind,
            if account.enabled { "enabled" } else { "disabled" },
            account.display_name
        );
    }
    Ok(())
}

/// Add an account, copying its client secret to `<secrets_dir>/credentials_<id>.json`.
async fn add(manager: &AccountManager, new: NewAccount, secret: &Path) -> Result<()> {
    if manager.registry().get(&new.id).await.is_ok() {
        bail!("account '{}' already exists", new.id);
    }

    ClientSecret::from_file(secret)
        .with_context(|| format!("{} is not a usable client secret file", secret.display()))?;

    let settings = manager.settings();
    let staged = settings.secret_path_for(&new.id);
    let mut config = AccountConfig::new(
        new.id.clone(),
        new.provider,
        staged.clone(),
        settings.token_path_for(&new.id),
    )
    .with_enabled(new.enabled);
    if let Some(name) = new.display_name {
        config = config.with_display_name(name);
    }
    if new.default {
        config = config.as_default();
    }

    // The id becomes part of a file name; check it before anything is written.
    validate_account(&config).map_err(Error::Validation)?;
    stage_secret(secret, &staged).await?;

    if let Err(e) = manager.add_account(config.clone()).await {
        if let Err(cleanup) = tokio::fs::remove_file(&staged).await {
            warn!(path = %staged.display(), error = %cleanup, "failed to remove staged secret");
        }
        return Err(e.into());
    }

    info!(account = %config.id, "account added");
    println!("Added {}", describe(&config));
    println!("Run `accountmux login {}` to authorize it.", config.id);
    Ok(())
}

async fn stage_secret(source: &Path, staged: &Path) -> Result<()> {
    if let Some(dir) = staged.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }
    tokio::fs::copy(source, staged)
        .await
        .with_context(|| format!("cannot copy client secret to {}", staged.display()))?;
    Ok(())
}

async fn remove(manager: &AccountManager, id: &AccountId) -> Result<()> {
    let removed = manager.remove_account(id).await?;
    if let Err(e) = manager.authenticator().forget(&removed).await {
        warn!(account = %id, error = %e, "account removed but its credential could not be deleted");
    }
    println!("Removed {}", describe(&removed));
    Ok(())
}

async fn set_enabled(manager: &AccountManager, id: &AccountId, enabled: bool) -> Result<()> {
    let updated = manager
        .update_account(id, &AccountUpdate::enabled(enabled))
        .await?;
    println!("Updated {}", describe(&updated));
    Ok(())
}

async fn login(manager: &AccountManager, id: &AccountId) -> Result<()> {
    let client = match manager.resolve(id).await {
        Ok(client) => client,
        Err(e @ Error::MissingClientSecret(_)) => {
            bail!("{e}\nRe-add the account with a client secret file: `accountmux add`")
        }
        Err(e) => return Err(e.into()),
    };

    let credential = client.credential();
    match credential.expiry {
        Some(expiry) => println!(
            "{id} is authorized for {} (token valid until {})",
            client.kind(),
            expiry.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
        ),
        None => println!("{id} is authorized for {}", client.kind()),
    }
    Ok(())
}

async fn status(manager: &AccountManager) -> Result<()> {
    let accounts = manager.status().await;
    if accounts.is_empty() {
        println!("No accounts configured.");
        return Ok(());
    }

    let store = manager.authenticator().store();
    for entry in accounts {
        let config = &entry.config;
        let token = match store.load(&config.token_state_path).await {
            Ok(credential) => {
                match <TokenAuthenticator>::validate(credential, &config.required_scopes()) {
                    AuthState::Validated(_, Validity::Valid) => "valid",
                    AuthState::Validated(_, Validity::Expired) => "expired",
                    AuthState::Validated(_, Validity::ScopeMismatch) => "scope mismatch",
                    _ => "unknown",
                }
            }
            Err(LoadError::NotFound) => "not authorized",
            Err(LoadError::Corrupt(_)) => "corrupt",
        };
        println!(
            "{:<16} {:<9} {:<8} token: {}",
            config.id,
            config.kind,
            if config.enabled { "enabled" } else { "disabled" },
            token
        );
    }
    Ok(())
}

fn describe(config: &AccountConfig) -> String {
    let mut text = format!("{} ({}, {})", config.id, config.kind, config.display_name);
    if config.is_default {
        text.push_str(" [default]");
    }
    if !config.enabled {
        text.push_str(" [disabled]");
    }
    text
}
