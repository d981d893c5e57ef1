//! CardHub operator CLI.
//!
//! Reads the same environment as the service (`DATABASE_URL`, storage and delete policy
//! settings, `.env` supported).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use cardhub_core::forms::{parse_card_banks, parse_card_social_media};
use cardhub_core::models::{Card, CardRequest};
use cardhub_core::{AppError, Config, DbId, ErrorMetadata, LogLevel};
use cardhub_db::{setup_database, CardRepository, InvitationRepository};
use cardhub_services::{
    init_tracing, CardService, InvitationService, MediaLifecycleService, MediaLimits,
};
use cardhub_storage::create_storage;
use clap::{Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "cardhub", about = "CardHub maintenance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Check whether a card slug is free
    SlugCheck {
        slug: String,
        /// Card that may already own the slug
        #[arg(long)]
        exclude: Option<DbId>,
    },
    /// Check whether an invitation key is free
    KeyCheck {
        key: String,
        /// Invitation that may already own the key
        #[arg(long)]
        exclude: Option<DbId>,
    },
    /// Print a card with its banks and social media
    ShowCard { id: DbId },
    /// Print an invitation by id or public key
    ShowInvitation {
        #[arg(long, conflicts_with = "key", required_unless_present = "key")]
        id: Option<DbId>,
        #[arg(long)]
        key: Option<String>,
    },
    /// Delete a card using the configured delete policy
    DeleteCard { id: DbId },
    /// Delete an invitation using the configured delete policy
    DeleteInvitation { id: DbId },
    /// Replace a card's bank and social media rows from form fields
    ///
    /// Fields use the web form names, e.g. `--field 'card_banks[0][iban]=TR00...'`.
    /// Rows carrying an existing `[id]` are updated in place; omitted rows are removed.
    SetCardRows {
        id: DbId,
        /// User recorded as the editor
        #[arg(long)]
        actor: DbId,
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
}

/// Split a `key=value` form field.
fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn form_map(fields: Vec<(String, String)>) -> HashMap<String, Vec<String>> {
    let mut form: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in fields {
        form.entry(key).or_default().push(value);
    }
    form
}

/// Request that keeps `card`'s scalar fields and replaces its child rows with `form`'s.
fn rows_request(card: Card, form: &HashMap<String, Vec<String>>) -> CardRequest {
    CardRequest {
        name: card.name,
        slug: card.slug,
        title: card.title.unwrap_or_default(),
        telephone: card.telephone.unwrap_or_default(),
        email: card.email,
        location: card.location,
        website_url: card.website_url,
        store_url: card.store_url,
        is_active: card.is_active,
        banks: parse_card_banks(form),
        social_media: parse_card_social_media(form),
    }
}

/// JSON body printed when a command fails with an application error.
fn error_report(err: &AppError) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "error": err.error_code(),
        "message": err.client_message(),
        "status": err.http_status_code(),
        "recoverable": err.is_recoverable(),
    })
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

struct Services {
    cards: CardService,
    invitations: InvitationService,
}

impl Services {
    async fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool = setup_database(config, false).await?;
        let storage = create_storage(config)
            .await
            .context("Failed to initialize file storage")?;
        let media = Arc::new(MediaLifecycleService::new(
            storage,
            MediaLimits::from_config(config),
        ));

        Ok(Self {
            cards: CardService::new(
                CardRepository::new(pool.clone(), config.delete_policy()),
                Arc::clone(&media),
            ),
            invitations: InvitationService::new(
                InvitationRepository::new(pool, config.delete_policy()),
                media,
            ),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format())?;

    let Err(err) = run(cli.command, &config).await else {
        return Ok(());
    };
    let Some(app_err) = err.downcast_ref::<AppError>() else {
        return Err(err);
    };

    match app_err.log_level() {
        LogLevel::Debug => tracing::debug!(error = %app_err, "Command failed"),
        LogLevel::Warn => tracing::warn!(error = %app_err, "Command failed"),
        LogLevel::Error => tracing::error!(error = %app_err, "Command failed"),
    }
    print_json(&error_report(app_err))?;
    std::process::exit(1);
}

async fn run(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => {
            setup_database(config, true).await?;
            tracing::info!("Migrations applied");
        }
        Commands::SlugCheck { slug, exclude } => {
            let services = Services::connect(config).await?;
            let available = services.cards.is_slug_available(&slug, exclude).await?;
            print_json(&serde_json::json!({ "slug": slug, "available": available }))?;
        }
        Commands::KeyCheck { key, exclude } => {
            let services = Services::connect(config).await?;
            let available = services
                .invitations
                .is_key_available(&key, exclude)
                .await?;
            print_json(&serde_json::json!({ "key": key, "available": available }))?;
        }
        Commands::ShowCard { id } => {
            let services = Services::connect(config).await?;
            let card = services
                .cards
                .get_card(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Card {} not found", id)))?;
            print_json(&card)?;
        }
        Commands::ShowInvitation { id, key } => {
            let services = Services::connect(config).await?;
            let invitation = match (id, key) {
                (Some(id), _) => services.invitations.get_invitation(id).await?,
                (None, Some(key)) => services.invitations.get_invitation_by_key(&key).await?,
                (None, None) => anyhow::bail!("Pass --id or --key"),
            };
            let invitation = invitation
                .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;
            print_json(&invitation)?;
        }
        Commands::DeleteCard { id } => {
            let services = Services::connect(config).await?;
            services.cards.delete_card(id).await?;
            print_json(
                &serde_json::json!({ "success": true, "message": format!("Card {} deleted", id) }),
            )?;
        }
        Commands::DeleteInvitation { id } => {
            let services = Services::connect(config).await?;
            services.invitations.delete_invitation(id).await?;
            print_json(
                &serde_json::json!({ "success": true, "message": format!("Invitation {} deleted", id) }),
            )?;
        }
        Commands::SetCardRows { id, actor, fields } => {
            let services = Services::connect(config).await?;
            let card = services
                .cards
                .get_card(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Card {} not found", id)))?;
            let request = rows_request(card, &form_map(fields));
            let updated = services.cards.update_card(actor, id, request, None).await?;
            print_json(&updated)?;
        }
    }

    Ok(())
}
