use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use quire_config::{ConfigLoad, ConfigLoader};
use quire_core::{
    Catalogs,
    catalog::{
        CatalogService,
        selector::{IdentifierQuery, derive_author, select},
    },
};
use quire_model::{CandidateRecord, CollectionKind, IdentifierKind};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "quirectl", about = "Quire catalog service operator tool")]
struct Cli {
    /// Configuration file (TOML or JSON); overrides QUIRE_CONFIG_PATH
    #[arg(long, global = true, env = "QUIRE_CONFIG_PATH")]
    config: Option<PathBuf>,
    /// Read variables from this env file instead of ./.env
    #[arg(long, global = true, conflicts_with = "no_env_file")]
    env_file: Option<PathBuf>,
    /// Do not read any env file
    #[arg(long, global = true)]
    no_env_file: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate configuration and probe every configured catalog service
    Check,
    /// Run a catalog lookup and print the candidates
    Lookup {
        #[arg(long, value_enum, default_value = "ebook")]
        kind: KindArg,
        term: String,
    },
    /// Look up by identifier and print the candidate the selector picks
    Select {
        #[arg(long, value_enum, default_value = "ebook")]
        kind: KindArg,
        #[command(flatten)]
        identifiers: IdentifierArgs,
    },
    /// Build the add payload that would be submitted for a lookup result
    Build {
        #[arg(long, value_enum, default_value = "ebook")]
        kind: KindArg,
        #[command(flatten)]
        identifiers: IdentifierArgs,
        /// Free-text term used when no identifier is given
        #[arg(long)]
        term: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Ebook,
    Audiobook,
}

impl From<KindArg> for CollectionKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Ebook => CollectionKind::Ebook,
            KindArg::Audiobook => CollectionKind::Audiobook,
        }
    }
}

#[derive(Debug, clap::Args)]
struct IdentifierArgs {
    #[arg(long)]
    isbn13: Option<String>,
    #[arg(long)]
    isbn10: Option<String>,
    /// Marketplace id
    #[arg(long)]
    asin: Option<String>,
}

impl IdentifierArgs {
    fn query(&self) -> IdentifierQuery {
        IdentifierQuery::new(
            self.isbn13.as_deref(),
            self.isbn10.as_deref(),
            self.asin.as_deref(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,quirectl=info,quire_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let load = load_config(&cli)?;

    match cli.command {
        Command::Check => check(&load).await,
        Command::Lookup { kind, term } => {
            let catalogs = catalogs(&load)?;
            let candidates = service(&catalogs, kind.into())?.lookup(&term).await?;
            print_json(&serde_json::to_value(&candidates)?)
        }
        Command::Select { kind, identifiers } => {
            let catalogs = catalogs(&load)?;
            let service = service(&catalogs, kind.into())?;
            let query = identifiers.query();
            let Some(term) = identifier_term(&query) else {
                bail!("pass at least one of --isbn13, --isbn10 or --asin");
            };
            let candidates = service.lookup(&term).await?;
            match select(&candidates, &query) {
                Some(selection) => {
                    info!(matched_by = ?selection.matched_by, "candidate selected");
                    print_json(&serde_json::to_value(&selection.candidate)?)
                }
                None => bail!(
                    "none of {} candidates carried the requested identifiers",
                    candidates.len()
                ),
            }
        }
        Command::Build {
            kind,
            identifiers,
            term,
        } => {
            let catalogs = catalogs(&load)?;
            let service = service(&catalogs, kind.into())?;
            let candidate = pick_candidate(service, &identifiers.query(), term.as_deref()).await?;
            let builder = service.builder();
            let payload = builder
                .build(&candidate, &builder.options())
                .await
                .context("building add payload")?;
            let value: Value = serde_json::from_slice(&payload)?;
            print_json(&value)
        }
    }
}

fn load_config(cli: &Cli) -> Result<ConfigLoad> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if cli.no_env_file {
        loader = loader.without_env_file();
    } else if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }

    let load = loader.load().context("loading configuration")?;
    for warning in &load.warnings.items {
        match &warning.hint {
            Some(hint) => warn!(message = %warning.message, hint = %hint, "configuration warning"),
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }
    Ok(load)
}

fn catalogs(load: &ConfigLoad) -> Result<Catalogs> {
    Catalogs::from_config(&load.config).context("building catalog clients")
}

fn service(catalogs: &Catalogs, kind: CollectionKind) -> Result<&CatalogService> {
    catalogs
        .get(kind)
        .with_context(|| format!("no {kind} catalog service is configured"))
}

async fn check(load: &ConfigLoad) -> Result<()> {
    info!(source = ?load.source, env_file = load.env_file_loaded, "configuration loaded");
    let catalogs = catalogs(load)?;

    let mut failures = 0usize;
    let mut probed = 0usize;
    for service in catalogs.iter() {
        probed += 1;
        match service.probe().await {
            Ok(status) => {
                let version = status.get("version").and_then(Value::as_str).unwrap_or("unknown");
                println!("{}: ok ({}, version {version})", service.kind(), service.base_url());
            }
            Err(err) => {
                failures += 1;
                println!("{}: FAILED ({}): {err}", service.kind(), service.base_url());
            }
        }
    }

    if probed == 0 {
        bail!("no catalog services are configured");
    }
    if failures > 0 {
        bail!("{failures} of {probed} catalog services failed the probe");
    }
    Ok(())
}

async fn pick_candidate(
    service: &CatalogService,
    query: &IdentifierQuery,
    term: Option<&str>,
) -> Result<CandidateRecord> {
    if let Some(identifier_term) = identifier_term(query) {
        let candidates = service.lookup(&identifier_term).await?;
        return select(&candidates, query)
            .map(|selection| selection.candidate)
            .context("no candidate carried the requested identifiers");
    }

    let Some(term) = term.map(str::trim).filter(|term| !term.is_empty()) else {
        bail!("pass an identifier or --term");
    };
    let mut candidate = service
        .lookup(term)
        .await?
        .into_iter()
        .next()
        .with_context(|| format!("lookup for {term:?} returned nothing"))?;
    derive_author(&mut candidate);
    Ok(candidate)
}

fn identifier_term(query: &IdentifierQuery) -> Option<String> {
    IdentifierKind::PRIORITY
        .iter()
        .find_map(|kind| query.get(*kind))
        .map(str::to_string)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
