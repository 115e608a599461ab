// LCP Core - Readium LCP package reader
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use lcp_core::license::{AuthenticationReason, Authenticator, License};
use lcp_core::{Asset, FormatHints, LcpConfig, LcpService, PassphraseStore, Publication};
use sha2::{Digest, Sha256};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lcp-cli")]
#[command(about = "LCP package reader - desktop testing tool", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite passphrase database
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct PackageArgs {
    /// Package file (.lcpa, .lcpdf, .epub, ...)
    package: PathBuf,
    /// License document; defaults to the one embedded in the package
    #[arg(short, long)]
    license: Option<PathBuf>,
    /// Passphrase; prompted on stdin when missing or wrong
    #[arg(short, long)]
    passphrase: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print metadata and reading order
    Inspect(PackageArgs),
    /// Decrypt every reading-order resource in memory and print its SHA-256
    Verify(PackageArgs),
    /// Remove stored passphrases
    Forget {
        /// Only this license
        license_id: Option<String>,
    },
}

/// Reads the passphrase from the terminal
struct StdinAuthenticator;

#[async_trait]
impl Authenticator for StdinAuthenticator {
    async fn retrieve_passphrase(
        &self,
        license: &License,
        reason: AuthenticationReason,
        cancel: &CancellationToken,
    ) -> Option<String> {
        if reason == AuthenticationReason::InvalidPassphrase {
            eprintln!("Incorrect passphrase.");
        }
        let hint = license.text_hint().to_string();
        let read = tokio::task::spawn_blocking(move || {
            eprint!("Passphrase (hint: {}): ", hint);
            std::io::stderr().flush().ok();
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            }
        });
        tokio::select! {
            _ = cancel.cancelled() => None,
            line = read => line.ok().flatten().filter(|l| !l.is_empty()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => LcpConfig::from_json_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => LcpConfig::default(),
    };

    let mut service = LcpService::new(config)?.with_authenticator(Arc::new(StdinAuthenticator));
    if let Some(path) = &cli.store {
        service = service.with_store(PassphraseStore::open(path).await?);
    }

    match cli.command {
        Commands::Inspect(args) => {
            let publication = open(&service, &args).await?;
            inspect(&publication);
        }
        Commands::Verify(args) => {
            let publication = open(&service, &args).await?;
            verify(&publication)?;
        }
        Commands::Forget { license_id } => {
            if cli.store.is_none() {
                bail!("--store is required to forget stored passphrases");
            }
            service.forget_passphrases(license_id.as_deref()).await?;
            println!("Stored passphrases removed.");
        }
    }
    Ok(())
}

async fn open(service: &LcpService, args: &PackageArgs) -> anyhow::Result<Publication> {
    let asset = Asset::open(&args.package, FormatHints::default())?;
    let license = match &args.license {
        Some(path) => Some(read_file(path)?),
        None => None,
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let publication = service
        .open_publication(asset, license.as_deref(), args.passphrase.as_deref(), &cancel)
        .await
        .map_err(|e| {
            let message = e.user_message();
            anyhow::Error::new(e).context(message)
        })?;
    Ok(publication)
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn inspect(publication: &Publication) {
    let metadata = publication.metadata();
    let license = publication.license();
    println!("Format:     {}", publication.format());
    println!("Title:      {}", metadata.title.as_deref().unwrap_or("-"));
    println!("Authors:    {}", metadata.authors.join(", "));
    if let Some(duration) = metadata.duration {
        println!("Duration:   {:.0}s", duration);
    }
    println!("License:    {} ({}, {})", license.id(), license.provider(), license.status());
    if let Some(end) = license.rights().end {
        println!("Rights end: {}", end.to_rfc3339());
    }
    println!();
    println!("Reading order:");
    for (i, link) in publication.reading_order().iter().enumerate() {
        let length = link.length.map(|l| l.to_string()).unwrap_or_else(|| "?".to_string());
        println!(
            "  {:>3}. {} [{}] {} bytes{}",
            i + 1,
            link.href,
            link.media_type.as_deref().unwrap_or("-"),
            length,
            if link.encryption.is_encrypted() { ", encrypted" } else { "" }
        );
    }
}

fn verify(publication: &Publication) -> anyhow::Result<()> {
    let mut buf = vec![0u8; publication.chunk_window()];
    for link in publication.reading_order() {
        let mut reader = publication.open_resource(link);
        reader.open(0)?;

        let mut hasher = Sha256::new();
        let mut total = 0u64;
        loop {
            let n = reader
                .read_into(&mut buf)
                .with_context(|| format!("decrypting {}", link.href))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        reader.close();
        println!("{}  {} ({} bytes)", hex::encode(hasher.finalize()), link.href, total);
    }
    Ok(())
}
