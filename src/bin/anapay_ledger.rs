use anyhow::{Result, anyhow, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anapay_ledger::auth::oauth::{GMAIL_READONLY_SCOPE, SPREADSHEETS_SCOPE};
use anapay_ledger::auth::service_account::ServiceAccount;
use anapay_ledger::auth::token_manager::TokenManager;
use anapay_ledger::auth::{AccessTokenProvider, token_store};
use anapay_ledger::config::load_config;
use anapay_ledger::domain::RawMessage;
use anapay_ledger::mail::GmailClient;
use anapay_ledger::parse::parse_message;
use anapay_ledger::pipeline::Pipeline;
use anapay_ledger::retry::{Sleeper, ThreadSleeper};
use anapay_ledger::sheets::{GoogleWorksheet, PrintSink, RecordSink, SpreadsheetSink};

#[derive(Parser)]
#[command(name = "anapay_ledger")]
#[command(about = "Copy ANA Pay usage notifications from Gmail into a Google spreadsheet", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the mailbox and append one row per notification
    Run {
        /// First day to search (inclusive), overrides the config
        #[arg(long)]
        after: Option<NaiveDate>,

        /// Last day to search (inclusive), overrides the config
        #[arg(long)]
        before: Option<NaiveDate>,

        /// Print rows instead of writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse a saved .eml notification and print its row
    Parse { file: PathBuf },

    /// Store the OAuth client secret in keyring
    SetClientSecret {
        #[arg(long)]
        client_id: String,
    },
}

fn run(after: Option<NaiveDate>, before: Option<NaiveDate>, dry_run: bool) -> Result<()> {
    let mut cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
    if let Some(d) = after {
        cfg.query.after = d;
    }
    if let Some(d) = before {
        cfg.query.before = d;
    }
    if cfg.query.after > cfg.query.before {
        bail!(
            "search window is empty: {} is after {}",
            cfg.query.after,
            cfg.query.before
        );
    }

    // Without a service account the user's own token has to cover the sheet.
    // Dry runs ask for the same grant so the cached token suits a later run.
    let scopes: &[&'static str] = if cfg.service_account_key.is_some() {
        &[GMAIL_READONLY_SCOPE]
    } else {
        &[GMAIL_READONLY_SCOPE, SPREADSHEETS_SCOPE]
    };
    let user = Rc::new(TokenManager::from_config(&cfg, scopes)?);
    let mail = GmailClient::new(user.clone())?;
    let sleeper: Rc<dyn Sleeper> = Rc::new(ThreadSleeper);

    info!("fetching ANA Pay notifications");
    let summary = if dry_run {
        Pipeline::new(&mail, PrintSink, sleeper).run(&cfg.query)?
    } else {
        let sheet_tokens: Rc<dyn AccessTokenProvider> = match &cfg.service_account_key {
            Some(path) => Rc::new(ServiceAccount::from_file(
                Path::new(path),
                &[SPREADSHEETS_SCOPE],
            )?),
            None => user,
        };
        let worksheet = GoogleWorksheet::open_first(sheet_tokens, cfg.spreadsheet_id()?)?;
        info!("appending to worksheet {:?}", worksheet.title());

        let sink = SpreadsheetSink::new(worksheet, sleeper.clone());
        Pipeline::new(&mail, sink, sleeper).run(&cfg.query)?
    };

    info!(
        "done: {} notifications, {} rows written",
        summary.messages, summary.written
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Run {
            after,
            before,
            dry_run,
        } => run(after, before, dry_run),

        Command::Parse { file } => {
            let raw = std::fs::read(&file)?;
            let msg = RawMessage::from_rfc822(file.display().to_string(), &raw)?;
            let record = parse_message(&msg);
            PrintSink.append(&record)?;
            Ok(())
        }

        Command::SetClientSecret { client_id } => {
            eprintln!("Paste client secret (end with Ctrl-D):");
            let mut secret = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut secret)?;
            let secret = secret.trim();
            token_store::save_client_secret(&client_id, secret)?;
            println!("Saved client secret for client_id {}", client_id);
            Ok(())
        }
    }
}
