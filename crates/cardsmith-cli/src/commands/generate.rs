use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use cardsmith_application::{CardsmithEngine, Notification, NotificationLevel};
use cardsmith_core::generation::{CardType, GenerationOptions, GenerationOutcome, GenerationStatus};
use clap::{Args, ValueEnum};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::bootstrap::{self, BootstrapOptions};
use super::resolve::SourceArgs;

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum CardTypeArg {
    #[default]
    Basic,
    Reversed,
    Cloze,
}

impl From<CardTypeArg> for CardType {
    fn from(arg: CardTypeArg) -> Self {
        match arg {
            CardTypeArg::Basic => CardType::Basic,
            CardTypeArg::Reversed => CardType::Reversed,
            CardTypeArg::Cloze => CardType::Cloze,
        }
    }
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Continue a saved session instead of starting a new one
    #[arg(long)]
    pub session: Option<String>,

    /// Upper bound on the number of cards
    #[arg(short = 'n', long)]
    pub max_cards: Option<u32>,

    /// Deck name (repeatable)
    #[arg(short, long = "deck")]
    pub decks: Vec<String>,

    #[arg(long, value_enum, default_value_t)]
    pub card_type: CardTypeArg,

    #[arg(short, long)]
    pub model: Option<String>,

    #[arg(long)]
    pub validation_model: Option<String>,

    #[arg(long)]
    pub analysis_model: Option<String>,

    /// Custom prompt override as NAME=TEXT (repeatable)
    #[arg(long = "prompt", value_name = "NAME=TEXT")]
    pub prompts: Vec<String>,

    /// Skip document analysis before generating
    #[arg(long)]
    pub no_analysis: bool,
}

impl GenerateArgs {
    fn options(&self) -> Result<GenerationOptions> {
        Ok(GenerationOptions {
            deck_names: self.decks.clone(),
            card_type: self.card_type.into(),
            model: self.model.clone(),
            validation_model: self.validation_model.clone(),
            analysis_model: self.analysis_model.clone(),
            custom_prompts: parse_prompts(&self.prompts)?,
            max_cards: self.max_cards,
        })
    }
}

/// Parses `NAME=TEXT` pairs; later duplicates win.
pub fn parse_prompts(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((name, text)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), text.to_string()))
            }
            _ => bail!("Prompt '{}' must look like NAME=TEXT", pair),
        })
        .collect()
}

pub async fn run(options: &BootstrapOptions, args: GenerateArgs) -> Result<()> {
    let generation_options = args.options()?;
    let mut view = args.source.to_view()?;
    let app = bootstrap::build(options, !args.no_analysis)?;
    let engine = app.engine;

    if let Some(id) = &args.session {
        let session = engine
            .persistence
            .restore(id)
            .await
            .with_context(|| format!("Failed to open session {id}"))?;
        println!("📂 Continuing session '{}'", session.title);
        if view.document_text.trim().is_empty() {
            view.document_text = session.raw_text;
        }
    }
    if !view.document_text.trim().is_empty() {
        engine
            .persistence
            .on_text_changed(view.document_text.clone())
            .await;
    }

    let resolved = engine.resolver.resolve(&view);
    if resolved.is_empty() {
        bail!("Nothing to generate from: pass text, --file or --selection");
    }
    println!(
        "📝 Generating from {} ({} chars)",
        resolved.source,
        resolved.content.chars().count()
    );

    let printers = [
        spawn_notification_printer(engine.notifier.subscribe()),
        spawn_progress_printer(engine.orchestrator.status()),
    ];

    let orchestrator = engine.orchestrator.clone();
    let mut job = tokio::spawn(async move {
        orchestrator
            .start_resolved(resolved, generation_options)
            .await
    });
    let joined = tokio::select! {
        joined = &mut job => joined,
        _ = tokio::signal::ctrl_c() => {
            println!("⏹  Cancelling, cards produced so far will be kept...");
            engine.orchestrator.cancel().await;
            job.await
        }
    };
    let outcome = joined.context("Generation task panicked")??;

    engine.shutdown().await.context("Failed to save the session")?;
    tokio::task::yield_now().await;
    for printer in printers {
        printer.abort();
    }

    report(&engine, &outcome).await;
    Ok(())
}

async fn report(engine: &CardsmithEngine, outcome: &GenerationOutcome) {
    let session = engine.persistence.active_session().await;
    match outcome {
        GenerationOutcome::Completed { appended, .. } => {
            println!("✅ Added {appended} cards to '{}'", session.title);
            for card in session.cards.iter().rev().take(*appended).rev() {
                println!("  • {}  →  {}", card.front, card.back);
            }
        }
        GenerationOutcome::Cancelled { preserved, .. } => {
            println!("⏹  Cancelled, kept {preserved} cards");
        }
        GenerationOutcome::ContentScarcity {
            recommended_max, ..
        } => match recommended_max {
            Some(max) => println!("⚠️  Not enough content. Try --max-cards {max}."),
            None => println!("⚠️  Not enough content for that many cards."),
        },
        GenerationOutcome::Failed {
            message, preserved, ..
        } => {
            println!("❌ {message}");
            if *preserved > 0 {
                println!("   Kept {preserved} cards produced before the failure.");
            }
        }
    }
    println!("💾 Session {}", session.id);
}

fn spawn_notification_printer(mut rx: broadcast::Receiver<Notification>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    let icon = match notification.level {
                        NotificationLevel::Info => "ℹ️ ",
                        NotificationLevel::Success => "✅",
                        NotificationLevel::Warning => "⚠️ ",
                        NotificationLevel::Error => "❌",
                    };
                    eprintln!("{icon} {}", notification.message);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("[CLI] Skipped {} notifications", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_progress_printer(mut rx: watch::Receiver<GenerationStatus>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_stage = String::new();
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            if status.stage != last_stage {
                eprintln!("[{:>3}%] {}", status.progress, status.stage);
                last_stage = status.stage;
            }
        }
    })
}
