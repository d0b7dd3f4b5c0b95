use anyhow::{Context, Result, bail};

use super::bootstrap::{self, BootstrapOptions};

pub async fn list(options: &BootstrapOptions) -> Result<()> {
    let engine = bootstrap::build(options, false)?.engine;
    let persisted = engine.persistence.load_state().await?;
    let sessions = engine.persistence.list_sessions().await?;

    if sessions.is_empty() {
        println!("📭 No saved sessions");
        return Ok(());
    }
    println!("📚 {} saved sessions", sessions.len());
    for session in sessions {
        let marker = if persisted.active_session_id.as_deref() == Some(session.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {}  {}  {:>3} cards  {}",
            session.id,
            session.updated_at,
            session.cards.len(),
            session.title
        );
    }
    Ok(())
}

pub async fn show(options: &BootstrapOptions, id: &str) -> Result<()> {
    let engine = bootstrap::build(options, false)?.engine;
    let sessions = engine.persistence.list_sessions().await?;
    let Some(session) = sessions.into_iter().find(|s| s.id == id) else {
        bail!("Session '{}' not found", id);
    };
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}

pub async fn restore(options: &BootstrapOptions, id: &str) -> Result<()> {
    let engine = bootstrap::build(options, false)?.engine;
    engine.restore().await?;
    let session = engine
        .persistence
        .restore(id)
        .await
        .with_context(|| format!("Failed to restore session {id}"))?;
    println!("📂 Active session: '{}' ({} cards)", session.title, session.cards.len());
    Ok(())
}

pub async fn delete(options: &BootstrapOptions, id: &str) -> Result<()> {
    let engine = bootstrap::build(options, false)?.engine;
    engine.restore().await?;
    engine
        .persistence
        .delete(id)
        .await
        .with_context(|| format!("Failed to delete session {id}"))?;
    println!("🗑️  Deleted session {id}");
    let active = engine.persistence.active_session().await;
    if !active.is_blank() {
        println!("📂 Active session: '{}'", active.title);
    }
    Ok(())
}

pub async fn clear(options: &BootstrapOptions, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("Refusing to delete every session without --yes");
    }
    let engine = bootstrap::build(options, false)?.engine;
    engine.persistence.clear_all().await?;
    println!("🗑️  Deleted every saved session");
    Ok(())
}
