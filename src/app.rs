use std::sync::Arc;

use anyhow::Result;
use chrono::DateTime;

use rchat::{
    domain::message::PendingMessage,
    infra::{
        cache_keys::STALE_CONVERSATIONS_KEY, cache_lock::CacheLock, contracts::read_json,
        error::AppError, file_cache::FileCache,
    },
    usecases::{
        bootstrap, logout::logout_and_reset, outbox::Outbox, reconciler::StaleConversation,
    },
};

use crate::cli::{Cli, Command};

const PREVIEW_CHARS: usize = 40;

pub fn run(cli: Cli) -> Result<()> {
    let context = bootstrap::bootstrap(cli.config.as_deref())?;
    context.layout.ensure_dirs()?;
    let _lock = CacheLock::acquire(context.layout.cache_lock_file())?;
    let cache = FileCache::new(&context.layout.cache_dir);

    tracing::debug!(
        cache_dir = %context.layout.cache_dir.display(),
        "cache directory locked"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command_or_default() {
        Command::Outbox => {
            let report = runtime.block_on(inspect_outbox(cache))?;
            for line in report_lines(&report) {
                println!("{line}");
            }
        }
        Command::Logout => {
            let outcome = runtime.block_on(logout_and_reset(&cache))?;
            println!(
                "Logout completed. Removed {} cached entries.",
                outcome.removed_entries
            );
        }
    }

    Ok(())
}

#[derive(Debug)]
struct OutboxReport {
    queued: Vec<PendingMessage>,
    stale_conversations: usize,
}

async fn inspect_outbox(cache: FileCache) -> Result<OutboxReport, AppError> {
    let cache = Arc::new(cache);
    let outbox = Outbox::load(Arc::clone(&cache)).await?;
    let stale: Vec<StaleConversation> = read_json(cache.as_ref(), STALE_CONVERSATIONS_KEY)
        .await?
        .unwrap_or_default();

    Ok(OutboxReport {
        queued: outbox.snapshot(),
        stale_conversations: stale.len(),
    })
}

fn report_lines(report: &OutboxReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.queued.len() + 2);

    if report.queued.is_empty() {
        lines.push("Outbox is empty.".to_owned());
    } else {
        lines.push(format!("{} queued message(s):", report.queued.len()));
        lines.extend(report.queued.iter().map(format_pending_line));
    }

    if report.stale_conversations > 0 {
        lines.push(format!(
            "{} conversation summary update(s) awaiting repair.",
            report.stale_conversations
        ));
    }

    lines
}

fn format_pending_line(pending: &PendingMessage) -> String {
    let created = DateTime::from_timestamp_millis(pending.created_at_ms)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_owned());

    format!(
        "{}  chat={}  {}  {}",
        pending.local_id,
        pending.chat_id,
        created,
        preview(&pending.text)
    )
}

fn preview(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }

    let mut cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}
