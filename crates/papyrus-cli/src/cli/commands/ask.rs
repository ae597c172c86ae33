//! Ask command handler.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use papyrus_core::ask::{
    AnswerStreamConsumer, ConversationTurn, HttpTransport, TurnState, TurnUpdate, UpdateRx,
    UpdateSender, create_update_channel,
};
use papyrus_core::config::Config;
use papyrus_types::{QuerySettings, Source};
use tokio::sync::Mutex;

use super::history::open_store;

pub struct AskOptions {
    pub query: String,
    pub top_k: Option<u32>,
    pub bm25_weight: Option<f64>,
    pub template: Option<String>,
    pub html: bool,
}

impl AskOptions {
    /// Flags override the `[query]` defaults from config.
    fn settings(&self, config: &Config) -> QuerySettings {
        let defaults = &config.query;
        QuerySettings::balanced(
            self.top_k.unwrap_or(defaults.top_k),
            self.bm25_weight.unwrap_or(defaults.bm25_weight),
            self.template
                .clone()
                .unwrap_or_else(|| defaults.prompt_template.clone()),
        )
    }
}

pub async fn run(opts: AskOptions, config: &Config) -> Result<()> {
    let query = opts.query.trim();
    if query.is_empty() {
        bail!("Query must not be empty");
    }
    let settings = opts.settings(config);

    let transport = HttpTransport::new(config.api_base_url()?, config.request_timeout())?;
    let history = Arc::new(Mutex::new(open_store()?));

    let (tx, rx) = create_update_channel();
    let consumer = AnswerStreamConsumer::new(transport, history).with_updates(UpdateSender::new(tx));

    let printer = tokio::spawn(stream_answer(rx, !opts.html));
    let turn = consumer.ask(query, &settings).await;
    drop(consumer);
    let printed = printer.await.context("answer printer task")??;

    finish(&turn, printed, opts.html)
}

/// Prints answer text as it grows. Returns how many bytes were written.
///
/// Every update carries the full answer so far; only the unseen suffix is
/// written.
async fn stream_answer(mut rx: UpdateRx, echo: bool) -> Result<usize> {
    let mut printed = 0;
    while let Some(update) = rx.recv().await {
        match update {
            TurnUpdate::AnswerUpdated { answer, .. } if echo => {
                printed = write_suffix(&answer, printed)?;
            }
            TurnUpdate::State(state) => tracing::debug!(?state, "turn state"),
            _ => {}
        }
    }
    Ok(printed)
}

fn write_suffix(answer: &str, printed: usize) -> Result<usize> {
    let Some(suffix) = answer.get(printed..) else {
        return Ok(printed);
    };
    if suffix.is_empty() {
        return Ok(printed);
    }
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(suffix.as_bytes())?;
    stdout.flush()?;
    Ok(answer.len())
}

fn finish(turn: &ConversationTurn, printed: usize, html: bool) -> Result<()> {
    if turn.state == TurnState::Failed {
        if printed > 0 {
            println!();
        }
        let message = turn.error.as_deref().unwrap_or("Request failed");
        bail!("Error: {message}");
    }

    if html {
        println!("{}", turn.html());
    } else {
        write_suffix(&turn.answer, printed)?;
        if !turn.answer.is_empty() {
            println!();
        }
    }

    if !turn.sources.is_empty() && !html {
        println!();
        print_sources(&turn.sources);
    }

    if turn.state == TurnState::Complete {
        if let Some(summary) = turn.timing_summary() {
            eprintln!("{summary}");
        }
    } else if turn.is_truncated() {
        eprintln!("Answer stream ended early; the answer may be incomplete and was not saved.");
    }
    Ok(())
}

pub(crate) fn print_sources(sources: &[Source]) {
    println!("Sources:");
    for (idx, source) in sources.iter().enumerate() {
        let label = source.title.as_deref().unwrap_or(&source.chunk_id);
        let page = source
            .page_number
            .map(|p| format!(", page {p}"))
            .unwrap_or_default();
        println!(
            "  [{}] {label}{page} (score {:.2})",
            idx + 1,
            source.score
        );
    }
}
