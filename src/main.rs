use clap::Parser;
use colored::*;
use futures_util::StreamExt;
use invoice_chat::transport::{ChatTransport, HttpTransport, ScriptedTransport};
use invoice_chat::*;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, LinesCodec};

fn build_transport(args: &Args) -> Result<Arc<dyn ChatTransport>> {
    if let Some(path) = &args.replay {
        let text = std::fs::read_to_string(path)?;
        tracing::info!(
            "Replaying {} bytes from {} in {}-byte chunks",
            text.len(),
            path.display(),
            args.replay_chunk_size
        );
        return Ok(Arc::new(ScriptedTransport::from_text(
            &text,
            args.replay_chunk_size,
        )));
    }

    let client = HttpTransport::build_client(
        Duration::from_secs(args.request_timeout_secs),
        Duration::from_secs(args.connect_timeout_secs),
    )?;
    Ok(Arc::new(
        HttpTransport::new(client, args.endpoint.clone()).with_auth_token(args.auth_token.clone()),
    ))
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Prints delivered invoices in place of the side panel.
fn print_panel(result: &StructuredResult) {
    println!(
        "{}",
        format!("── {} invoice(s) ──", result.len()).bold().cyan()
    );
    for invoice in result.invoices() {
        let total = match invoice.total_amount {
            Some(t) => format!("{:.2}", t),
            None => "-".to_string(),
        };
        let balance = match invoice.balance {
            Some(b) => format!("{:.2}", b),
            None => "-".to_string(),
        };
        println!(
            "  {:<10} {:<24} total {:>10} balance {:>10} due {}",
            invoice.label().bold(),
            invoice.customer_name().unwrap_or("-"),
            total,
            balance,
            invoice.due_date.as_deref().unwrap_or("-")
        );
        for line in &invoice.line_items {
            if let Some(desc) = &line.description {
                println!("      {}", desc.dimmed());
            }
        }
    }
}

async fn render_transcript(mut rx: broadcast::Receiver<TranscriptEvent>) {
    let mut shown_chars = 0usize;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Transcript renderer lagged by {} events", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            TranscriptEvent::TurnAppended { turn, .. } => {
                if turn.role == Role::User {
                    continue;
                }
                print!("{} {} ", timestamp().dimmed(), "assistant:".green().bold());
                if turn.in_progress {
                    shown_chars = turn.text.chars().count();
                    print!("{}", turn.text);
                } else {
                    println!("{}", turn.text);
                }
            }
            TranscriptEvent::TurnUpdated {
                text, in_progress, ..
            } => {
                let fresh: String = text.chars().skip(shown_chars).collect();
                shown_chars = text.chars().count();
                print!("{}", fresh);
                if !in_progress {
                    println!();
                    shown_chars = 0;
                }
            }
            TranscriptEvent::ScrollToLatest => {}
        }
        let _ = std::io::stdout().flush();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _guard = invoice_chat::logging::init_tracing(&args.log_dir);
    invoice_chat::logging::setup_panic_hook();

    let transport = match build_transport(&args) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to set up transport: {}", e.inner);
            std::process::exit(1);
        }
    };

    let mut session = SessionController::new(transport, SessionConfig::from(&args));
    let renderer = tokio::spawn(render_transcript(session.transcript().subscribe()));

    println!(
        "{}",
        "Ask me about your invoices! (/quit to leave)".bold()
    );

    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" || input == "/exit" {
            break;
        }

        let mut panel = |result: StructuredResult| print_panel(&result);
        match session.submit(input, &mut panel).await {
            Ok(outcome) => tracing::debug!("Turn outcome: {:?}", outcome),
            Err(e) => eprintln!("{} {}", "error:".red().bold(), e.inner),
        }
        session.settle().await;
    }

    session.cancel_reveal().await;
    drop(session);
    let _ = renderer.await;
}
