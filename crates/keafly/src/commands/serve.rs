//! `serve`: keep the pullers and the due-scanner running, streaming events.

use tokio::sync::broadcast::error::RecvError;

use keafly_core::Event;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

fn event_line(event: &Event, color: bool) -> String {
    let daemon = event
        .daemon_id
        .map(|id| format!(" [daemon {id}]"))
        .unwrap_or_default();
    format!(
        "{} {}{daemon} {}",
        event.created_at.format("%Y-%m-%d %H:%M:%S"),
        output::level_tag(event.level, color),
        event.text
    )
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let plane = super::open(global, true).await?;
    let mut events = plane.events();
    let color = output::should_color(global.color);
    tracing::info!(daemons = plane.registry().snapshot().len(), "serving");

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => output::print_output(&event_line(&event, color), global.quiet),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    plane.shutdown().await;
    Ok(())
}
