use std::io::{self, BufRead, Write};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use textcheck_client::cli::{parse_rating, Args};
use textcheck_client::encoder::FileAttachment;
use textcheck_client::render::TerminalView;
use textcheck_client::state::{Panel, PipelineState, MAX_RATING, MIN_RATING};
use textcheck_client::{Controller, Driver, Event};

/// Ask for a rating and an optional comment on stdin.
fn prompt_feedback() -> io::Result<(Option<u8>, Option<String>)> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    print!("Rate these results ({MIN_RATING}-{MAX_RATING}, blank to skip): ");
    io::stdout().flush()?;
    let rating = match lines.next() {
        Some(line) => parse_rating(&line?),
        None => None,
    };
    if rating.is_none() {
        return Ok((None, None));
    }

    print!("Comment (optional): ");
    io::stdout().flush()?;
    let comment = match lines.next() {
        Some(line) => Some(line?),
        None => None,
    };
    Ok((rating, comment))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = args.resolve_config()?;
    let pipeline = config.default_pipeline;

    let controller = Controller::new(config.url(), TerminalView::stdout());
    let mut driver = Driver::new(controller, config.request_timeout());

    let handle = driver.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown();
        }
    });

    let file = args.file.as_ref().map(FileAttachment::from_path);
    if let Err(err) = driver.submit(pipeline, &args.text, file) {
        driver.finish();
        return Err(err.into());
    }

    if !driver.run_until(|s| !s.pipelines.is_busy(pipeline)).await {
        // Interrupted.
        return Ok(());
    }
    if driver.state().pipelines.get(pipeline) != PipelineState::Done {
        driver.finish();
        return Err(format!("{pipeline} check did not complete").into());
    }

    if args.expand {
        driver.apply(Event::ToggleFullscreen(Panel::results_for(pipeline)));
    }

    if args.feedback {
        driver.apply(Event::OpenFeedback(pipeline));
        let (rating, comment) = tokio::task::spawn_blocking(prompt_feedback).await??;
        if rating.is_some() {
            // A rejected rating is already in the log; nothing to wait for.
            if driver.submit_feedback(pipeline, rating, comment).is_ok() {
                driver.run_until(|s| !s.feedback.submitting).await;
            }
        } else {
            driver.apply(Event::CloseFeedback);
        }
    }

    driver.finish();
    Ok(())
}
