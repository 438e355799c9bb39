//! # Slotgraph
//!
//! The binary for the slot graph engine.
//!
//! ## Usage
//!
//! ```bash
//! # Show what would change
//! slotgraph plan --target pickup engine.json radiator.json
//!
//! # Apply and write manifest.json + parts.json
//! slotgraph adapt --config rules.toml --output out/ engine.json radiator.json
//!
//! # Reproducibility check
//! slotgraph snapshot -t pickup -o run.snap engine.json radiator.json
//! slotgraph verify -t pickup --snapshot run.snap engine.json radiator.json
//!
//! # Slot tree with markers and history
//! slotgraph tree -t pickup --history engine.json radiator.json
//! ```

use clap::Parser;
use slotgraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // SLOTGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("SLOTGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "slotgraph=info,slotgraph_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
