//! Replay a CSV command file through a fresh engine.
//!
//! Input columns: `action,side,order_type,price,quantity,order_id`, where
//! `action` is `submit`, `cancel` or `adjust` (quantity is the signed
//! delta for `adjust`). Output is one JSON object per event on stdout,
//! followed by a final depth snapshot.
//!
//! Usage: cargo run --release --bin replay -- orders.csv --depth 5

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use match_book::command::parse_decimal;
use match_book::{
    AdjustLevel, CancelOrder, Command, Engine, EngineConfig, OrderRequest, OutputEvent,
};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Replay order flow and print trades and the resulting book
#[derive(Parser, Debug)]
#[clap(name = "replay")]
struct Cli {
    /// CSV command file, `-` for stdin
    input: PathBuf,

    /// JSON engine configuration
    #[clap(long)]
    config: Option<PathBuf>,

    /// Override the configured symbol
    #[clap(long)]
    symbol: Option<String>,

    /// Levels per side in the final snapshot
    #[clap(long, default_value_t = 10)]
    depth: usize,
}

#[derive(Debug, Deserialize)]
struct Row {
    action: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    order_type: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    quantity: String,
    order_id: Option<u64>,
}

impl Row {
    fn to_command(&self) -> Result<Command> {
        let command = match self.action.trim().to_ascii_lowercase().as_str() {
            "submit" => {
                let price = if self.price.trim().is_empty() { "0" } else { self.price.as_str() };
                Command::Submit(OrderRequest::parse(
                    price,
                    &self.quantity,
                    &self.side,
                    &self.order_type,
                )?)
            }
            "cancel" => Command::Cancel(CancelOrder {
                order_id: self.order_id.context("cancel requires order_id")?,
            }),
            "adjust" => Command::AdjustLevel(AdjustLevel {
                side: self.side.parse()?,
                price: parse_decimal("price", &self.price)?,
                delta: parse_decimal("quantity", &self.quantity)?,
            }),
            other => bail!("unknown action {:?}", other),
        };
        Ok(command)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(symbol) = cli.symbol {
        config.symbol = symbol;
    }
    let engine = Engine::new(config)?;

    let source: Box<dyn Read> = if cli.input.as_os_str() == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(
            File::open(&cli.input)
                .with_context(|| format!("opening {}", cli.input.display()))?,
        )
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut rows = 0usize;
    let mut rejected = 0usize;

    for (line, record) in reader.deserialize::<Row>().enumerate() {
        let row = record.with_context(|| format!("reading row {}", line + 1))?;
        rows += 1;

        let events = match row.to_command() {
            Ok(command) => engine.process_command(command),
            Err(e) => vec![OutputEvent::Rejected(e.to_string())],
        };
        for event in &events {
            if let OutputEvent::Rejected(reason) = event {
                rejected += 1;
                warn!(row = line + 1, %reason, "command rejected");
            }
            serde_json::to_writer(&mut out, event)?;
            writeln!(out)?;
        }
    }

    serde_json::to_writer(&mut out, &engine.snapshot(cli.depth))?;
    writeln!(out)?;
    out.flush()?;

    info!(
        rows,
        rejected,
        trades = engine.trade_count(),
        resting = engine.order_count(),
        "replay complete"
    );
    Ok(())
}
