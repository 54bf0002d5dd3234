use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use configuration::{init_logging, load_config_from};
use core_types::{Market, Value};
use database::{Accessor, ConnectionConfig, TimeSeriesTable};
use std::path::PathBuf;
use tracing::info;

/// The main entry point for the bagelfactor market data CLI.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    // Held until exit so buffered file logs are flushed.
    let _log_guard = init_logging(&config.logging)?;

    let db = Accessor::new(ConnectionConfig::from_settings(&config.database)?);
    info!(target_db = %db.config(), "Starting");

    let result = run(&db, cli.command).await;
    db.close().await;
    result
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Query daily prices and fundamentals for CN and US equities.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a literal SQL statement and print every row.
    Raw {
        /// The statement, sent verbatim.
        sql: String,
    },
    /// Fetch one column of a daily price table.
    Price {
        /// The table to read (e.g., "daily", "us_daily", "us_daily_adj").
        #[arg(long)]
        table: String,
        /// The value column (e.g., "open", "close").
        #[arg(long)]
        column: String,
        #[command(flatten)]
        selection: Selection,
    },
    /// Fetch one column of a financial statement table.
    Fundamental {
        /// The table to read (e.g., "cashflow", "income").
        #[arg(long)]
        table: String,
        /// The value column (e.g., "net_profit").
        #[arg(long)]
        column: String,
        #[command(flatten)]
        selection: Selection,
    },
    /// Fetch close prices for a market: cn, us or us-adj.
    Close {
        #[arg(long)]
        market: Market,
        #[command(flatten)]
        selection: Selection,
    },
}

#[derive(Args)]
struct Selection {
    /// A symbol such as "000001.SZ" or "AAPL". Repeat for a pivoted multi-symbol table.
    #[arg(long = "symbol", required = true)]
    symbols: Vec<String>,

    /// The first date to include (format: YYYY-MM-DD). Defaults to 1970-01-01.
    #[arg(long)]
    from: Option<NaiveDate>,

    /// The last date to include (format: YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl Selection {
    /// The symbol when exactly one was given.
    fn single(&self) -> Option<&str> {
        match self.symbols.as_slice() {
            [symbol] => Some(symbol),
            _ => None,
        }
    }
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn run(db: &Accessor, command: Commands) -> Result<()> {
    match command {
        Commands::Raw { sql } => {
            let rows = db.execute_raw(&sql).await?;
            println!("{}", render_rows(&rows));
        }
        Commands::Price { table, column, selection } => {
            let Selection { from, to, .. } = selection;
            let result = match selection.single() {
                Some(symbol) => db.fetch_price_series(&table, &column, symbol, from, to).await?,
                None => {
                    db.fetch_price_series_multi(&table, &column, &selection.symbols, from, to)
                        .await?
                }
            };
            println!("{}", render_series(&result)?);
        }
        Commands::Fundamental { table, column, selection } => {
            let Selection { from, to, .. } = selection;
            let result = match selection.single() {
                Some(symbol) => {
                    db.fetch_fundamental_series(symbol, &table, &column, from, to)
                        .await?
                }
                None => {
                    db.fetch_fundamental_series_multi(&selection.symbols, &table, &column, from, to)
                        .await?
                }
            };
            println!("{}", render_series(&result)?);
        }
        Commands::Close { market, selection } => {
            let Selection { from, to, .. } = selection;
            let result = match selection.single() {
                Some(symbol) => db.market_close(market, symbol, from, to).await?,
                None => {
                    db.market_close_symbols(market, &selection.symbols, from, to)
                        .await?
                }
            };
            println!("{}", render_series(&result)?);
        }
    }

    Ok(())
}

fn render_rows(rows: &[Vec<Value>]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    for row in rows {
        table.add_row(row.iter().map(ToString::to_string));
    }
    table
}

fn render_series(series: &TimeSeriesTable) -> Result<Table> {
    let columns = series.columns();
    let values = columns
        .iter()
        .map(|name| series.column(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(std::iter::once(series.index_name().to_string()).chain(columns.iter().cloned()));

    for (i, date) in series.dates()?.into_iter().enumerate() {
        let cells = values
            .iter()
            .map(|column| column[i].map(|v| v.to_string()).unwrap_or_default());
        table.add_row(std::iter::once(date.to_string()).chain(cells));
    }

    Ok(table)
}
