//! # Bagelfactor Database Crate
//!
//! Read-only access to the market data tables (daily bars, adjusted bars and
//! financial statements) kept in MySQL, returned as date-indexed tables.
//!
//! ## Architectural Principles
//!
//! - **One query template:** every series fetch is a `SeriesQuery` (table, value
//!   column, index/filter fields, symbol filter, date range) run through a single
//!   routine, then reshaped: renamed for one symbol, pivoted for several.
//! - **Bound parameters:** symbols and dates are always bound; table and column
//!   names are validated identifiers.
//! - **Asynchronous & Pooled:** all operations are async over a `MySqlPool`
//!   owned by the `Accessor` for its whole lifetime.
//!
//! ## Public API
//!
//! - `Accessor`: the query surface (`execute_raw`, `fetch_price_series`, the
//!   fundamental fetches and the close-price shortcuts).
//! - `ConnectionConfig`: validated connection parameters with a redacted password.
//! - `TimeSeriesTable`: the polars-backed, date-indexed result.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod accessor;
pub mod connection;
pub mod error;
pub mod query;
pub mod row;
pub mod source;
pub mod table;

#[cfg(test)]
mod fixture;

// Re-export the key components to create a clean, public-facing API.
pub use accessor::{Accessor, CLOSE_COLUMN};
pub use connection::{connect, connect_lazy, ConnectionConfig};
pub use error::DbError;
pub use query::{SeriesLayout, SeriesQuery, SymbolFilter};
pub use source::RowSource;
pub use table::TimeSeriesTable;
