use crate::connection::{self, ConnectionConfig};
use crate::error::DbError;
use crate::query::{
    SeriesLayout, SeriesQuery, SymbolFilter, FUNDAMENTAL_LAYOUT, FUNDAMENTAL_MULTI_LAYOUT,
    PRICE_LAYOUT,
};
use crate::source::RowSource;
use crate::table::TimeSeriesTable;
use chrono::NaiveDate;
use core_types::{DateRange, Market, Value};
use sqlx::mysql::MySqlPool;
use tracing::{debug, info, instrument};

/// Price column used by the close-price shortcuts.
pub const CLOSE_COLUMN: &str = "close";

/// The market data accessor: one connection pool plus the query surface over it.
///
/// The pool is created with the accessor and closed when it is dropped or
/// [`Accessor::close`]d.
#[derive(Debug)]
pub struct Accessor<S = MySqlPool> {
    config: ConnectionConfig,
    source: S,
}

impl Accessor<MySqlPool> {
    /// Creates the pool without opening a connection; the first query connects.
    /// `config` was already validated when it was built.
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ConnectionConfig) -> Self {
        let pool = connection::connect_lazy(&config);
        info!(target_db = %config, "Database accessor created");
        Self { config, source: pool }
    }

    /// Like [`Accessor::new`], but fails with `DbError::Connection` if the server is unreachable.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, DbError> {
        let pool = connection::connect(&config).await?;
        Ok(Self { config, source: pool })
    }

    /// Closes every pooled connection, waiting for checked-out ones to be returned.
    pub async fn close(self) {
        self.source.close().await;
        info!(target_db = %self.config, "Database accessor closed");
    }
}

impl<S: RowSource> Accessor<S> {
    /// Wraps an arbitrary row source, e.g. an in-memory fixture.
    pub fn with_source(config: ConnectionConfig, source: S) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Executes `sql` verbatim in its own transaction and returns every row.
    ///
    /// The text is sent as-is; never build it from untrusted input.
    #[instrument(skip(self), level = "debug")]
    pub async fn execute_raw(&self, sql: &str) -> Result<Vec<Vec<Value>>, DbError> {
        self.source.execute_raw(sql).await
    }

    /// Runs any series query and reshapes the rows.
    ///
    /// Single-symbol queries yield one column named after the symbol;
    /// multi-symbol queries are pivoted into one column per symbol found.
    pub async fn fetch_series(&self, query: &SeriesQuery) -> Result<TimeSeriesTable, DbError> {
        let index = query.layout.index_field;

        if query.symbols.is_empty() {
            debug!(table = %query.table, "No symbols requested; skipping query");
            return TimeSeriesTable::empty(index);
        }

        let rows = self.source.fetch_series_rows(query).await?;
        debug!(table = %query.table, column = %query.value_field, rows = rows.len(), "Series rows fetched");

        match &query.symbols {
            SymbolFilter::One(symbol) => TimeSeriesTable::from_series_rows(index, symbol, &rows),
            SymbolFilter::Many(_) => TimeSeriesTable::pivot_rows(index, &rows),
        }
    }

    async fn fetch_one(
        &self,
        layout: SeriesLayout,
        table: &str,
        column: &str,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError> {
        let query = SeriesQuery::new(
            table,
            column,
            layout,
            SymbolFilter::One(symbol.to_string()),
            DateRange::resolve(start, end),
        )?;
        self.fetch_series(&query).await
    }

    async fn fetch_many(
        &self,
        layout: SeriesLayout,
        table: &str,
        column: &str,
        symbols: SymbolFilter,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError> {
        let query = SeriesQuery::new(table, column, layout, symbols, DateRange::resolve(start, end))?;
        self.fetch_series(&query).await
    }

    /// Daily values of `column` for one symbol, indexed by `trade_date`,
    /// with the value column renamed to `symbol`.
    #[instrument(skip(self))]
    pub async fn fetch_price_series(
        &self,
        table: &str,
        column: &str,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError> {
        self.fetch_one(PRICE_LAYOUT, table, column, symbol, start, end).await
    }

    /// Daily values of `column` for several symbols, one column per symbol with data.
    #[instrument(skip(self, symbols))]
    pub async fn fetch_price_series_multi<I, T>(
        &self,
        table: &str,
        column: &str,
        symbols: I,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let symbols = SymbolFilter::many(symbols);
        self.fetch_many(PRICE_LAYOUT, table, column, symbols, start, end).await
    }

    /// Fundamental values of `column` for one symbol, indexed by `f_ann_date`
    /// and filtered on `ann_date`.
    #[instrument(skip(self))]
    pub async fn fetch_fundamental_series(
        &self,
        symbol: &str,
        table: &str,
        column: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError> {
        self.fetch_one(FUNDAMENTAL_LAYOUT, table, column, symbol, start, end).await
    }

    /// Fundamental values of `column` for several symbols, indexed and filtered on `f_ann_date`.
    #[instrument(skip(self, symbols))]
    pub async fn fetch_fundamental_series_multi<I, T>(
        &self,
        symbols: I,
        table: &str,
        column: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let symbols = SymbolFilter::many(symbols);
        self.fetch_many(FUNDAMENTAL_MULTI_LAYOUT, table, column, symbols, start, end).await
    }

    // ==========================================================================
    // Close price shortcuts
    // ==========================================================================

    pub async fn market_close(
        &self,
        market: Market,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError> {
        self.fetch_price_series(market.daily_table(), CLOSE_COLUMN, symbol, start, end)
            .await
    }

    pub async fn market_close_symbols<I, T>(
        &self,
        market: Market,
        symbols: I,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.fetch_price_series_multi(market.daily_table(), CLOSE_COLUMN, symbols, start, end)
            .await
    }

    pub async fn cn_close(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError> {
        self.market_close(Market::Cn, symbol, start, end).await
    }

    pub async fn us_close(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError> {
        self.market_close(Market::Us, symbol, start, end).await
    }

    pub async fn us_adj_close(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError> {
        self.market_close(Market::UsAdjusted, symbol, start, end).await
    }

    pub async fn cn_close_symbols<I, T>(
        &self,
        symbols: I,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.market_close_symbols(Market::Cn, symbols, start, end).await
    }

    pub async fn us_close_symbols<I, T>(
        &self,
        symbols: I,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.market_close_symbols(Market::Us, symbols, start, end).await
    }

    pub async fn us_adj_close_symbols<I, T>(
        &self,
        symbols: I,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TimeSeriesTable, DbError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.market_close_symbols(Market::UsAdjusted, symbols, start, end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::InMemorySource;
    use chrono::Local;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("localhost", 3306, "test", "test", "tushare").unwrap()
    }

    fn bar(source: &mut InMemorySource, table: &str, symbol: &str, date: NaiveDate, close: f64) {
        source.insert(
            table,
            &[
                ("ts_code", symbol.into()),
                ("trade_date", date.into()),
                ("close", close.into()),
                ("open", (close * 2.0).into()),
            ],
        );
    }

    fn daily_fixture() -> Accessor<InMemorySource> {
        let mut source = InMemorySource::new();
        bar(&mut source, "daily", "000001.SZ", ymd(2020, 1, 2), 10.5);
        bar(&mut source, "daily", "000001.SZ", ymd(2020, 1, 1), 10.0);
        bar(&mut source, "daily", "000001.SZ", ymd(2020, 1, 1), 10.0);
        bar(&mut source, "daily", "000001.SZ", ymd(2020, 1, 6), 11.0);
        bar(&mut source, "daily", "000002.SZ", ymd(2020, 1, 2), 20.0);
        bar(&mut source, "daily", "A", ymd(2020, 1, 2), 1.0);
        bar(&mut source, "daily", "A", ymd(2020, 1, 3), 1.5);
        bar(&mut source, "us_daily", "AAPL", ymd(2020, 1, 2), 300.0);
        bar(&mut source, "us_daily_adj", "AAPL", ymd(2020, 1, 2), 75.0);
        bar(&mut source, "us_daily_adj", "MSFT", ymd(2020, 1, 3), 160.0);
        Accessor::with_source(config(), source)
    }

    fn fundamental_fixture() -> Accessor<InMemorySource> {
        let mut source = InMemorySource::new();
        let rows = [
            // ts_code, ann_date, f_ann_date, net_profit
            ("000001.SZ", ymd(2020, 3, 1), ymd(2020, 3, 5), 1.0),
            ("000001.SZ", ymd(2020, 8, 1), ymd(2020, 8, 2), 2.0),
            // Announced inside the range, first filed after it.
            ("000001.SZ", ymd(2020, 12, 30), ymd(2021, 1, 4), 3.0),
            ("000002.SZ", ymd(2020, 3, 1), ymd(2020, 3, 5), 5.0),
        ];
        for (symbol, ann, f_ann, profit) in rows {
            source.insert(
                "cashflow",
                &[
                    ("ts_code", symbol.into()),
                    ("ann_date", ann.into()),
                    ("f_ann_date", f_ann.into()),
                    ("net_profit", profit.into()),
                ],
            );
        }
        Accessor::with_source(config(), source)
    }

    #[tokio::test]
    async fn test_price_series_scenario() {
        let db = daily_fixture();
        let table = db
            .fetch_price_series("daily", "close", "000001.SZ", Some(ymd(2020, 1, 1)), Some(ymd(2020, 1, 3)))
            .await
            .unwrap();

        assert_eq!(table.index_name(), "trade_date");
        assert_eq!(table.columns(), vec!["000001.SZ".to_string()]);
        assert_eq!(table.dates().unwrap(), vec![ymd(2020, 1, 1), ymd(2020, 1, 2)]);
        assert_eq!(table.column("000001.SZ").unwrap(), vec![Some(10.0), Some(10.5)]);
    }

    #[tokio::test]
    async fn test_price_series_stays_within_range_sorted_and_unique() {
        let db = daily_fixture();
        let ranges = [
            (ymd(2020, 1, 1), ymd(2020, 1, 1)),
            (ymd(2020, 1, 2), ymd(2020, 1, 6)),
            (ymd(2019, 1, 1), ymd(2021, 1, 1)),
            (ymd(2020, 1, 7), ymd(2020, 1, 1)),
        ];
        for (start, end) in ranges {
            let table = db
                .fetch_price_series("daily", "close", "000001.SZ", Some(start), Some(end))
                .await
                .unwrap();
            let dates = table.dates().unwrap();
            assert!(dates.iter().all(|d| start <= *d && *d <= end));
            assert!(dates.windows(2).all(|w| w[0] < w[1]), "{dates:?}");
        }
    }

    #[tokio::test]
    async fn test_value_column_is_renamed_to_symbol() {
        let db = daily_fixture();
        let table = db
            .fetch_price_series("daily", "open", "000002.SZ", None, None)
            .await
            .unwrap();
        assert_eq!(table.columns(), vec!["000002.SZ".to_string()]);
        assert_eq!(table.column("000002.SZ").unwrap(), vec![Some(40.0)]);
    }

    #[tokio::test]
    async fn test_no_matching_rows_is_an_empty_table() {
        let db = daily_fixture();
        let table = db
            .fetch_price_series("daily", "close", "600000.SH", None, None)
            .await
            .unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns(), vec!["600000.SH".to_string()]);
    }

    #[tokio::test]
    async fn test_multi_symbol_omits_symbols_without_rows() {
        let db = daily_fixture();
        let table = db
            .fetch_price_series_multi("daily", "close", ["A", "B"], Some(ymd(2020, 1, 1)), Some(ymd(2020, 1, 3)))
            .await
            .unwrap();
        assert_eq!(table.columns(), vec!["A".to_string()]);
        assert_eq!(table.column("A").unwrap(), vec![Some(1.0), Some(1.5)]);
    }

    #[tokio::test]
    async fn test_multi_symbol_pivot_fills_gaps_with_null() {
        let db = daily_fixture();
        let table = db
            .fetch_price_series_multi(
                "daily",
                "close",
                vec!["000001.SZ".to_string(), "000002.SZ".to_string()],
                Some(ymd(2020, 1, 1)),
                Some(ymd(2020, 1, 3)),
            )
            .await
            .unwrap();
        assert_eq!(table.columns(), vec!["000001.SZ".to_string(), "000002.SZ".to_string()]);
        assert_eq!(table.dates().unwrap(), vec![ymd(2020, 1, 1), ymd(2020, 1, 2)]);
        assert_eq!(table.column("000002.SZ").unwrap(), vec![None, Some(20.0)]);
    }

    #[tokio::test]
    async fn test_empty_symbol_set_skips_the_database() {
        let db = daily_fixture();
        let table = db
            .fetch_price_series_multi("daily", "close", Vec::<String>::new(), None, None)
            .await
            .unwrap();
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
        assert_eq!(db.source.query_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_fetch_is_identical() {
        let db = daily_fixture();
        let first = db.cn_close_symbols(["000001.SZ", "000002.SZ"], None, None).await.unwrap();
        let second = db.cn_close_symbols(["000001.SZ", "000002.SZ"], None, None).await.unwrap();
        assert_eq!(first.dates().unwrap(), second.dates().unwrap());
        for column in first.columns() {
            assert_eq!(first.column(&column).unwrap(), second.column(&column).unwrap());
        }
    }

    #[tokio::test]
    async fn test_default_range_matches_explicit_bounds() {
        let db = daily_fixture();
        let implicit = db.cn_close("000001.SZ", None, None).await.unwrap();
        let explicit = db
            .cn_close("000001.SZ", Some(ymd(1970, 1, 1)), Some(Local::now().date_naive()))
            .await
            .unwrap();
        assert_eq!(implicit.dates().unwrap(), explicit.dates().unwrap());
        assert_eq!(implicit.len(), 3);
    }

    #[tokio::test]
    async fn test_close_shortcuts_bind_tables() {
        let db = daily_fixture();
        let us = db.us_close("AAPL", None, None).await.unwrap();
        assert_eq!(us.column("AAPL").unwrap(), vec![Some(300.0)]);

        let adj = db.us_adj_close("AAPL", None, None).await.unwrap();
        assert_eq!(adj.column("AAPL").unwrap(), vec![Some(75.0)]);

        let adj_multi = db.us_adj_close_symbols(["AAPL", "MSFT", "TSLA"], None, None).await.unwrap();
        assert_eq!(adj_multi.columns(), vec!["AAPL".to_string(), "MSFT".to_string()]);

        let us_multi = db.us_close_symbols(["AAPL"], None, None).await.unwrap();
        assert_eq!(us_multi.columns(), vec!["AAPL".to_string()]);
    }

    #[tokio::test]
    async fn test_fundamental_filters_on_ann_date_and_indexes_on_f_ann_date() {
        let db = fundamental_fixture();
        let table = db
            .fetch_fundamental_series("000001.SZ", "cashflow", "net_profit", Some(ymd(2020, 1, 1)), Some(ymd(2020, 12, 31)))
            .await
            .unwrap();

        assert_eq!(table.index_name(), "f_ann_date");
        assert_eq!(
            table.dates().unwrap(),
            vec![ymd(2020, 3, 5), ymd(2020, 8, 2), ymd(2021, 1, 4)]
        );
        assert_eq!(table.column("000001.SZ").unwrap(), vec![Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[tokio::test]
    async fn test_fundamental_multi_filters_on_f_ann_date() {
        let db = fundamental_fixture();
        let table = db
            .fetch_fundamental_series_multi(
                ["000001.SZ", "000002.SZ"],
                "cashflow",
                "net_profit",
                Some(ymd(2020, 1, 1)),
                Some(ymd(2020, 12, 31)),
            )
            .await
            .unwrap();

        assert_eq!(table.index_name(), "f_ann_date");
        assert_eq!(table.dates().unwrap(), vec![ymd(2020, 3, 5), ymd(2020, 8, 2)]);
        assert_eq!(table.column("000001.SZ").unwrap(), vec![Some(1.0), Some(2.0)]);
        assert_eq!(table.column("000002.SZ").unwrap(), vec![Some(5.0), None]);
    }

    #[tokio::test]
    async fn test_invalid_identifier_is_rejected_before_querying() {
        let db = daily_fixture();
        let err = db
            .fetch_price_series("daily WHERE 1=1 --", "close", "A", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Configuration(_)));
        assert_eq!(db.source.query_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_table_is_a_query_error() {
        let db = daily_fixture();
        let err = db.fetch_price_series("hk_daily", "close", "A", None, None).await.unwrap_err();
        assert!(matches!(err, DbError::Query(_)));
    }

    #[tokio::test]
    async fn test_execute_raw_returns_rows() {
        let mut source = InMemorySource::new();
        source.on_raw("SELECT 1", vec![vec![Value::Int(1)]]);
        let db = Accessor::with_source(config(), source);

        assert_eq!(db.execute_raw("SELECT 1").await.unwrap(), vec![vec![Value::Int(1)]]);
        assert!(matches!(db.execute_raw("SELEC 1").await, Err(DbError::Query(_))));
    }

    fn local_config(port: u16) -> ConnectionConfig {
        ConnectionConfig::new("127.0.0.1", port, "reader", "wrong", "tushare")
            .unwrap()
            .with_acquire_timeout(std::time::Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_a_connection_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = Accessor::connect(local_config(port)).await.unwrap_err();
        assert!(matches!(err, DbError::Connection(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_rejected_login_on_lazy_pool_is_a_connection_error() {
        let addr = crate::fixture::rejecting_server().await;
        let db = Accessor::new(local_config(addr.port()));

        let err = db.execute_raw("SELECT 1").await.unwrap_err();
        assert!(matches!(err, DbError::Connection(_)), "{err:?}");
        assert!(err.to_string().contains("Access denied"), "{err}");

        let err = db.cn_close("000001.SZ", None, None).await.unwrap_err();
        assert!(matches!(err, DbError::Connection(_)), "{err:?}");

        let err = Accessor::connect(local_config(addr.port())).await.unwrap_err();
        assert!(matches!(err, DbError::Connection(_)), "{err:?}");
    }
}
