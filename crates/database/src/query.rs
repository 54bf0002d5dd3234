//! Series query descriptors and the SQL they render to.
//!
//! Every fetch follows one template: select distinct (index, value[, symbol])
//! rows from a table, filtered by symbol and by an inclusive date range on a
//! filter field, ordered by the index field. Symbols and dates are always bound
//! as parameters. Table and column names cannot be bound, so they are checked
//! to be plain identifiers and quoted.

use crate::error::DbError;
use core_types::DateRange;
use sqlx::{MySql, QueryBuilder};

/// Column that holds the exchange-qualified symbol in every table.
pub const SYMBOL_FIELD: &str = "ts_code";

/// Which fields of a table index, filter and identify a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesLayout {
    /// Output index and sort key.
    pub index_field: &'static str,
    /// Field the date range is applied to. May differ from `index_field`.
    pub filter_field: &'static str,
}

/// Daily bars: indexed and filtered by trading date.
pub const PRICE_LAYOUT: SeriesLayout = SeriesLayout {
    index_field: "trade_date",
    filter_field: "trade_date",
};

/// Single-symbol fundamentals: indexed by `f_ann_date` but filtered by `ann_date`.
pub const FUNDAMENTAL_LAYOUT: SeriesLayout = SeriesLayout {
    index_field: "f_ann_date",
    filter_field: "ann_date",
};

/// Multi-symbol fundamentals filter on the same field they are indexed by.
pub const FUNDAMENTAL_MULTI_LAYOUT: SeriesLayout = SeriesLayout {
    index_field: "f_ann_date",
    filter_field: "f_ann_date",
};

/// Exact match on one symbol, or set membership over several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolFilter {
    One(String),
    Many(Vec<String>),
}

impl SymbolFilter {
    pub fn many<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for symbol in symbols {
            let symbol = symbol.as_ref();
            if !unique.iter().any(|s| s == symbol) {
                unique.push(symbol.to_string());
            }
        }
        SymbolFilter::Many(unique)
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, SymbolFilter::Many(_))
    }

    pub fn matches(&self, symbol: &str) -> bool {
        match self {
            SymbolFilter::One(s) => s == symbol,
            SymbolFilter::Many(set) => set.iter().any(|s| s == symbol),
        }
    }

    /// True when no row could possibly match.
    pub fn is_empty(&self) -> bool {
        matches!(self, SymbolFilter::Many(set) if set.is_empty())
    }
}

/// A fully described, validated series query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesQuery {
    pub table: String,
    pub value_field: String,
    pub layout: SeriesLayout,
    pub symbols: SymbolFilter,
    pub range: DateRange,
}

impl SeriesQuery {
    pub fn new(
        table: &str,
        value_field: &str,
        layout: SeriesLayout,
        symbols: SymbolFilter,
        range: DateRange,
    ) -> Result<Self, DbError> {
        validate_identifier(table, true)?;
        validate_identifier(value_field, false)?;
        Ok(Self {
            table: table.to_string(),
            value_field: value_field.to_string(),
            layout,
            symbols,
            range,
        })
    }

    /// Column names in select order: index, value, then the symbol for multi-symbol queries.
    pub fn selected_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.layout.index_field, self.value_field.as_str()];
        if self.symbols.is_multi() {
            fields.push(SYMBOL_FIELD);
        }
        fields
    }

    /// Renders the statement with `?` placeholders and attaches the bind values.
    pub fn to_builder(&self) -> QueryBuilder<'static, MySql> {
        let mut builder = QueryBuilder::new("SELECT DISTINCT ");
        {
            let mut columns = builder.separated(", ");
            for field in self.selected_fields() {
                columns.push(quote_identifier(field));
            }
        }
        builder.push(" FROM ");
        builder.push(quote_identifier(&self.table));
        builder.push(" WHERE ");
        builder.push(quote_identifier(SYMBOL_FIELD));

        match &self.symbols {
            SymbolFilter::One(symbol) => {
                builder.push(" = ");
                builder.push_bind(symbol.clone());
            }
            SymbolFilter::Many(symbols) => {
                builder.push(" IN (");
                let mut placeholders = builder.separated(", ");
                for symbol in symbols {
                    placeholders.push_bind(symbol.clone());
                }
                builder.push(")");
            }
        }

        builder.push(" AND ");
        builder.push(quote_identifier(self.layout.filter_field));
        builder.push(" BETWEEN ");
        builder.push_bind(self.range.start);
        builder.push(" AND ");
        builder.push_bind(self.range.end);
        builder.push(" ORDER BY ");
        builder.push(quote_identifier(self.layout.index_field));

        builder
    }
}

/// Accepts `name` or, when `allow_schema` is set, `schema.name`,
/// where each part is ASCII letters, digits and underscores.
pub fn validate_identifier(name: &str, allow_schema: bool) -> Result<(), DbError> {
    let parts: Vec<&str> = name.split('.').collect();
    let part_ok = |part: &&str| {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let shape_ok = parts.len() == 1 || (allow_schema && parts.len() == 2);

    if shape_ok && parts.iter().all(part_ok) {
        Ok(())
    } else {
        Err(DbError::Configuration(format!(
            "'{name}' is not a valid table or column name"
        )))
    }
}

fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("`{part}`"))
        .collect::<Vec<_>>()
        .join(".")
}
