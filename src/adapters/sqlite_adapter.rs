//! SQLite adapter for market data and validation results.

use crate::domain::daily_bar::DailyBar;
use crate::domain::error::PicklabError;
use crate::domain::pick::Pick;
use crate::domain::walk_forward::{Fold, ValidationStatus, WalkForwardResult};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::result_store_port::{ResultStorePort, StoredSummary};
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, Row, params};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS picks (
    source TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    ticker TEXT NOT NULL,
    pick_date TEXT NOT NULL,
    entry_price REAL NOT NULL,
    score REAL,
    PRIMARY KEY (source, algorithm, ticker, pick_date)
);
CREATE INDEX IF NOT EXISTS idx_picks_source_algo_date ON picks(source, algorithm, pick_date);

CREATE TABLE IF NOT EXISTS daily_bars (
    ticker TEXT NOT NULL,
    trade_date TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    PRIMARY KEY (ticker, trade_date)
);

CREATE TABLE IF NOT EXISTS wf_folds (
    source TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    fold_index INTEGER NOT NULL,
    train_start TEXT NOT NULL,
    train_end TEXT NOT NULL,
    test_start TEXT NOT NULL,
    test_end TEXT NOT NULL,
    oos_trades INTEGER NOT NULL,
    efficiency REAL NOT NULL,
    fold_json TEXT NOT NULL,
    PRIMARY KEY (source, algorithm, fold_index)
);

CREATE TABLE IF NOT EXISTS wf_summaries (
    source TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    train_days INTEGER NOT NULL,
    test_days INTEGER NOT NULL,
    status TEXT NOT NULL,
    valid_folds INTEGER NOT NULL,
    avg_efficiency REAL NOT NULL,
    overfitting INTEGER NOT NULL,
    summary_json TEXT NOT NULL,
    PRIMARY KEY (source, algorithm)
);";

fn db_err(e: r2d2::Error) -> PicklabError {
    PicklabError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> PicklabError {
    PicklabError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Date column parser for use inside `query_map` closures.
fn parse_date(text: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(text.len(), rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(text: String) -> rusqlite::Result<T> {
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(text.len(), rusqlite::types::Type::Text, Box::new(e))
    })
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PicklabError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| PicklabError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory database; every pooled handle sees the
    /// same data.
    pub fn in_memory() -> Result<Self, PicklabError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, PicklabError> {
        self.pool.get().map_err(db_err)
    }

    pub fn initialize_schema(&self) -> Result<(), PicklabError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    pub fn insert_picks(&self, source: &str, picks: &[Pick]) -> Result<(), PicklabError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for pick in picks {
            tx.execute(
                "INSERT OR REPLACE INTO picks (source, algorithm, ticker, pick_date, entry_price, score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    source,
                    pick.algorithm,
                    pick.ticker,
                    format_date(pick.pick_date),
                    pick.entry_price,
                    pick.score
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    pub fn insert_bars(&self, bars: &[DailyBar]) -> Result<(), PicklabError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO daily_bars (ticker, trade_date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bar.ticker,
                    format_date(bar.trade_date),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }
}

impl MarketDataPort for SqliteAdapter {
    fn fetch_picks(
        &self,
        source: &str,
        algorithm: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Pick>, PicklabError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT ticker, algorithm, pick_date, entry_price, score
                 FROM picks
                 WHERE source = ?1 AND algorithm = ?2 AND pick_date >= ?3 AND pick_date <= ?4
                 ORDER BY pick_date ASC, rowid ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![source, algorithm, format_date(start_date), format_date(end_date)],
                |row| {
                    Ok(Pick {
                        ticker: row.get(0)?,
                        algorithm: row.get(1)?,
                        pick_date: parse_date(row.get(2)?)?,
                        entry_price: row.get(3)?,
                        score: row.get(4)?,
                    })
                },
            )
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn fetch_bars(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<DailyBar>, PicklabError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT ticker, trade_date, open, high, low, close, volume
                 FROM daily_bars
                 WHERE ticker = ?1 AND trade_date >= ?2 AND trade_date <= ?3
                 ORDER BY trade_date ASC",
            )
            .map_err(query_err)?;

        let start = format_date(start_date);
        let end = format_date(end_date);
        let mut bars = Vec::new();
        for ticker in tickers {
            let rows = stmt
                .query_map(params![ticker, start, end], |row| {
                    Ok(DailyBar {
                        ticker: row.get(0)?,
                        trade_date: parse_date(row.get(1)?)?,
                        open: row.get(2)?,
                        high: row.get(3)?,
                        low: row.get(4)?,
                        close: row.get(5)?,
                        volume: row.get(6)?,
                    })
                })
                .map_err(query_err)?;
            for row in rows {
                bars.push(row.map_err(query_err)?);
            }
        }
        Ok(bars)
    }

    fn list_algorithms(&self, source: &str) -> Result<Vec<String>, PicklabError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT algorithm FROM picks WHERE source = ?1 ORDER BY algorithm")
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![source], |row| row.get(0))
            .map_err(query_err)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_err)
    }

    fn get_pick_range(
        &self,
        source: &str,
        algorithm: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PicklabError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(pick_date), MAX(pick_date), COUNT(*) FROM picks
                 WHERE source = ?1 AND algorithm = ?2 AND entry_price > 0",
                params![source, algorithm],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => Ok(Some((
                parse_date(min).map_err(query_err)?,
                parse_date(max).map_err(query_err)?,
                count as usize,
            ))),
            _ => Ok(None),
        }
    }
}

fn stored_summary(row: &Row<'_>) -> rusqlite::Result<StoredSummary> {
    Ok(StoredSummary {
        source: row.get(0)?,
        algorithm: row.get(1)?,
        train_days: row.get(2)?,
        test_days: row.get(3)?,
        summary: parse_json(row.get(4)?)?,
    })
}

fn status_label(status: &ValidationStatus) -> &'static str {
    match status {
        ValidationStatus::Completed => "completed",
        ValidationStatus::InsufficientData { .. } => "insufficient_data",
    }
}

impl ResultStorePort for SqliteAdapter {
    fn save_result(
        &self,
        source: &str,
        algorithm: &str,
        result: &WalkForwardResult,
    ) -> Result<(), PicklabError> {
        let summary_json = serde_json::to_string(&result.summary)?;
        let fold_rows = result
            .folds
            .iter()
            .map(|fold| -> Result<_, PicklabError> { Ok((fold, serde_json::to_string(fold)?)) })
            .collect::<Result<Vec<_>, PicklabError>>()?;

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        tx.execute(
            "DELETE FROM wf_folds WHERE source = ?1 AND algorithm = ?2",
            params![source, algorithm],
        )
        .map_err(query_err)?;
        tx.execute(
            "DELETE FROM wf_summaries WHERE source = ?1 AND algorithm = ?2",
            params![source, algorithm],
        )
        .map_err(query_err)?;

        for (fold, fold_json) in &fold_rows {
            tx.execute(
                "INSERT INTO wf_folds (source, algorithm, fold_index, train_start, train_end,
                                       test_start, test_end, oos_trades, efficiency, fold_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    source,
                    algorithm,
                    fold.index as i64,
                    format_date(fold.train.start),
                    format_date(fold.train.end),
                    format_date(fold.test.start),
                    format_date(fold.test.end),
                    fold.oos_trades() as i64,
                    fold.efficiency,
                    fold_json
                ],
            )
            .map_err(query_err)?;
        }

        let summary = &result.summary;
        tx.execute(
            "INSERT INTO wf_summaries (source, algorithm, train_days, test_days, status,
                                       valid_folds, avg_efficiency, overfitting, summary_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                source,
                algorithm,
                result.train_days,
                result.test_days,
                status_label(&summary.status),
                summary.valid_folds as i64,
                summary.avg_efficiency,
                summary.overfitting,
                summary_json
            ],
        )
        .map_err(query_err)?;

        tx.commit().map_err(query_err)
    }

    fn load_summary(
        &self,
        source: &str,
        algorithm: &str,
    ) -> Result<Option<StoredSummary>, PicklabError> {
        self.conn()?
            .query_row(
                "SELECT source, algorithm, train_days, test_days, summary_json
                 FROM wf_summaries
                 WHERE source = ?1 AND algorithm = ?2",
                params![source, algorithm],
                stored_summary,
            )
            .optional()
            .map_err(query_err)
    }

    fn load_folds(&self, source: &str, algorithm: &str) -> Result<Vec<Fold>, PicklabError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT fold_json FROM wf_folds
                 WHERE source = ?1 AND algorithm = ?2
                 ORDER BY fold_index ASC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![source, algorithm], |row| parse_json(row.get(0)?))
            .map_err(query_err)?;
        rows.collect::<Result<Vec<Fold>, _>>().map_err(query_err)
    }

    fn list_summaries(&self) -> Result<Vec<StoredSummary>, PicklabError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT source, algorithm, train_days, test_days, summary_json
                 FROM wf_summaries
                 ORDER BY source ASC, algorithm ASC",
            )
            .map_err(query_err)?;
        let rows = stmt.query_map([], stored_summary).map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}
