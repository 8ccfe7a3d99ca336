use oracle::pool::{CloseMode, Pool, PoolBuilder};
use oracle::sql_type::{Blob, OracleType, ToSql};
use oracle::{Connection, ErrorKind, SqlValue};
use pdf_core::config::DatabaseConfig;
use pdf_core::error::{DbErrorKind, ExtractorError, Result};
use pdf_core::ports::{ColumnValue, PoolFactory, QueryExecutor, ResultRow};
use pdf_core::query::{SqlParam, SqlQuery};
use tracing::{debug, info, warn};

/// Creates Oracle session pools from the database settings
pub struct OraclePoolFactory {
    config: DatabaseConfig,
}

impl OraclePoolFactory {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

impl PoolFactory for OraclePoolFactory {
    fn create_pool(&self) -> Result<Box<dyn QueryExecutor>> {
        info!(
            connect_string = %self.config.connect_string,
            user = %self.config.user,
            "connecting to Oracle"
        );

        let pool = PoolBuilder::new(
            self.config.user.clone(),
            self.config.password.clone(),
            self.config.connect_string.clone(),
        )
        .min_connections(self.config.pool_min)
        .max_connections(self.config.pool_max)
        .connection_increment(self.config.pool_increment)
        .build()
        .map_err(|e| classify(&e))?;

        Ok(Box::new(OracleExecutor { pool: Some(pool) }))
    }
}

/// Oracle implementation of the QueryExecutor trait
pub struct OracleExecutor {
    pool: Option<Pool>,
}

impl QueryExecutor for OracleExecutor {
    fn for_each_row(&self, query: &SqlQuery, on_row: &mut dyn FnMut(ResultRow)) -> Result<()> {
        let pool = self.pool.as_ref().ok_or(ExtractorError::NotInitialized)?;
        let conn = pool.get().map_err(|e| classify(&e))?;

        let outcome = run_query(&conn, query, on_row);

        // Return the connection to the pool on every path.
        if let Err(e) = conn.close() {
            warn!(error = %e, "failed to release connection");
        }
        outcome
    }

    fn close(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close(&CloseMode::Default).map_err(|e| classify(&e))?;
        }
        Ok(())
    }
}

fn run_query(
    conn: &Connection,
    query: &SqlQuery,
    on_row: &mut dyn FnMut(ResultRow),
) -> Result<()> {
    let params: Vec<&dyn ToSql> = query
        .params()
        .iter()
        .map(|p| match p {
            SqlParam::Text(s) => s as &dyn ToSql,
            SqlParam::Integer(i) => i as &dyn ToSql,
        })
        .collect();

    let rows = conn
        .query(query.sql(), &params)
        .map_err(|e| classify(&e))?;
    let names: Vec<String> = rows
        .column_info()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut count = 0usize;
    for row_result in rows {
        let row = row_result.map_err(|e| classify(&e))?;
        let mut result_row = ResultRow::new();
        for (name, value) in names.iter().zip(row.sql_values()) {
            result_row.insert(name, column_value(value));
        }
        on_row(result_row);
        count += 1;
    }
    debug!(rows = count, "query finished");
    Ok(())
}

/// Values the driver cannot convert become `Unsupported`, so the decoder drops the
/// row instead of failing the batch.
fn column_value(value: &SqlValue) -> ColumnValue {
    convert(value).unwrap_or_else(|e| ColumnValue::Unsupported(format!("unreadable value: {e}")))
}

fn convert(value: &SqlValue) -> oracle::Result<ColumnValue> {
    if value.is_null()? {
        return Ok(ColumnValue::Null);
    }
    let converted = match value.oracle_type()? {
        OracleType::BLOB => ColumnValue::Lob(Box::new(value.get::<Blob>()?)),
        OracleType::Raw(_) | OracleType::LongRaw => ColumnValue::Bytes(value.get::<Vec<u8>>()?),
        OracleType::Number(_, _)
        | OracleType::Float(_)
        | OracleType::BinaryFloat
        | OracleType::BinaryDouble
        | OracleType::Int64
        | OracleType::UInt64 => match value.get::<i64>() {
            Ok(i) => ColumnValue::Integer(i),
            Err(_) => ColumnValue::Text(value.get::<String>()?),
        },
        OracleType::Varchar2(_)
        | OracleType::NVarchar2(_)
        | OracleType::Char(_)
        | OracleType::NChar(_)
        | OracleType::Long
        | OracleType::CLOB
        | OracleType::NCLOB
        | OracleType::Rowid => ColumnValue::Text(value.get::<String>()?),
        other => ColumnValue::Unsupported(other.to_string()),
    };
    Ok(converted)
}

/// Maps a driver error to the core error, deciding the kind from the error code.
pub fn classify(err: &oracle::Error) -> ExtractorError {
    match err.db_error() {
        Some(db) => {
            let is_dpi = matches!(err.kind(), ErrorKind::DpiError);
            ExtractorError::database(classify_code(is_dpi, db.code()), Some(db.code()), db.message())
        }
        None => ExtractorError::database(DbErrorKind::Other, None, err.to_string()),
    }
}

/// `is_dpi` distinguishes ODPI-C client errors (DPI-nnnn) from server errors (ORA-nnnnn).
pub fn classify_code(is_dpi: bool, code: i32) -> DbErrorKind {
    if is_dpi {
        return match code {
            1047 | 1072 => DbErrorKind::ClientLibrary,
            1010 | 1080 => DbErrorKind::Network,
            _ => DbErrorKind::Other,
        };
    }
    match code {
        12154 | 12162 | 12262 | 12514 => DbErrorKind::ConnectIdentifier,
        1017 | 28000 | 28001 => DbErrorKind::Authentication,
        12170 | 12541 | 12543 | 12545 | 12560 | 3113 | 3114 | 3135 => DbErrorKind::Network,
        942 | 904 | 4043 => DbErrorKind::MissingObject,
        1031 => DbErrorKind::InsufficientPrivileges,
        _ => DbErrorKind::Other,
    }
}
