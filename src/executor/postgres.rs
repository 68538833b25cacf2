use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, Statement};
use tracing::debug;

use super::{BackendError, Cell, ConnectionDescriptor, ResultSet};

pub(super) async fn execute(
    descriptor: &ConnectionDescriptor,
    sql: &str,
) -> Result<ResultSet, BackendError> {
    let options = PgConnectOptions::new()
        .host(&descriptor.host)
        .port(descriptor.port)
        .username(&descriptor.user)
        .password(&descriptor.password)
        .database(&descriptor.database);

    let mut conn = options.connect().await.map_err(classify)?;
    let result = fetch(&mut conn, sql).await;
    if let Err(e) = conn.close().await {
        debug!("Closing Postgres connection failed: {}", e);
    }
    result
}

async fn fetch(conn: &mut PgConnection, sql: &str) -> Result<ResultSet, BackendError> {
    // Simple query protocol returns every value in text format
    let rows: Vec<PgRow> = (&mut *conn)
        .fetch_all(sqlx::raw_sql(sql))
        .await
        .map_err(classify)?;

    let columns = match rows.first() {
        Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        None => {
            let statement = conn.prepare(sql).await.map_err(classify)?;
            statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect()
        }
    };

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut cells = Vec::with_capacity(row.len());
        for idx in 0..row.len() {
            let value: Option<String> = row.try_get_unchecked(idx).map_err(classify)?;
            cells.push(Cell::from_text(value));
        }
        out.push(cells);
    }

    Ok(ResultSet::new(columns, out))
}

fn classify(err: sqlx::Error) -> BackendError {
    match &err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            classify_sqlstate(&code, err.to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
            BackendError::Unreachable(err.to_string())
        }
        _ => BackendError::Other(err.to_string()),
    }
}

fn classify_sqlstate(code: &str, message: String) -> BackendError {
    match code {
        "28000" | "28P01" => BackendError::AuthenticationFailed(message),
        "42601" => BackendError::Syntax(message),
        c if c.starts_with("08") => BackendError::Unreachable(message),
        // cannot_connect_now: server starting up or shutting down
        "57P03" => BackendError::Unreachable(message),
        _ => BackendError::Other(message),
    }
}
