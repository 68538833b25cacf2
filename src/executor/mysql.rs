use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, Statement};
use tracing::debug;

use super::{BackendError, Cell, ConnectionDescriptor, ResultSet};

pub(super) async fn execute(
    descriptor: &ConnectionDescriptor,
    sql: &str,
) -> Result<ResultSet, BackendError> {
    let options = MySqlConnectOptions::new()
        .host(&descriptor.host)
        .port(descriptor.port)
        .username(&descriptor.user)
        .password(&descriptor.password)
        .database(&descriptor.database);

    let mut conn = options.connect().await.map_err(classify)?;
    let result = fetch(&mut conn, sql).await;
    if let Err(e) = conn.close().await {
        debug!("Closing MySQL connection failed: {}", e);
    }
    result
}

async fn fetch(conn: &mut MySqlConnection, sql: &str) -> Result<ResultSet, BackendError> {
    // Text protocol: every cell arrives as a string or NULL
    let rows: Vec<MySqlRow> = (&mut *conn)
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
            let number = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(|e| e.number());
            match number {
                Some(1044 | 1045) => BackendError::AuthenticationFailed(err.to_string()),
                Some(2002 | 2003 | 2005 | 2013) => BackendError::Unreachable(err.to_string()),
                Some(1064) => BackendError::Syntax(err.to_string()),
                _ => BackendError::Other(err.to_string()),
            }
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
            BackendError::Unreachable(err.to_string())
        }
        _ => BackendError::Other(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_unreachable() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert!(matches!(classify(err), BackendError::Unreachable(_)));
    }

    #[test]
    fn test_protocol_errors_are_other() {
        let err = sqlx::Error::Protocol("unexpected packet".into());
        assert!(matches!(classify(err), BackendError::Other(_)));
    }
}
