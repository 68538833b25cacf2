use oracle::{Connection, Error};
use tracing::debug;

use super::{BackendError, Cell, ConnectionDescriptor, ResultSet};

const INVALID_CREDENTIALS: i32 = 1017;
const UNREACHABLE: [i32; 6] = [12154, 12170, 12514, 12541, 12543, 12545];

/// The oracle driver is synchronous; run it on the blocking pool.
pub(super) async fn execute(
    descriptor: &ConnectionDescriptor,
    sql: &str,
) -> Result<ResultSet, BackendError> {
    let descriptor = descriptor.clone();
    let sql = sql.to_string();

    tokio::task::spawn_blocking(move || run(&descriptor, &sql))
        .await
        .map_err(|e| BackendError::Other(format!("oracle worker failed: {}", e)))?
}

fn run(descriptor: &ConnectionDescriptor, sql: &str) -> Result<ResultSet, BackendError> {
    // Easy Connect: //host:port/service_name
    let connect_string = format!(
        "//{}:{}/{}",
        descriptor.host, descriptor.port, descriptor.database
    );
    let conn = Connection::connect(&descriptor.user, &descriptor.password, &connect_string)
        .map_err(classify)?;

    let result = fetch(&conn, sql);
    if let Err(e) = conn.close() {
        debug!("Closing Oracle connection failed: {}", e);
    }
    result
}

fn fetch(conn: &Connection, sql: &str) -> Result<ResultSet, BackendError> {
    let rows = conn.query(sql, &[]).map_err(classify)?;
    let columns: Vec<String> = rows
        .column_info()
        .iter()
        .map(|c| normalize_column_name(c.name()))
        .collect();

    let mut out = Vec::new();
    for row in rows {
        let row = row.map_err(classify)?;
        let mut cells = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            // NUMBER and character types both convert to text losslessly
            let value: Option<String> = row.get(idx).map_err(classify)?;
            cells.push(Cell::from_text(value));
        }
        out.push(cells);
    }

    Ok(ResultSet::new(columns, out))
}

/// Oracle reports unquoted identifiers in upper case. Those are folded to
/// lower case; quoted mixed-case names pass through untouched.
fn normalize_column_name(name: &str) -> String {
    if name.chars().any(char::is_alphabetic) && !name.chars().any(char::is_lowercase) {
        name.to_lowercase()
    } else {
        name.to_string()
    }
}

fn classify(err: Error) -> BackendError {
    let code = match &err {
        Error::OciError(db) | Error::DpiError(db) => Some(db.code()),
        _ => None,
    };
    classify_code(code, err.to_string())
}

fn classify_code(code: Option<i32>, message: String) -> BackendError {
    match code {
        Some(INVALID_CREDENTIALS) => BackendError::AuthenticationFailed(message),
        Some(c) if UNREACHABLE.contains(&c) => BackendError::Unreachable(message),
        // ORA-009xx: statement parse errors
        Some(c) if (900..1000).contains(&c) => BackendError::Syntax(message),
        _ => BackendError::Other(message),
    }
}
