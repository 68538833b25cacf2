use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt::Display;
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

use super::{BackendError, Cell, ConnectionDescriptor, ResultSet};

const LOGIN_FAILED: u32 = 18456;
const INCORRECT_SYNTAX: u32 = 102;
const INCORRECT_SYNTAX_NEAR_KEYWORD: u32 = 156;

pub(super) async fn execute(
    descriptor: &ConnectionDescriptor,
    sql: &str,
) -> Result<ResultSet, BackendError> {
    let mut config = Config::new();
    config.host(&descriptor.host);
    config.port(descriptor.port);
    config.database(&descriptor.database);
    config.authentication(AuthMethod::sql_server(&descriptor.user, &descriptor.password));
    config.trust_cert();

    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| BackendError::Unreachable(e.to_string()))?;
    tcp.set_nodelay(true)
        .map_err(|e| BackendError::Unreachable(e.to_string()))?;

    let mut client = Client::connect(config, tcp.compat_write())
        .await
        .map_err(classify)?;

    let mut stream = client.simple_query(sql).await.map_err(classify)?;
    let columns: Vec<String> = stream
        .columns()
        .await
        .map_err(classify)?
        .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows = stream.into_first_result().await.map_err(classify)?;

    let rows = rows
        .iter()
        .map(|row| {
            row.cells()
                .map(|(column, data)| {
                    to_cell(data).map_err(|e| {
                        BackendError::Other(format!("column '{}': {}", column.name(), e))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResultSet::new(columns, rows))
}

/// Convert one TDS value. Temporal types are rendered the way the MySQL
/// and Postgres text protocols render them; binary and XML are refused.
fn to_cell(data: &ColumnData<'static>) -> Result<Cell, String> {
    let cell = match data {
        ColumnData::U8(v) => v.map(|v| Cell::Int(v as i64)).unwrap_or(Cell::Null),
        ColumnData::I16(v) => v.map(|v| Cell::Int(v as i64)).unwrap_or(Cell::Null),
        ColumnData::I32(v) => v.map(|v| Cell::Int(v as i64)).unwrap_or(Cell::Null),
        ColumnData::I64(v) => v.map(Cell::Int).unwrap_or(Cell::Null),
        ColumnData::F32(v) => v.map(|v| Cell::Float(v as f64)).unwrap_or(Cell::Null),
        ColumnData::F64(v) => v.map(Cell::Float).unwrap_or(Cell::Null),
        ColumnData::Bit(v) => v.map(Cell::Bool).unwrap_or(Cell::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| Cell::Text(s.to_string()))
            .unwrap_or(Cell::Null),
        ColumnData::Guid(v) => v.map(|g| Cell::Text(g.to_string())).unwrap_or(Cell::Null),
        ColumnData::Numeric(v) => v
            .map(|n| Cell::Float(n.value() as f64 / 10f64.powi(n.scale() as i32)))
            .unwrap_or(Cell::Null),
        ColumnData::Date(_) => temporal::<NaiveDate>(data)?,
        ColumnData::Time(_) => temporal::<NaiveTime>(data)?,
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(data)?
        }
        ColumnData::DateTimeOffset(_) => temporal::<DateTime<FixedOffset>>(data)?,
        ColumnData::Binary(None) | ColumnData::Xml(None) => Cell::Null,
        ColumnData::Binary(Some(_)) => return Err("binary values are not supported".to_string()),
        ColumnData::Xml(Some(_)) => return Err("XML values are not supported".to_string()),
    };
    Ok(cell)
}

fn temporal<'a, T>(data: &'a ColumnData<'static>) -> Result<Cell, String>
where
    T: FromSql<'a> + Display,
{
    T::from_sql(data)
        .map(|v| v.map(|v| Cell::Text(v.to_string())).unwrap_or(Cell::Null))
        .map_err(|e| e.to_string())
}

fn classify(err: tiberius::error::Error) -> BackendError {
    use tiberius::error::Error;

    match &err {
        Error::Server(token) => match token.code() {
            LOGIN_FAILED => BackendError::AuthenticationFailed(err.to_string()),
            INCORRECT_SYNTAX | INCORRECT_SYNTAX_NEAR_KEYWORD => {
                BackendError::Syntax(err.to_string())
            }
            _ => BackendError::Other(err.to_string()),
        },
        Error::Io { .. } | Error::Tls(_) | Error::Routing { .. } => {
            BackendError::Unreachable(err.to_string())
        }
        _ => BackendError::Other(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_to_cell() {
        assert_eq!(to_cell(&ColumnData::I32(Some(7))), Ok(Cell::Int(7)));
        assert_eq!(to_cell(&ColumnData::I64(None)), Ok(Cell::Null));
        assert_eq!(to_cell(&ColumnData::Bit(Some(true))), Ok(Cell::Bool(true)));
        assert_eq!(
            to_cell(&ColumnData::String(Some(Cow::Borrowed("primary")))),
            Ok(Cell::Text("primary".into()))
        );
    }

    #[test]
    fn test_temporal_cells_render_as_text() {
        // Legacy DATETIME counts days from 1900-01-01
        let epoch = ColumnData::DateTime(Some(tiberius::time::DateTime::new(0, 0)));
        assert_eq!(to_cell(&epoch), Ok(Cell::Text("1900-01-01 00:00:00".into())));

        let next_day = ColumnData::DateTime(Some(tiberius::time::DateTime::new(1, 0)));
        assert_eq!(to_cell(&next_day), Ok(Cell::Text("1900-01-02 00:00:00".into())));

        assert_eq!(to_cell(&ColumnData::DateTime(None)), Ok(Cell::Null));
    }

    #[test]
    fn test_binary_cells_are_refused() {
        let binary = ColumnData::Binary(Some(Cow::Borrowed(&[0xde, 0xad][..])));
        assert!(to_cell(&binary).unwrap_err().contains("binary"));
        assert_eq!(to_cell(&ColumnData::Binary(None)), Ok(Cell::Null));
    }

    #[test]
    fn test_io_error_is_unreachable() {
        let err = tiberius::error::Error::Io {
            kind: std::io::ErrorKind::ConnectionRefused,
            message: "refused".into(),
        };
        assert!(matches!(classify(err), BackendError::Unreachable(_)));
    }
}
