use tokio_postgres::NoTls;
use tracing::{debug, trace};

use super::AttemptError;

/// Connect and run `query`. Only connection-level errors fail the attempt;
/// the returned rows are not inspected.
pub(super) async fn check(connection: &str, query: &str) -> Result<(), AttemptError> {
    let (client, conn) = tokio_postgres::connect(connection, NoTls)
        .await
        .map_err(|e| AttemptError::classify(&e))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("postgres probe connection closed: {}", e);
        }
    });

    let rows = client
        .query(query, &[])
        .await
        .map_err(|e| AttemptError::classify(&e))?;
    trace!("postgres probe query returned {} row(s)", rows.len());
    Ok(())
}
