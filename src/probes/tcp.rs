use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::AttemptError;

/// Open a raw connection and close it straight away
pub(super) async fn check(address: &str) -> Result<(), AttemptError> {
    let mut stream = TcpStream::connect(address)
        .await
        .map_err(|e| AttemptError::classify(&e))?;
    let _ = stream.shutdown().await;
    Ok(())
}
