use std::time::Duration;

use reqwest::Client;
use tracing::trace;

use super::AttemptError;

/// Client used for HTTP probes; bounded per attempt
pub(super) fn client(attempt_timeout: Duration) -> Client {
    Client::builder()
        .timeout(attempt_timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Issue a HEAD request; any 2xx status counts as ready
pub(super) async fn check(client: &Client, url: &str) -> Result<(), AttemptError> {
    let response = client
        .head(url)
        .send()
        .await
        .map_err(|e| AttemptError::classify(&e))?;

    let status = response.status();
    trace!("HEAD {} -> {}", url, status);
    if status.is_success() {
        Ok(())
    } else {
        Err(AttemptError::Status(status.as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> Client {
        Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap()
    }

    fn closed_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn test_refused_connection_is_retryable() {
        let url = format!("http://127.0.0.1:{}/statistics", closed_port());
        let err = check(&test_client(), &url).await.unwrap_err();
        assert!(matches!(err, AttemptError::ConnectionRefused(_)), "{err}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_not_a_refusal() {
        let err = check(&test_client(), "http://capsule-node.invalid/statistics")
            .await
            .unwrap_err();
        assert!(!matches!(err, AttemptError::ConnectionRefused(_)), "{err}");
        assert!(!err.is_retryable());
    }
}
