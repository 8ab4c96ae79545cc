//! HTTP client for a Nomad-compatible scheduler

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{Job, Scheduler, SchedulerError};

pub const DEFAULT_SCHEDULER_ADDR: &str = "http://127.0.0.1:4646";

const TOKEN_HEADER: &str = "X-Nomad-Token";

pub struct NomadClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(rename = "Status", default)]
    status: String,
}

impl NomadClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Set the ACL token sent with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(ref token) = self.token {
            req = req.header(TOKEN_HEADER, token);
        }
        req
    }

    /// Read `Status` from a response; 404 and `null` bodies mean "none"
    async fn read_status(resp: Response) -> Result<Option<String>, SchedulerError> {
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp).await?;
        let body: Option<StatusBody> = resp.json().await?;
        Ok(body.map(|b| b.status).filter(|s| !s.is_empty()))
    }
}

async fn check(resp: Response) -> Result<Response, SchedulerError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(SchedulerError::Api {
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}

#[async_trait]
impl Scheduler for NomadClient {
    async fn register(&self, job: &Job) -> Result<(), SchedulerError> {
        debug!("Registering job '{}' at {}", job.id, self.base_url);
        let resp = self
            .build_request(Method::PUT, "/v1/jobs")
            .json(&serde_json::json!({ "Job": job }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn job_status(&self, job_id: &str) -> Result<Option<String>, SchedulerError> {
        let resp = self
            .build_request(Method::GET, &format!("/v1/job/{}", job_id))
            .send()
            .await?;
        Self::read_status(resp).await
    }

    async fn deployment_status(&self, job_id: &str) -> Result<Option<String>, SchedulerError> {
        let resp = self
            .build_request(Method::GET, &format!("/v1/job/{}/deployment", job_id))
            .send()
            .await?;
        Self::read_status(resp).await
    }

    async fn deregister(&self, job_id: &str, purge: bool) -> Result<(), SchedulerError> {
        debug!("Deregistering job '{}' (purge: {})", job_id, purge);
        let resp = self
            .build_request(Method::DELETE, &format!("/v1/job/{}", job_id))
            .query(&[("purge", purge)])
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}
