//! Request/response calls to the poll backend.
//!
//! `PollApi` is the seam between the session and the network. `HttpPollApi`
//! implements it with a blocking `reqwest` client; every call runs on a worker
//! thread owned by the session, so blocking here never stalls the front-end.
//! None of the calls retry: a failed vote re-sent automatically could be
//! counted twice.
use log::debug;
use poll_common::model::{NewPoll, PollStats, VoteRequest};
use poll_common::net::Endpoints;
use poll_common::{Poll, PollError, PollId, Result};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ClientConfig;

/// Backend operations used by the catalog and the session.
pub trait PollApi: Send + Sync {
    /// `GET /polls`.
    fn list_polls(&self) -> Result<Vec<Poll>>;
    /// `GET /polls/{id}`.
    fn get_poll(&self, poll_id: &PollId) -> Result<Poll>;
    /// `POST /polls`. The created poll is not returned; callers refresh the catalog.
    fn create_poll(&self, poll: &NewPoll) -> Result<()>;
    /// `DELETE /polls/{id}`.
    fn delete_poll(&self, poll_id: &PollId) -> Result<()>;
    /// `POST /polls/{id}/vote`.
    fn vote(&self, poll_id: &PollId, vote: &VoteRequest) -> Result<()>;
    /// `GET /polls/{id}/stats`.
    fn poll_stats(&self, poll_id: &PollId) -> Result<PollStats>;
}

/// `PollApi` over HTTP.
pub struct HttpPollApi {
    client: Client,
    endpoints: Endpoints,
}

impl HttpPollApi {
    /// Build a client for the backend described by `config`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PollError::Fetch(format!("failed to build HTTP client: {}", e)))?;
        Ok(HttpPollApi {
            client,
            endpoints: config.endpoints.clone(),
        })
    }
}

impl PollApi for HttpPollApi {
    fn list_polls(&self) -> Result<Vec<Poll>> {
        let url = self.endpoints.polls()?;
        self.get_json(url)
    }

    fn get_poll(&self, poll_id: &PollId) -> Result<Poll> {
        let url = self.endpoints.poll(poll_id)?;
        self.get_json(url)
    }

    fn create_poll(&self, poll: &NewPoll) -> Result<()> {
        let url = self.endpoints.polls()?;
        debug!("POST {} title={:?}", url, poll.title());
        let response = self
            .client
            .post(url)
            .json(poll)
            .send()
            .map_err(|e| PollError::Create(e.to_string()))?;
        check_status(response, PollError::Create)?;
        Ok(())
    }

    fn delete_poll(&self, poll_id: &PollId) -> Result<()> {
        let url = self.endpoints.poll(poll_id)?;
        debug!("DELETE {}", url);
        let response = self
            .client
            .delete(url)
            .send()
            .map_err(|e| PollError::Delete(e.to_string()))?;
        check_status(response, PollError::Delete)?;
        Ok(())
    }

    fn vote(&self, poll_id: &PollId, vote: &VoteRequest) -> Result<()> {
        let url = self.endpoints.vote(poll_id)?;
        debug!("POST {} choice={}", url, vote.choice_id);
        let response = self
            .client
            .post(url)
            .json(vote)
            .send()
            .map_err(|e| PollError::Vote(e.to_string()))?;
        check_status(response, PollError::Vote)?;
        Ok(())
    }

    fn poll_stats(&self, poll_id: &PollId) -> Result<PollStats> {
        let url = self.endpoints.stats(poll_id)?;
        self.get_json(url)
    }
}

impl HttpPollApi {
    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| PollError::Fetch(e.to_string()))?;
        check_status(response, PollError::Fetch)?
            .json()
            .map_err(|e| PollError::Fetch(e.to_string()))
    }
}

/// Turn a non-success status into `kind`, keeping the backend's error body.
fn check_status(response: Response, kind: fn(String) -> PollError) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(kind(describe_failure(status.as_u16(), &body)))
}

/// FastAPI reports failures as `{"detail": "..."}`; fall back to the raw body.
fn describe_failure(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned());
    if detail.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, detail)
    }
}
