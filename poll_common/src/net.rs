//! Backend address and endpoint construction shared by the HTTP and WebSocket transports.
use url::Url;

use crate::error::PollError;
use crate::model::PollId;

/// Default backend base address.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Resolved endpoints of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Parse `base` (e.g. `http://127.0.0.1:8000`). Only `http` and `https` are accepted.
    pub fn new(base: &str) -> Result<Self, PollError> {
        let mut base = Url::parse(base.trim())?;
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(PollError::Validation(format!(
                    "backend address must use http or https, got {}",
                    other
                )));
            }
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Endpoints { base })
    }

    /// `GET`/`POST /polls`.
    pub fn polls(&self) -> Result<Url, PollError> {
        Ok(self.base.join("polls")?)
    }

    /// `GET`/`DELETE /polls/{id}`.
    pub fn poll(&self, poll_id: &PollId) -> Result<Url, PollError> {
        Ok(self.base.join(&format!("polls/{}", poll_id))?)
    }

    /// `POST /polls/{id}/vote`.
    pub fn vote(&self, poll_id: &PollId) -> Result<Url, PollError> {
        Ok(self.base.join(&format!("polls/{}/vote", poll_id))?)
    }

    /// `GET /polls/{id}/stats`: live connection count of a poll.
    pub fn stats(&self, poll_id: &PollId) -> Result<Url, PollError> {
        Ok(self.base.join(&format!("polls/{}/stats", poll_id))?)
    }

    /// Live results feed `/polls/ws/{id}`, with the scheme mapped to `ws`/`wss`.
    pub fn results_feed(&self, poll_id: &PollId) -> Result<Url, PollError> {
        let mut url = self.base.join(&format!("polls/ws/{}", poll_id))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| PollError::Validation(format!("cannot use {} for {}", scheme, url)))?;
        Ok(url)
    }
}
