//! The list of available polls.
//!
//! The catalog holds whatever list was applied last and nothing more: there is
//! no caching between fetches, and the backend's store is only eventually
//! reflected, after an explicit refresh. Background refreshes are numbered so
//! that a slow, older response cannot overwrite a newer one.
use std::sync::Arc;

use poll_common::{Poll, PollId, Result};

use crate::api::PollApi;

/// Backend side of the catalog. Cheap to clone onto a request thread.
#[derive(Clone)]
pub struct CatalogSource {
    api: Arc<dyn PollApi>,
}

impl CatalogSource {
    /// Fetch the current poll set from the backend (blocking).
    pub fn list(&self) -> Result<Vec<Poll>> {
        self.api.list_polls()
    }

    /// Fetch one poll by id (blocking).
    pub fn fetch(&self, poll_id: &PollId) -> Result<Poll> {
        self.api.get_poll(poll_id)
    }
}

/// Fetches and holds the current poll list.
pub struct PollCatalog {
    source: CatalogSource,
    polls: Vec<Poll>,
    requested: u64,
}

impl PollCatalog {
    /// Empty catalog backed by `api`.
    pub fn new(api: Arc<dyn PollApi>) -> Self {
        PollCatalog {
            source: CatalogSource { api },
            polls: Vec::new(),
            requested: 0,
        }
    }

    /// Handle for fetching outside the owner's thread.
    pub fn source(&self) -> CatalogSource {
        self.source.clone()
    }

    /// Last applied poll list, in backend order.
    pub fn polls(&self) -> &[Poll] {
        &self.polls
    }

    /// Reserve a number for a list fetch that will complete later.
    pub(crate) fn begin_refresh(&mut self) -> u64 {
        self.requested += 1;
        self.requested
    }

    /// Whether `request` is the newest refresh issued.
    pub(crate) fn is_latest(&self, request: u64) -> bool {
        request == self.requested
    }

    /// Apply the result of refresh `request`; ignored unless it is the newest one.
    pub(crate) fn finish_refresh(&mut self, request: u64, polls: Vec<Poll>) -> bool {
        if !self.is_latest(request) {
            return false;
        }
        self.polls = polls;
        true
    }
}
