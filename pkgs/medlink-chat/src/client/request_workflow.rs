//! Doctor-to-doctor connection requests
//!
//! This module owns:
//! - The transient doctor search results and their `request_sent` markers
//! - Incoming requests addressed to the current user
//! - Outgoing requests sent during this client's lifetime
//!
//! # One-shot transitions
//!
//! A request moves from `Pending` to `Accepted` or `Rejected` exactly once.
//! Resolving a request that is no longer pending fails with a conflict
//! without contacting the server, and a later `fetch_pending` never brings a
//! resolved request back to pending.

use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::api::{keep_valid, DoctorApi};
use crate::error::{ChatError, Result};
use crate::models::{
    ConnectionRequest, DoctorSearchResult, RequestDirection, RequestStatus,
};

pub struct ConnectionRequestWorkflow {
    api: Arc<dyn DoctorApi>,
    results: Vec<DoctorSearchResult>,
    incoming: Vec<ConnectionRequest>,
    outgoing: Vec<ConnectionRequest>,
    /// Prefix for request ids the server did not assign
    local_prefix: String,
}

impl ConnectionRequestWorkflow {
    pub fn new(api: Arc<dyn DoctorApi>, local_prefix: impl Into<String>) -> Self {
        Self {
            api,
            results: Vec::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            local_prefix: local_prefix.into(),
        }
    }

    /// Search doctors; starts a new search session with fresh markers
    #[instrument(skip(self))]
    pub async fn search(&mut self, query: &str) -> Result<&[DoctorSearchResult]> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::Validation("search text is empty".to_string()));
        }

        let payloads = self.api.search_doctors(query).await?;
        self.results = keep_valid(payloads, "doctor", |p| p.into_summary())
            .into_iter()
            .map(DoctorSearchResult::new)
            .collect();
        info!("Doctor search '{}' returned {} results", query, self.results.len());
        Ok(&self.results)
    }

    /// Send a connection request to a doctor from the current results
    #[instrument(skip(self))]
    pub async fn send(&mut self, doctor_id: &str) -> Result<ConnectionRequest> {
        let index = self
            .results
            .iter()
            .position(|r| r.doctor.id == doctor_id)
            .ok_or_else(|| ChatError::NotFound(format!("doctor {} in search results", doctor_id)))?;

        if self.results[index].request_sent {
            return Err(ChatError::Conflict(format!(
                "request to {} already sent",
                doctor_id
            )));
        }

        let ack = self.api.send_request(doctor_id).await?;

        let id = ack
            .id
            .unwrap_or_else(|| format!("{}{}", self.local_prefix, Uuid::new_v4()));
        let entry = &mut self.results[index];
        entry.request_sent = true;
        let request = ConnectionRequest {
            id,
            doctor: entry.doctor.clone(),
            direction: RequestDirection::Outgoing,
            status: RequestStatus::Pending,
        };
        info!("Connection request {} sent to {}", request.id, doctor_id);
        self.outgoing.push(request.clone());
        Ok(request)
    }

    /// Load requests addressed to the current user
    #[instrument(skip(self))]
    pub async fn fetch_pending(&mut self) -> Result<Vec<ConnectionRequest>> {
        let payloads = self.api.pending_requests().await?;
        let fetched = keep_valid(payloads, "pending request", |p| {
            if p.id.trim().is_empty() {
                return Err(ChatError::MalformedPayload(
                    "request without id".to_string(),
                ));
            }
            Ok(ConnectionRequest {
                id: p.id,
                doctor: p.from_doctor.into_summary()?,
                direction: RequestDirection::Incoming,
                status: RequestStatus::Pending,
            })
        });

        let mut merged: Vec<ConnectionRequest> = Vec::with_capacity(fetched.len());
        for request in fetched {
            if merged.iter().any(|r| r.id == request.id) {
                continue;
            }
            match self.incoming.iter().find(|r| r.id == request.id) {
                Some(known) if known.status != RequestStatus::Pending => {
                    debug!("Request {} already {:?} locally", known.id, known.status);
                    merged.push(known.clone());
                }
                _ => merged.push(request),
            }
        }
        for resolved in self
            .incoming
            .iter()
            .filter(|r| r.status != RequestStatus::Pending)
        {
            if !merged.iter().any(|r| r.id == resolved.id) {
                merged.push(resolved.clone());
            }
        }
        self.incoming = merged;
        Ok(self.pending())
    }

    pub async fn accept(&mut self, request_id: &str) -> Result<ConnectionRequest> {
        self.resolve(request_id, RequestStatus::Accepted).await
    }

    pub async fn reject(&mut self, request_id: &str) -> Result<ConnectionRequest> {
        self.resolve(request_id, RequestStatus::Rejected).await
    }

    #[instrument(skip(self))]
    async fn resolve(&mut self, request_id: &str, to: RequestStatus) -> Result<ConnectionRequest> {
        let index = self
            .incoming
            .iter()
            .position(|r| r.id == request_id)
            .ok_or_else(|| ChatError::NotFound(format!("request {}", request_id)))?;

        let current = self.incoming[index].status;
        if current != RequestStatus::Pending {
            return Err(ChatError::Conflict(format!(
                "request {} is already {:?}",
                request_id, current
            )));
        }

        match to {
            RequestStatus::Accepted => self.api.accept_request(request_id).await?,
            RequestStatus::Rejected => self.api.reject_request(request_id).await?,
            RequestStatus::Pending => {
                return Err(ChatError::Validation(
                    "cannot move a request back to pending".to_string(),
                ))
            }
        }

        let request = &mut self.incoming[index];
        request.status = to;
        info!("Request {} is now {:?}", request_id, to);
        Ok(request.clone())
    }

    pub fn results(&self) -> &[DoctorSearchResult] {
        &self.results
    }

    /// Incoming requests still waiting for an answer
    pub fn pending(&self) -> Vec<ConnectionRequest> {
        self.incoming
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn sent_requests(&self) -> &[ConnectionRequest] {
        &self.outgoing
    }
}
