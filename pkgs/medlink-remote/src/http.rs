//! REST client for the MedLink service
//!
//! One `HttpApi` implements every request/response collaborator trait of
//! `medlink-chat`. Non-success statuses are classified with
//! [`ChatError::from_status`], so a 401/403 from any endpoint reaches the
//! controller as an auth error.
//!
//! Endpoints, relative to the API base:
//!
//! | Operation | Method | Path |
//! |---|---|---|
//! | list conversations | GET | `conversations?role=<tab>` |
//! | fetch history | GET | `rooms/<room>/messages` |
//! | send message | POST | `rooms/<room>/messages` |
//! | search doctors | GET | `doctors/search?q=<query>` |
//! | send request | POST | `connections/requests` |
//! | pending requests | GET | `connections/requests/pending` |
//! | accept / reject | POST | `connections/requests/<id>/accept` (`/reject`) |
//! | assistant reply | POST | `assistant/reply` |

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use medlink_chat::api::decode_entries;
use medlink_chat::{
    AssistantApi, AssistantTurn, ChatError, ConversationApi, ConversationPayload, DoctorApi,
    DoctorPayload, MessageApi, MessagePayload, PendingRequestPayload, RequestAck, Result, Role,
    SendAck,
};

use crate::config::{with_segments, RemoteConfig};

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    #[serde(rename = "roomId")]
    room_id: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ConnectionRequestBody<'a> {
    #[serde(rename = "doctorId")]
    doctor_id: &'a str,
}

#[derive(Debug, Serialize)]
struct AssistantBody<'a> {
    messages: &'a [AssistantTurn],
}

#[derive(Debug, Deserialize)]
struct AssistantResponse {
    reply: String,
}

/// HTTP implementation of the request/response collaborators
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::Transport(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            base: config.api_base()?,
            token: config.token.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        with_segments(self.base.clone(), segments)
    }

    fn get(&self, url: Url) -> RequestBuilder {
        self.authorize(self.client.get(url))
    }

    fn post(&self, url: Url) -> RequestBuilder {
        self.authorize(self.client.post(url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and turn any non-success status into a `ChatError`
    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("Request failed with status {}", status);
        Err(ChatError::from_status(status.as_u16(), body)
            .unwrap_or_else(|| ChatError::TransientFetch(format!("unexpected status {}", status))))
    }

    async fn fetch_list<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<Vec<T>> {
        let response = self.execute(request).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| ChatError::MalformedPayload(format!("{} body: {}", what, e)))?;
        decode_entries(value, what)
    }

    /// Decode an acknowledgment body; an empty body counts as an empty ack
    async fn fetch_ack<T: DeserializeOwned + Default>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.execute(request).await?;
        let text = response.text().await.map_err(transport_error)?;
        if text.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn transport_error(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::TransientFetch(format!("request timed out: {}", e))
    } else {
        ChatError::TransientFetch(e.to_string())
    }
}

#[async_trait]
impl ConversationApi for HttpApi {
    #[instrument(skip(self))]
    async fn list_conversations(&self, tab: Role) -> Result<Vec<ConversationPayload>> {
        let url = self.endpoint(&["conversations"])?;
        self.fetch_list(self.get(url).query(&[("role", tab.as_str())]), "conversation")
            .await
    }
}

#[async_trait]
impl MessageApi for HttpApi {
    #[instrument(skip(self))]
    async fn fetch_history(&self, room: &str) -> Result<Vec<MessagePayload>> {
        let url = self.endpoint(&["rooms", room, "messages"])?;
        self.fetch_list(self.get(url), "message").await
    }

    #[instrument(skip(self, content))]
    async fn send_message(&self, room: &str, content: &str) -> Result<SendAck> {
        let url = self.endpoint(&["rooms", room, "messages"])?;
        let body = SendMessageBody {
            room_id: room,
            content,
        };
        let ack: SendAck = self.fetch_ack(self.post(url).json(&body)).await?;
        debug!("Message persisted in {} as {:?}", room, ack.id);
        Ok(ack)
    }
}

#[async_trait]
impl DoctorApi for HttpApi {
    #[instrument(skip(self))]
    async fn search_doctors(&self, query: &str) -> Result<Vec<DoctorPayload>> {
        let url = self.endpoint(&["doctors", "search"])?;
        self.fetch_list(self.get(url).query(&[("q", query)]), "doctor")
            .await
    }

    #[instrument(skip(self))]
    async fn send_request(&self, doctor_id: &str) -> Result<RequestAck> {
        let url = self.endpoint(&["connections", "requests"])?;
        let body = ConnectionRequestBody { doctor_id };
        self.fetch_ack(self.post(url).json(&body)).await
    }

    #[instrument(skip(self))]
    async fn pending_requests(&self) -> Result<Vec<PendingRequestPayload>> {
        let url = self.endpoint(&["connections", "requests", "pending"])?;
        self.fetch_list(self.get(url), "pending request").await
    }

    #[instrument(skip(self))]
    async fn accept_request(&self, request_id: &str) -> Result<()> {
        let url = self.endpoint(&["connections", "requests", request_id, "accept"])?;
        self.execute(self.post(url)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reject_request(&self, request_id: &str) -> Result<()> {
        let url = self.endpoint(&["connections", "requests", request_id, "reject"])?;
        self.execute(self.post(url)).await?;
        Ok(())
    }
}

#[async_trait]
impl AssistantApi for HttpApi {
    #[instrument(skip_all, fields(turns = thread.len()))]
    async fn reply(&self, thread: &[AssistantTurn]) -> Result<String> {
        let url = self.endpoint(&["assistant", "reply"])?;
        let response = self
            .execute(self.post(url).json(&AssistantBody { messages: thread }))
            .await?;
        let body: AssistantResponse = response
            .json()
            .await
            .map_err(|e| ChatError::MalformedPayload(format!("assistant reply: {}", e)))?;
        Ok(body.reply)
    }
}
