use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const ASSET_CHECK_PATH: &str = "api/v1/acls/login-asset/check/";
const APPLICATION_CHECK_PATH: &str = "api/v1/acls/login-app/check/";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid backend configuration: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected http status {status}: {detail}")]
    HttpStatus { status: StatusCode, detail: String },
    #[error("invalid request descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Backend-issued description of a follow-up call. Replayed verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.method.is_empty() && self.url.is_empty()
    }
}

/// What the backend hands back when an asset-like connection is checked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ConfirmationTicket {
    pub need_confirm: bool,
    #[serde(default)]
    pub check_confirm_status: RequestDescriptor,
    #[serde(default)]
    pub close_confirm: RequestDescriptor,
    #[serde(default)]
    pub ticket_detail_url: String,
    #[serde(default)]
    pub reviewers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ConfirmStatusResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub processor: String,
}

impl ConfirmStatusResponse {
    pub fn kind(&self) -> ConfirmStatus<'_> {
        ConfirmStatus::parse(&self.status)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmStatus<'a> {
    Approve,
    Reject,
    Await,
    Unknown(&'a str),
}

impl<'a> ConfirmStatus<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match raw {
            "approve" => ConfirmStatus::Approve,
            "reject" => ConfirmStatus::Reject,
            "await" => ConfirmStatus::Await,
            other => ConfirmStatus::Unknown(other),
        }
    }
}

#[async_trait]
pub trait ConfirmationBackend: Send + Sync {
    async fn check_application(
        &self,
        user_id: &str,
        application_id: &str,
        system_user_id: &str,
    ) -> Result<bool, BackendError>;

    async fn check_asset(
        &self,
        user_id: &str,
        asset_id: &str,
        system_user_id: &str,
        system_username: &str,
    ) -> Result<ConfirmationTicket, BackendError>;

    async fn status(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<ConfirmStatusResponse, BackendError>;

    async fn cancel(&self, descriptor: &RequestDescriptor) -> Result<(), BackendError>;
}

#[derive(Debug, Clone)]
pub struct HttpConfirmationBackend {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl HttpConfirmationBackend {
    pub fn new(base_url: Url, access_token: Option<String>) -> Result<Self, BackendError> {
        if base_url.cannot_be_a_base() {
            return Err(BackendError::InvalidConfig(format!(
                "backend url '{base_url}' cannot be used as a base"
            )));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url,
            access_token,
        })
    }

    fn url(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url.join(path).map_err(|err| {
            BackendError::InvalidConfig(format!("invalid backend path '{path}': {err}"))
        })
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn replay(&self, descriptor: &RequestDescriptor) -> Result<reqwest::Response, BackendError> {
        if descriptor.method.is_empty() || descriptor.url.is_empty() {
            return Err(BackendError::InvalidDescriptor(format!(
                "descriptor requires both method and url (method='{}', url='{}')",
                descriptor.method, descriptor.url
            )));
        }
        let method = Method::from_bytes(descriptor.method.as_bytes()).map_err(|err| {
            BackendError::InvalidDescriptor(format!("method '{}': {err}", descriptor.method))
        })?;
        let url = self.base_url.join(&descriptor.url).map_err(|err| {
            BackendError::InvalidDescriptor(format!("url '{}': {err}", descriptor.url))
        })?;
        let response = self.request(method, url).send().await?;
        ensure_success(response).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    let detail = detail.trim();
    Err(BackendError::HttpStatus {
        status,
        detail: if detail.is_empty() {
            "no response body".to_string()
        } else {
            detail.to_string()
        },
    })
}

#[async_trait]
impl ConfirmationBackend for HttpConfirmationBackend {
    async fn check_application(
        &self,
        user_id: &str,
        application_id: &str,
        system_user_id: &str,
    ) -> Result<bool, BackendError> {
        #[derive(Serialize)]
        struct RequestBody<'a> {
            user_id: &'a str,
            application_id: &'a str,
            system_user_id: &'a str,
        }

        #[derive(Deserialize)]
        struct ResponseBody {
            #[serde(default)]
            need_confirm: bool,
        }

        let url = self.url(APPLICATION_CHECK_PATH)?;
        let response = self
            .request(Method::POST, url)
            .json(&RequestBody {
                user_id,
                application_id,
                system_user_id,
            })
            .send()
            .await?;
        let body: ResponseBody = ensure_success(response).await?.json().await?;
        Ok(body.need_confirm)
    }

    async fn check_asset(
        &self,
        user_id: &str,
        asset_id: &str,
        system_user_id: &str,
        system_username: &str,
    ) -> Result<ConfirmationTicket, BackendError> {
        #[derive(Serialize)]
        struct RequestBody<'a> {
            user_id: &'a str,
            asset_id: &'a str,
            system_user_id: &'a str,
            system_username: &'a str,
        }

        let url = self.url(ASSET_CHECK_PATH)?;
        let response = self
            .request(Method::POST, url)
            .json(&RequestBody {
                user_id,
                asset_id,
                system_user_id,
                system_username,
            })
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn status(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<ConfirmStatusResponse, BackendError> {
        Ok(self.replay(descriptor).await?.json().await?)
    }

    async fn cancel(&self, descriptor: &RequestDescriptor) -> Result<(), BackendError> {
        self.replay(descriptor).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_and_unknown_statuses() {
        assert_eq!(ConfirmStatus::parse("approve"), ConfirmStatus::Approve);
        assert_eq!(ConfirmStatus::parse("reject"), ConfirmStatus::Reject);
        assert_eq!(ConfirmStatus::parse("await"), ConfirmStatus::Await);
        assert_eq!(
            ConfirmStatus::parse("Approve"),
            ConfirmStatus::Unknown("Approve")
        );
    }

    #[test]
    fn ticket_tolerates_missing_optional_fields() {
        let ticket: ConfirmationTicket =
            serde_json::from_str(r#"{"need_confirm": false}"#).unwrap();
        assert!(!ticket.need_confirm);
        assert!(ticket.check_confirm_status.is_empty());
        assert!(ticket.reviewers.is_empty());
    }

    #[test]
    fn ticket_keeps_reviewer_order() {
        let ticket: ConfirmationTicket = serde_json::from_value(serde_json::json!({
            "need_confirm": true,
            "check_confirm_status": {"method": "GET", "url": "/api/v1/tickets/1/status/"},
            "close_confirm": {"method": "DELETE", "url": "/api/v1/tickets/1/"},
            "ticket_detail_url": "https://jms.example/tickets/1",
            "reviewers": ["carol", "alice", "bob"],
        }))
        .unwrap();
        assert_eq!(ticket.reviewers, vec!["carol", "alice", "bob"]);
        assert_eq!(ticket.close_confirm.method, "DELETE");
    }

    #[test]
    fn rejects_base_urls_that_cannot_be_joined() {
        let url = Url::parse("mailto:ops@example.com").unwrap();
        assert!(matches!(
            HttpConfirmationBackend::new(url, None),
            Err(BackendError::InvalidConfig(_))
        ));
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn empty_descriptor_is_rejected_before_any_request() {
        let backend =
            HttpConfirmationBackend::new(Url::parse("http://127.0.0.1:9/").unwrap(), None)
                .unwrap();
        let err = backend
            .status(&RequestDescriptor::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidDescriptor(_)));
    }
}
