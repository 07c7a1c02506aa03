//! HTTP access to the protocol endpoint.
//!
//! [`HttpTransport`] is the production [`RemoteTransport`]: collection
//! queries become GET requests with the filters rendered as query
//! parameters, and writes are signed POSTs to an outbox.

use async_trait::async_trait;
use fedi_crypto::RequestSigner;
use fedi_protocol::{Filters, ProtocolError};
use fedi_sync::{RemoteTransport, SyncError, SyncResult};
use fedi_types::{WireItem, WireObject};
use http::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{SdkError, SdkResult};

pub const ACTIVITY_JSON: &str = "application/activity+json";

/// Error document returned by the endpoint on failed requests.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    errors: Vec<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> SdkResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SdkError::Config(e.to_string()))?;
        Ok(Self { client })
    }

    async fn get(&self, url: Url) -> SyncResult<reqwest::Response> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, ACTIVITY_JSON)
            .send()
            .await
            .map_err(transport_error)?;
        checked(url.as_str(), response).await
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn collection(&self, iri: &str, filters: &Filters) -> SyncResult<WireObject> {
        let url = collection_url(iri, filters)?;
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        parse_body(iri, &bytes)
    }

    async fn fetch(&self, iri: &str) -> SyncResult<WireItem> {
        let url = parse_url(iri)?;
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        parse_body(iri, &bytes)
    }

    async fn submit(
        &self,
        outbox: &str,
        activity: &WireObject,
        signer: &RequestSigner,
    ) -> SyncResult<WireItem> {
        let url = parse_url(outbox)?;
        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|e| SyncError::Transport(format!("{outbox}: {e}")))?;
        let body = serde_json::to_vec(activity)
            .map_err(|e| SyncError::Transport(format!("unable to encode activity: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACTIVITY_JSON));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(ACTIVITY_JSON));
        signer.sign(&Method::POST, &uri, &mut headers)?;

        debug!(outbox = %outbox, kind = activity.kind.as_str(), "POST");
        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = checked(outbox, response).await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(transport_error)?;
        if let Ok(stored) = serde_json::from_slice::<WireItem>(&bytes) {
            return Ok(stored);
        }
        match location {
            Some(location) => self.fetch(&location).await,
            None => Err(SyncError::Transport(format!(
                "{outbox} accepted the activity without returning it"
            ))),
        }
    }
}

fn parse_url(iri: &str) -> SyncResult<Url> {
    Url::parse(iri).map_err(|e| SyncError::Transport(format!("{iri}: {e}")))
}

/// Collection IRI with the filters appended as query parameters.
pub fn collection_url(iri: &str, filters: &Filters) -> SyncResult<Url> {
    let mut url = parse_url(iri)?;
    let pairs = filters.to_query_pairs();
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(url)
}

/// Decode a successful response; an unexpected shape is a decode failure.
pub fn parse_body<T: DeserializeOwned>(iri: &str, bytes: &[u8]) -> SyncResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| SyncError::Decode(ProtocolError::decode("response", format!("{iri}: {e}"))))
}

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Transport(format!("request timed out: {err}"))
    } else {
        SyncError::Transport(err.to_string())
    }
}

async fn checked(iri: &str, response: reqwest::Response) -> SyncResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(remote_error(iri, status, &body))
}

/// Translate a failed response into an error.
///
/// A body that does not parse as an error document is logged and reported
/// as a generic internal failure rather than as a parse error.
pub fn remote_error(iri: &str, status: StatusCode, body: &str) -> SyncError {
    if status == StatusCode::NOT_FOUND {
        return SyncError::NotFound(iri.to_string());
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => {
            let first = parsed.errors.into_iter().next();
            let code = first
                .as_ref()
                .and_then(|e| e.code)
                .filter(|c| *c >= 400)
                .unwrap_or(status.as_u16());
            let message = first
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| status.to_string());
            if code == StatusCode::NOT_FOUND.as_u16() {
                return SyncError::NotFound(iri.to_string());
            }
            SyncError::Remote {
                status: code,
                message,
            }
        }
        Err(e) => {
            warn!(iri = %iri, status = status.as_u16(), error = %e, "unable to parse error response");
            SyncError::Remote {
                status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                message: format!("unknown error from {iri}"),
            }
        }
    }
}
