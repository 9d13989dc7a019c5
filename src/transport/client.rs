//! Connection configuration shared by the three operations

use super::{HttpDownload, HttpUpload, TransportError};
use crate::config::SessionParams;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder};
use tokio::runtime::Handle;

/// HTTP client bound to the runtime that drives its requests.
///
/// `open_upload` and `open_download` are meant for pipeline threads
/// (`spawn_blocking`); they must not be called from async code.
#[derive(Clone)]
pub struct BroadcastClient {
    pub(super) http: reqwest::Client,
    pub(super) runtime: Handle,
}

impl BroadcastClient {
    /// No timeouts: a stalled server blocks a pipeline until it is cancelled
    pub fn new(runtime: Handle) -> Self {
        Self {
            http: reqwest::Client::new(),
            runtime,
        }
    }

    /// Authorized request to the broadcast endpoint
    pub(super) fn request(&self, method: Method, params: &SessionParams) -> RequestBuilder {
        self.http
            .request(method, params.endpoint())
            .bearer_auth(params.auth_token())
    }

    /// Start the chunked PUT; chunks go through the returned handle
    pub fn open_upload(&self, params: &SessionParams) -> Result<HttpUpload, TransportError> {
        let request = self
            .request(Method::PUT, params)
            .header(CONTENT_TYPE, "application/octet-stream");
        Ok(HttpUpload::start(request, self.runtime.clone()))
    }

    /// Issue the GET and wait for the response head
    pub fn open_download(&self, params: &SessionParams) -> Result<HttpDownload, TransportError> {
        let request = self.request(Method::GET, params);
        HttpDownload::connect(request, self.runtime.clone())
    }
}
