//! A backend that talks to the assistant server over HTTP.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::path::Path;
use std::sync::Arc;

use ched_model::{
    Backend, BackendError, ErrorKind, HistoryMessage, QueryRequest,
    ThreadSummary,
};
use mime::Mime;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, Url, header};
use serde::de::DeserializeOwned;

pub use config::{HttpBackendConfig, HttpBackendConfigBuilder};
use io::{Chunks, Records};
use proto::{
    HistoryResponse, QueryBody, ThreadsResponse, UploadResponse,
    create_history_message,
};
pub use response::HttpQueryResponse;

const API_KEY_HEADER: &str = "X-API-Key";

/// Error type for [`HttpBackend`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// The assistant server reached over HTTP.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    config: Arc<HttpBackendConfig>,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` with the given configuration.
    #[inline]
    pub fn new(config: HttpBackendConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = Url::parse(&self.config.base_url).map_err(|err| {
            Error::new(
                format!("invalid base url {:?}: {err}", self.config.base_url),
                ErrorKind::Connectivity,
            )
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::new("base url cannot have paths", ErrorKind::Connectivity)
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> Result<RequestBuilder, Error> {
        let url = self.endpoint(segments)?;
        Ok(self
            .client
            .request(method, url)
            .header(API_KEY_HEADER, &self.config.api_key))
    }
}

impl Backend for HttpBackend {
    type Error = Error;
    type Response = HttpQueryResponse;

    fn list_threads(
        &self,
    ) -> impl Future<Output = Result<Vec<ThreadSummary>, Self::Error>> + Send + 'static
    {
        let req = self.request(Method::GET, &["chat", "threads"]).map(|req| {
            req.query(&[("user_id", self.config.user_id.as_str())])
        });
        async move {
            let resp = send(req?, ErrorKind::Connectivity).await?;
            let body: ThreadsResponse =
                read_json(resp, ErrorKind::Connectivity).await?;
            Ok(body.threads.into_iter().map(Into::into).collect())
        }
    }

    fn load_history(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HistoryMessage>, Self::Error>>
    + Send
    + 'static {
        let limit = limit.to_string();
        let req = self.request(Method::GET, &["chat", "history"]).map(|req| {
            req.query(&[
                ("user_id", self.config.user_id.as_str()),
                ("thread_id", thread_id),
                ("limit", limit.as_str()),
            ])
        });
        async move {
            let resp = send(req?, ErrorKind::Connectivity).await?;
            let body: HistoryResponse =
                read_json(resp, ErrorKind::Connectivity).await?;
            Ok(body
                .messages
                .into_iter()
                .filter_map(create_history_message)
                .collect())
        }
    }

    fn delete_thread(
        &self,
        thread_id: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let req = self
            .request(Method::DELETE, &["chat", "threads", thread_id])
            .map(|req| {
                req.query(&[("user_id", self.config.user_id.as_str())])
            });
        async move {
            send(req?, ErrorKind::Connectivity).await?;
            Ok(())
        }
    }

    fn upload(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static {
        let path = path.to_owned();
        let req = self.request(Method::POST, &["upload"]);
        async move {
            let req = req?;
            let bytes = tokio::fs::read(&path).await.map_err(|err| {
                Error::new(
                    format!("cannot read {}: {err}", path.display()),
                    ErrorKind::Upload,
                )
            })?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".to_owned());
            let part = Part::bytes(bytes)
                .file_name(file_name)
                .mime_str(mime_for(&path).as_ref())
                .map_err(|err| Error::new(format!("{err}"), ErrorKind::Upload))?;
            let form = Form::new().part("file", part);

            let resp = send(req.multipart(form), ErrorKind::Upload).await?;
            let body: UploadResponse =
                read_json(resp, ErrorKind::Upload).await?;
            debug!("uploaded {} as {}", path.display(), body.path);
            Ok(body.path)
        }
    }

    fn send_query(
        &self,
        req: &QueryRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let body = QueryBody {
            query: &req.query,
            file_paths: &req.file_paths,
            thread_id: &req.thread_id,
            user_id: &self.config.user_id,
        };
        let http_req = self.request(Method::POST, &["query"]).map(|req| {
            req.header(header::ACCEPT, "text/event-stream").json(&body)
        });

        async move {
            let resp = send(http_req?, ErrorKind::Connectivity).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                warn!("unexpected content type: {content_type:?}");
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            Ok(HttpQueryResponse::from_records(Records::new(chunks)))
        }
    }
}

async fn send(req: RequestBuilder, kind: ErrorKind) -> Result<Response, Error> {
    match req.send().await.and_then(Response::error_for_status) {
        Ok(resp) => Ok(resp),
        Err(err) => {
            warn!("request failed: {err}");
            Err(Error::new(format!("{err}"), kind))
        }
    }
}

async fn read_json<T: DeserializeOwned>(
    resp: Response,
    kind: ErrorKind,
) -> Result<T, Error> {
    resp.json()
        .await
        .map_err(|err| Error::new(format!("invalid response: {err}"), kind))
}

fn mime_for(path: &Path) -> Mime {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    let essence = match ext.as_deref() {
        Some("pdf") => return mime::APPLICATION_PDF,
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        _ => return mime::APPLICATION_OCTET_STREAM,
    };
    essence.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}
