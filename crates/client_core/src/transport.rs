use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde_json::Value;
use shared::{
    error::ApiErrorBody,
    protocol::{QueryRequest, StatusResponse, PDF_MEDIA_TYPE, UPLOAD_FILE_FIELD},
};
use tracing::debug;
use url::Url;

use crate::{
    error::{ClientError, TransportError},
    upload::PdfFile,
};

/// Request/response contract of the document question-answering service.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Sends the document as multipart form data and returns the JSON body.
    async fn upload_document(&self, file: &PdfFile) -> Result<Value, TransportError>;
    async fn query(&self, request: &QueryRequest) -> Result<Value, TransportError>;
    async fn status(&self) -> Result<StatusResponse, TransportError>;
}

pub struct HttpDocumentApi {
    http: Client,
    base_url: Url,
}

impl HttpDocumentApi {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| ClientError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|err| TransportError::Request(format!("invalid endpoint '{path}': {err}")))
    }
}

#[async_trait]
impl DocumentApi for HttpDocumentApi {
    async fn upload_document(&self, file: &PdfFile) -> Result<Value, TransportError> {
        let url = self.endpoint("upload")?;
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str(PDF_MEDIA_TYPE)
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let form = Form::new().part(UPLOAD_FILE_FIELD, part);

        debug!(%url, filename = %file.filename, size = file.bytes.len(), "upload: posting document");
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        read_json(response).await
    }

    async fn query(&self, request: &QueryRequest) -> Result<Value, TransportError> {
        let url = self.endpoint("query")?;
        debug!(%url, session_id = %request.session_id, "query: posting question");
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        read_json(response).await
    }

    async fn status(&self) -> Result<StatusResponse, TransportError> {
        let url = self.endpoint("status")?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let body = read_json(response).await?;
        serde_json::from_value(body).map_err(|err| TransportError::MalformedBody(err.to_string()))
    }
}

async fn read_json(response: Response) -> Result<Value, TransportError> {
    let status = response.status();
    let raw = response
        .text()
        .await
        .map_err(|err| TransportError::Network(err.to_string()))?;

    if !status.is_success() {
        let message = ApiErrorBody::detail_from(&raw).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });
        return Err(TransportError::Status {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&raw).map_err(|err| TransportError::MalformedBody(err.to_string()))
}

/// Parses the service root and makes sure relative endpoints append to it.
fn normalize_base_url(raw: &str) -> Result<Url, ClientError> {
    let raw = raw.trim();
    let mut url = Url::parse(raw)
        .map_err(|err| ClientError::Config(format!("invalid api url '{raw}': {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::Config(format!(
            "api url must start with http:// or https://, got '{raw}'"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
