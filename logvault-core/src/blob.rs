//! Blob storage for archived logs
//!
//! Provides a `BlobStore` trait with an Azure Blob Storage implementation
//! speaking the REST API directly over `reqwest`:
//! - container probe: `HEAD {endpoint}/{container}?restype=container`
//! - container create: `PUT {endpoint}/{container}?restype=container`
//! - blob upload: `PUT {endpoint}/{container}/{blob}` (block blob, overwrites)
//!
//! Requests are signed with Shared Key when the connection string carries an
//! account key, otherwise the SAS token is appended to the query string.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode, Url};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// REST API version sent as `x-ms-version`.
pub const AZURE_API_VERSION: &str = "2021-08-06";

const LOG_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

// Well-known Azurite account, see `UseDevelopmentStorage=true`.
const DEV_ACCOUNT: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

// ============================================================================
// BlobStore trait
// ============================================================================

/// Abstraction over blob storage services.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// `Ok(false)` only when the service reports the container as absent.
    async fn container_exists(&self, container: &str) -> Result<bool, StorageError>;

    /// Create the container. Succeeds if it already exists.
    async fn create_container(&self, container: &str) -> Result<(), StorageError>;

    /// Write `body` to `name`, replacing any existing blob unconditionally.
    async fn put_blob(&self, container: &str, name: &str, body: String)
        -> Result<(), StorageError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage {operation} request failed: {source}")]
    Http {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Storage {operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid storage connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Request signing failed: {0}")]
    Signing(String),
}

// ============================================================================
// Connection string
// ============================================================================

#[derive(Clone)]
enum Credential {
    SharedKey(Vec<u8>),
    Sas(String),
}

/// Parsed `Key=Value;...` storage connection string.
#[derive(Clone)]
pub struct ConnectionString {
    account: String,
    credential: Credential,
    blob_endpoint: Url,
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let credential = match self.credential {
            Credential::SharedKey(_) => "shared-key",
            Credential::Sas(_) => "sas",
        };
        f.debug_struct("ConnectionString")
            .field("account", &self.account)
            .field("credential", &credential)
            .field("blob_endpoint", &self.blob_endpoint.as_str())
            .finish()
    }
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let mut account = None;
        let mut account_key = None;
        let mut sas = None;
        let mut protocol = None;
        let mut suffix = None;
        let mut endpoint = None;
        let mut dev_storage = false;

        for (index, part) in raw.split(';').map(str::trim).enumerate() {
            if part.is_empty() {
                continue;
            }
            // Never echo the segment itself; it may be a key.
            let (key, value) = part.split_once('=').ok_or_else(|| {
                StorageError::InvalidConnectionString(format!("segment {} has no '='", index + 1))
            })?;
            match key.to_ascii_lowercase().as_str() {
                "accountname" => account = Some(value.to_string()),
                "accountkey" => account_key = Some(value.to_string()),
                "sharedaccesssignature" => sas = Some(value.trim_start_matches('?').to_string()),
                "defaultendpointsprotocol" => protocol = Some(value.to_string()),
                "endpointsuffix" => suffix = Some(value.to_string()),
                "blobendpoint" => endpoint = Some(value.to_string()),
                "usedevelopmentstorage" => dev_storage = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if dev_storage {
            account.get_or_insert_with(|| DEV_ACCOUNT.to_string());
            account_key.get_or_insert_with(|| DEV_ACCOUNT_KEY.to_string());
            endpoint.get_or_insert_with(|| DEV_BLOB_ENDPOINT.to_string());
        }

        let credential = match (account_key, sas) {
            (Some(key), _) => Credential::SharedKey(BASE64_STANDARD.decode(key.trim()).map_err(
                |e| StorageError::InvalidConnectionString(format!("AccountKey is not valid base64: {}", e)),
            )?),
            (None, Some(token)) => Credential::Sas(token),
            (None, None) => {
                return Err(StorageError::InvalidConnectionString(
                    "no AccountKey or SharedAccessSignature".to_string(),
                ))
            }
        };

        let account = account.unwrap_or_default();
        if account.is_empty() && (matches!(credential, Credential::SharedKey(_)) || endpoint.is_none()) {
            return Err(StorageError::InvalidConnectionString(
                "AccountName is required".to_string(),
            ));
        }

        let endpoint = endpoint.unwrap_or_else(|| {
            format!(
                "{}://{}.blob.{}",
                protocol.as_deref().unwrap_or("https"),
                account,
                suffix.as_deref().unwrap_or("core.windows.net")
            )
        });
        let blob_endpoint = Url::parse(endpoint.trim_end_matches('/')).map_err(|e| {
            StorageError::InvalidConnectionString(format!("invalid blob endpoint '{}': {}", endpoint, e))
        })?;
        if blob_endpoint.cannot_be_a_base() {
            return Err(StorageError::InvalidConnectionString(format!(
                "invalid blob endpoint '{}'",
                endpoint
            )));
        }

        Ok(Self {
            account,
            credential,
            blob_endpoint,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn blob_endpoint(&self) -> &Url {
        &self.blob_endpoint
    }
}

// ============================================================================
// AzureBlobStore
// ============================================================================

/// Azure Blob Storage over the REST API.
#[derive(Clone)]
pub struct AzureBlobStore {
    client: Client,
    connection: ConnectionString,
}

impl fmt::Debug for AzureBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBlobStore")
            .field("connection", &self.connection)
            .finish()
    }
}

impl AzureBlobStore {
    pub fn from_connection_string(raw: &str, timeout: Duration) -> Result<Self, StorageError> {
        let connection = ConnectionString::parse(raw)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| StorageError::Http {
                operation: "client setup",
                source,
            })?;

        tracing::debug!(
            account = %connection.account,
            endpoint = %connection.blob_endpoint,
            "Azure blob store initialized"
        );

        Ok(Self { client, connection })
    }

    fn resource_url(&self, container: &str, blob: Option<&str>) -> Result<Url, StorageError> {
        let mut url = self.connection.blob_endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StorageError::InvalidConnectionString("blob endpoint cannot hold a path".to_string())
            })?;
            segments.pop_if_empty().push(container);
            if let Some(blob) = blob {
                segments.push(blob);
            }
        }
        if blob.is_none() {
            url.query_pairs_mut().append_pair("restype", "container");
        }
        Ok(url)
    }

    /// Send a request with the common `x-ms-*` headers and credentials applied.
    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        mut url: Url,
        extra_headers: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<reqwest::Response, StorageError> {
        let date = rfc1123_now();
        let content_length = body.as_ref().map(String::len).unwrap_or(0);
        let content_type = if body.is_some() { LOG_CONTENT_TYPE } else { "" };
        // Azure rejects a PUT without Content-Length.
        let empty_put = body.is_none() && method == Method::PUT;

        let authorization = match &self.connection.credential {
            Credential::SharedKey(key) => {
                let mut ms_headers: Vec<(&str, &str)> =
                    vec![("x-ms-date", date.as_str()), ("x-ms-version", AZURE_API_VERSION)];
                ms_headers.extend_from_slice(extra_headers);
                Some(sign_shared_key(
                    &self.connection.account,
                    key,
                    &method,
                    &url,
                    content_length,
                    content_type,
                    &ms_headers,
                )?)
            }
            Credential::Sas(token) => {
                let query = match url.query() {
                    Some(q) => format!("{}&{}", q, token),
                    None => token.clone(),
                };
                url.set_query(Some(&query));
                None
            }
        };

        let mut request = self
            .client
            .request(method, url)
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION);
        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }
        if let Some(auth) = authorization {
            request = request.header("Authorization", auth);
        }
        if let Some(body) = body {
            request = request.header("Content-Type", content_type).body(body);
        } else if empty_put {
            request = request.header("Content-Length", "0");
        }

        request
            .send()
            .await
            .map_err(|source| StorageError::Http { operation, source })
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn container_exists(&self, container: &str) -> Result<bool, StorageError> {
        let operation = "container probe";
        let url = self.resource_url(container, None)?;
        let response = self.send(operation, Method::HEAD, url, &[], None).await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(StorageError::Status {
                operation,
                status: s.as_u16(),
                body: String::new(),
            }),
        }
    }

    async fn create_container(&self, container: &str) -> Result<(), StorageError> {
        let operation = "create container";
        let url = self.resource_url(container, None)?;
        let response = self.send(operation, Method::PUT, url, &[], None).await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => {
                tracing::debug!(container, "Container already exists");
                Ok(())
            }
            s => Err(status_error(operation, s, response).await),
        }
    }

    async fn put_blob(
        &self,
        container: &str,
        name: &str,
        body: String,
    ) -> Result<(), StorageError> {
        let operation = "upload";
        let url = self.resource_url(container, Some(name))?;
        let response = self
            .send(
                operation,
                Method::PUT,
                url,
                &[("x-ms-blob-type", "BlockBlob")],
                Some(body),
            )
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            Err(status_error(operation, status, response).await)
        }
    }

    fn name(&self) -> &str {
        "azure"
    }
}

async fn status_error(
    operation: &'static str,
    status: StatusCode,
    response: reqwest::Response,
) -> StorageError {
    StorageError::Status {
        operation,
        status: status.as_u16(),
        body: response.text().await.unwrap_or_default(),
    }
}

fn rfc1123_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Build the `Authorization: SharedKey account:signature` header value.
fn sign_shared_key(
    account: &str,
    key: &[u8],
    method: &Method,
    url: &Url,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, &str)],
) -> Result<String, StorageError> {
    let string_to_sign =
        shared_key_string_to_sign(account, method, url, content_length, content_type, ms_headers);

    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| StorageError::Signing(e.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!("SharedKey {}:{}", account, signature))
}

/// Shared Key string-to-sign for the Blob service.
///
/// Content-Length is signed as empty when zero. `ms_headers` must hold every
/// `x-ms-*` header sent with the request. The canonical resource is
/// `/{account}{path}`, so path-style endpoints (Azurite) carry the account
/// name twice.
fn shared_key_string_to_sign(
    account: &str,
    method: &Method,
    url: &Url,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, &str)],
) -> String {
    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical_headers = headers
        .iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join("\n");

    let mut canonical_resource = format!("/{}{}", account, url.path());
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
        .collect();
    params.sort();
    for (k, v) in params {
        canonical_resource.push_str(&format!("\n{}:{}", k, v));
    }

    let content_length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    // VERB, Content-Encoding, Content-Language, Content-Length, Content-MD5,
    // Content-Type, Date, If-Modified-Since, If-Match, If-None-Match,
    // If-Unmodified-Since, Range
    format!(
        "{}\n{}\n{}",
        [
            method.as_str(),
            "",
            "",
            &content_length,
            "",
            content_type,
            "",
            "",
            "",
            "",
            "",
            "",
        ]
        .join("\n"),
        canonical_headers,
        canonical_resource
    )
}

// ============================================================================
// TESTS
// ============================================================================
