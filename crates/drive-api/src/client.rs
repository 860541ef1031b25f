//! Drive v3 client
//!
//! Every call resolves the owner's credential first. Without one, the call
//! fails with `NotAuthorized` and nothing is sent to Drive.

use std::sync::Arc;
use std::time::Duration;

use drive_auth::CredentialStore;
use reqwest::Response;
use tracing::debug;
use url::Url;

use crate::content::{
    DriveFile, FILE_FIELDS, FileContent, FileList, LIST_FIELDS, export_format, is_text,
    is_workspace,
};
use crate::error::{Error, Result};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_LIST_LIMIT: u32 = 20;
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const MAX_RESULTS: u32 = 100;

/// Read-only facade over the owner's Drive.
pub struct DriveClient {
    http: reqwest::Client,
    base_url: Url,
    store: Arc<CredentialStore>,
    owner: String,
}

impl DriveClient {
    pub fn new(store: Arc<CredentialStore>, owner: impl Into<String>) -> Result<Self> {
        Self::with_base_url(store, owner, DEFAULT_API_BASE, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(
        store: Arc<CredentialStore>,
        owner: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| Error::Config(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("{base_url} cannot be a base")));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            store,
            owner: owner.into(),
        })
    }

    /// Most recent files, `max_results` defaulting to 20 and capped at 100.
    pub async fn list_files(&self, max_results: Option<u32>) -> Result<Vec<DriveFile>> {
        let page_size = clamp(max_results, DEFAULT_LIST_LIMIT);
        let url = self.files_url(&[])?;
        let response = self
            .authorized_get(url)
            .await?
            .query(&[
                ("pageSize", page_size.to_string()),
                ("fields", LIST_FIELDS.to_string()),
            ])
            .send()
            .await?;
        let list: FileList = parse_json(check(response).await?).await?;
        debug!(count = list.files.len(), "listed drive files");
        Ok(list.files)
    }

    /// Files whose name contains `query`.
    pub async fn search_files(&self, query: &str, max_results: Option<u32>) -> Result<Vec<DriveFile>> {
        let page_size = clamp(max_results, DEFAULT_SEARCH_LIMIT);
        let url = self.files_url(&[])?;
        let response = self
            .authorized_get(url)
            .await?
            .query(&[
                ("q", name_contains(query)),
                ("pageSize", page_size.to_string()),
                ("fields", LIST_FIELDS.to_string()),
            ])
            .send()
            .await?;
        let list: FileList = parse_json(check(response).await?).await?;
        debug!(count = list.files.len(), "searched drive files");
        Ok(list.files)
    }

    /// Metadata plus, where possible, the file's text.
    pub async fn read_file(&self, file_id: &str) -> Result<FileContent> {
        let file = self.metadata(file_id).await?;

        if is_workspace(&file.mime_type) {
            let Some(target) = export_format(&file.mime_type) else {
                debug!(file_id, mime_type = %file.mime_type, "workspace type has no text export");
                return Ok(FileContent::Unsupported { file });
            };
            let url = self.files_url(&[file_id, "export"])?;
            let response = self
                .authorized_get(url)
                .await?
                .query(&[("mimeType", target)])
                .send()
                .await?;
            let bytes = check(response).await?.bytes().await?;
            return Ok(FileContent::Exported {
                file,
                exported_as: target,
                content: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let url = self.files_url(&[file_id])?;
        let response = self
            .authorized_get(url)
            .await?
            .query(&[("alt", "media")])
            .send()
            .await?;
        let bytes = check(response).await?.bytes().await?;

        if is_text(&file.mime_type) {
            if let Ok(content) = String::from_utf8(bytes.to_vec()) {
                return Ok(FileContent::Text { file, content });
            }
            debug!(file_id, "text mime type with non-UTF-8 body, treating as binary");
        }
        Ok(FileContent::Binary { file })
    }

    async fn metadata(&self, file_id: &str) -> Result<DriveFile> {
        let url = self.files_url(&[file_id])?;
        let response = self
            .authorized_get(url)
            .await?
            .query(&[("fields", FILE_FIELDS)])
            .send()
            .await?;
        parse_json(check(response).await?).await
    }

    async fn authorized_get(&self, url: Url) -> Result<reqwest::RequestBuilder> {
        let record = self
            .store
            .resolve(&self.owner)
            .await
            .ok_or(Error::NotAuthorized)?;
        Ok(self.http.get(url).bearer_auth(record.access.expose()))
    }

    /// `{base}/drive/v3/files/{segments...}` with each segment percent-encoded.
    fn files_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| Error::Config(self.base_url.to_string()))?;
            path.pop_if_empty().extend(["drive", "v3", "files"]);
            path.extend(segments);
        }
        Ok(url)
    }
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("base_url", &self.base_url.as_str())
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

fn clamp(requested: Option<u32>, default: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, MAX_RESULTS)
}

/// Drive query matching names that contain `query`, with `'` escaped.
fn name_contains(query: &str) -> String {
    let escaped = query.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name contains '{escaped}'")
}

/// Pass 2xx responses through; turn anything else into `Error::Api`.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    Err(Error::Api {
        status: status.as_u16(),
        message: api_message(&body),
    })
}

/// Drive wraps errors as `{"error":{"code":..,"message":..}}`.
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_auth::{Clock, ExchangeFuture, ManualClock, TokenExchanger, TokenResponse};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OWNER: &str = "owner@example.com";

    /// Exchanger that must never be reached; credentials here are always fresh.
    struct NoExchange;

    impl TokenExchanger for NoExchange {
        fn exchange_code<'a>(&'a self, _code: &'a str) -> ExchangeFuture<'a> {
            Box::pin(async { Err(drive_auth::Error::ExchangeFailure("unused".into())) })
        }

        fn refresh<'a>(&'a self, _refresh_token: &'a str) -> ExchangeFuture<'a> {
            Box::pin(async { Err(drive_auth::Error::ExchangeFailure("unused".into())) })
        }
    }

    fn empty_store() -> Arc<CredentialStore> {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_700_000_000_000));
        Arc::new(CredentialStore::new(Arc::new(NoExchange), clock))
    }

    async fn authorized_store() -> Arc<CredentialStore> {
        let store = empty_store();
        store
            .store(
                OWNER,
                TokenResponse {
                    access_token: "ya29.token".into(),
                    refresh_token: Some("1//refresh".into()),
                    expires_in: Some(3599),
                    scope: None,
                    token_type: Some("Bearer".into()),
                },
            )
            .await;
        store
    }

    fn client(server: &MockServer, store: Arc<CredentialStore>) -> DriveClient {
        DriveClient::with_base_url(store, OWNER, &server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn meta(id: &str, name: &str, mime: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "mimeType": mime,
            "webViewLink": format!("https://drive.google.com/file/d/{id}/view")
        })
    }

    #[test]
    fn clamp_applies_default_and_cap() {
        assert_eq!(clamp(None, 20), 20);
        assert_eq!(clamp(Some(5), 20), 5);
        assert_eq!(clamp(Some(500), 20), 100);
        assert_eq!(clamp(Some(0), 20), 1);
    }

    #[test]
    fn name_query_escapes_quotes() {
        assert_eq!(name_contains("report"), "name contains 'report'");
        assert_eq!(name_contains("bob's"), r"name contains 'bob\'s'");
    }

    #[test]
    fn api_message_prefers_drive_error_message() {
        let body = r#"{"error":{"code":404,"message":"File not found: x","errors":[]}}"#;
        assert_eq!(api_message(body), "File not found: x");
        assert_eq!(api_message("plain failure"), "plain failure");
    }

    #[test]
    fn files_url_encodes_segments() {
        let store = empty_store();
        let client = DriveClient::with_base_url(store, OWNER, "http://drive.test/", DEFAULT_TIMEOUT)
            .unwrap();
        let url = client.files_url(&["a/b", "export"]).unwrap();
        assert_eq!(url.as_str(), "http://drive.test/drive/v3/files/a%2Fb/export");
    }

    #[test]
    fn rejects_unusable_base_url() {
        let err = DriveClient::with_base_url(empty_store(), OWNER, "mailto:x@y", DEFAULT_TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn no_credential_is_not_authorized_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server, empty_store());
        assert!(matches!(client.list_files(None).await, Err(Error::NotAuthorized)));
        assert!(matches!(
            client.search_files("x", None).await,
            Err(Error::NotAuthorized)
        ));
        assert!(matches!(client.read_file("id").await, Err(Error::NotAuthorized)));
    }

    #[tokio::test]
    async fn list_sends_bearer_and_page_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(header("authorization", "Bearer ya29.token"))
            .and(query_param("pageSize", "20"))
            .and(query_param("fields", LIST_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [
                    {"id": "1", "name": "a.txt", "mimeType": "text/plain", "size": "3"},
                    {"id": "2", "name": "Plan", "mimeType": "application/vnd.google-apps.document"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let files = client(&server, authorized_store().await)
            .list_files(None)
            .await
            .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "a.txt");
        assert!(files[1].size.is_none());
    }

    #[tokio::test]
    async fn list_caps_page_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("pageSize", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
            .expect(1)
            .mount(&server)
            .await;

        let files = client(&server, authorized_store().await)
            .list_files(Some(1000))
            .await
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn search_builds_name_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("q", r"name contains 'q3 o\'brien'"))
            .and(query_param("pageSize", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": [{"id": "9", "name": "q3 o'brien notes", "mimeType": "text/plain"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let files = client(&server, authorized_store().await)
            .search_files("q3 o'brien", None)
            .await
            .unwrap();
        assert_eq!(files[0].id, "9");
    }

    #[tokio::test]
    async fn read_exports_google_doc() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/doc1"))
            .and(query_param("fields", FILE_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(
                "doc1",
                "Plan",
                "application/vnd.google-apps.document",
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/doc1/export"))
            .and(query_param("mimeType", "text/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Quarterly plan"))
            .expect(1)
            .mount(&server)
            .await;

        let content = client(&server, authorized_store().await)
            .read_file("doc1")
            .await
            .unwrap();
        match content {
            FileContent::Exported {
                exported_as,
                content,
                file,
            } => {
                assert_eq!(exported_as, "text/plain");
                assert_eq!(content, "Quarterly plan");
                assert_eq!(file.name, "Plan");
            }
            other => panic!("expected Exported, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_exports_sheet_as_csv() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(
                "s1",
                "Budget",
                "application/vnd.google-apps.spreadsheet",
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/s1/export"))
            .and(query_param("mimeType", "text/csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"))
            .mount(&server)
            .await;

        let content = client(&server, authorized_store().await)
            .read_file("s1")
            .await
            .unwrap();
        assert!(matches!(content, FileContent::Exported { exported_as: "text/csv", .. }));
    }

    #[tokio::test]
    async fn read_unsupported_workspace_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/f1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(
                "f1",
                "Survey",
                "application/vnd.google-apps.form",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let content = client(&server, authorized_store().await)
            .read_file("f1")
            .await
            .unwrap();
        match content {
            FileContent::Unsupported { file } => {
                assert!(file.web_view_link.unwrap().contains("f1"));
            }
            other => panic!("expected Unsupported, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_text_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/t1"))
            .and(query_param("fields", FILE_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(
                "t1",
                "config.json",
                "application/json",
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/t1"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"k":1}"#))
            .mount(&server)
            .await;

        let content = client(&server, authorized_store().await)
            .read_file("t1")
            .await
            .unwrap();
        assert_eq!(
            content,
            FileContent::Text {
                file: serde_json::from_value(meta("t1", "config.json", "application/json"))
                    .unwrap(),
                content: r#"{"k":1}"#.into(),
            }
        );
    }

    #[tokio::test]
    async fn read_binary_file_returns_metadata_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/p1"))
            .and(query_param("fields", FILE_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(
                "p1",
                "scan.pdf",
                "application/pdf",
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/p1"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x25, 0x50, 0xff, 0x00]))
            .mount(&server)
            .await;

        let content = client(&server, authorized_store().await)
            .read_file("p1")
            .await
            .unwrap();
        assert!(matches!(content, FileContent::Binary { .. }));
        assert_eq!(content.file().name, "scan.pdf");
    }

    #[tokio::test]
    async fn text_mime_with_invalid_utf8_is_binary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/x1"))
            .and(query_param("fields", FILE_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(
                "x1",
                "latin1.txt",
                "text/plain",
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/x1"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xe9, 0x74, 0xe9]))
            .mount(&server)
            .await;

        let content = client(&server, authorized_store().await)
            .read_file("x1")
            .await
            .unwrap();
        assert!(matches!(content, FileContent::Binary { .. }));
    }

    #[tokio::test]
    async fn drive_error_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "File not found: missing."}
            })))
            .mount(&server)
            .await;

        let err = client(&server, authorized_store().await)
            .read_file("missing")
            .await
            .unwrap_err();
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "File not found: missing.");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_listing_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server, authorized_store().await)
            .list_files(None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
