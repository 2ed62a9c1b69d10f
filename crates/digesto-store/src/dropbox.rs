//! Dropbox HTTP API v2 adapter.
//!
//! Authenticates with a long-lived refresh token and keeps the short-lived
//! access token until shortly before it expires, instead of exchanging it on
//! every call.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::pager::{ListPage, collect_pages};
use crate::remote::normalize_path;
use crate::{EntryKind, ListEntry, RemoteStore, StoreError};

const OAUTH_TOKEN_URL: &str = "https://api.dropbox.com/oauth2/token";
const API_URL: &str = "https://api.dropboxapi.com/2";
const CONTENT_URL: &str = "https://content.dropboxapi.com/2";

/// Refresh the access token this long before Dropbox says it expires.
const EXPIRY_MARGIN_SECS: i64 = 60;
/// Dropbox short-lived tokens last four hours when `expires_in` is absent.
const DEFAULT_EXPIRES_IN_SECS: i64 = 4 * 60 * 60;

/// App credentials for the OAuth refresh-token grant.
#[derive(Clone)]
pub struct DropboxCredentials {
    pub app_key: String,
    pub app_secret: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for DropboxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxCredentials")
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// [`RemoteStore`] over a Dropbox app folder.
pub struct DropboxStore {
    client: reqwest::Client,
    credentials: DropboxCredentials,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Serialize)]
struct PathArg<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: &'static str,
    autorename: bool,
    mute: bool,
}

#[derive(Serialize)]
struct CursorArg<'a> {
    cursor: &'a str,
}

#[derive(Deserialize)]
struct ListFolderResponse {
    entries: Vec<DropboxEntry>,
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Deserialize)]
struct DropboxEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
}

impl From<ListFolderResponse> for ListPage {
    fn from(resp: ListFolderResponse) -> Self {
        let entries = resp
            .entries
            .into_iter()
            .map(|e| ListEntry {
                kind: match e.tag.as_str() {
                    "folder" => EntryKind::Folder,
                    "deleted" => EntryKind::Deleted,
                    _ => EntryKind::File,
                },
                name: e.name,
            })
            .collect();
        ListPage {
            entries,
            cursor: resp.cursor,
            has_more: resp.has_more,
        }
    }
}

impl DropboxStore {
    pub fn new(credentials: DropboxCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            token: Mutex::new(None),
        }
    }

    /// A valid access token, exchanging the refresh token only when the
    /// cached one is missing or about to expire.
    async fn access_token(&self) -> Result<String, StoreError> {
        let mut slot = self.token.lock().await;
        let now = Utc::now();
        if let Some(cached) = slot.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(cached.access_token.clone());
        }

        info!("refreshing Dropbox access token");
        let resp = self
            .client
            .post(OAUTH_TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("client_id", self.credentials.app_key.as_str()),
                ("client_secret", self.credentials.app_secret.as_str()),
            ])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        let token: TokenResponse = resp.json().await?;
        let cached = CachedToken {
            access_token: token.access_token,
            expires_at: token_expiry(now, token.expires_in),
        };
        let access = cached.access_token.clone();
        *slot = Some(cached);
        Ok(access)
    }

    async fn forget_token(&self) {
        *self.token.lock().await = None;
    }

    /// Send an authorised request, refreshing the token once on a 401.
    async fn send<F>(&self, build: F) -> Result<reqwest::Response, StoreError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.access_token().await?;
        let resp = build(&token).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        debug!("access token rejected, retrying with a fresh one");
        self.forget_token().await;
        let token = self.access_token().await?;
        Ok(build(&token).send().await?)
    }

    async fn list_page(&self, folder: &str) -> Result<ListPage, StoreError> {
        let url = format!("{API_URL}/files/list_folder");
        let resp = self
            .send(|token| {
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .json(&PathArg { path: folder })
            })
            .await?;
        match classify(resp).await? {
            Reply::Ok(resp) => Ok(resp.json::<ListFolderResponse>().await?.into()),
            Reply::NotFound => Ok(ListPage::default()),
        }
    }

    async fn continue_page(&self, cursor: String) -> Result<ListPage, StoreError> {
        let url = format!("{API_URL}/files/list_folder/continue");
        let resp = self
            .send(|token| {
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .json(&CursorArg { cursor: &cursor })
            })
            .await?;
        match classify(resp).await? {
            Reply::Ok(resp) => Ok(resp.json::<ListFolderResponse>().await?.into()),
            Reply::NotFound => Err(StoreError::Other(
                "listing cursor refers to a folder that no longer exists".into(),
            )),
        }
    }
}

#[async_trait]
impl RemoteStore for DropboxStore {
    async fn list(&self, folder: &str) -> Result<Vec<ListEntry>, StoreError> {
        let folder = normalize_path(folder)?;
        let first = self.list_page(&folder).await?;
        let entries = collect_pages(first, |cursor| self.continue_page(cursor)).await?;
        info!(folder = %folder, count = entries.len(), "listed Dropbox folder");
        Ok(entries)
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = normalize_path(path)?;
        let arg = api_arg(&PathArg { path: &path })?;
        let url = format!("{CONTENT_URL}/files/download");
        let resp = self
            .send(|token| {
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .header("Dropbox-API-Arg", arg.as_str())
            })
            .await?;
        match classify(resp).await? {
            Reply::Ok(resp) => Ok(Some(resp.bytes().await?.to_vec())),
            Reply::NotFound => Ok(None),
        }
    }

    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = normalize_path(path)?;
        let arg = api_arg(&UploadArg {
            path: &path,
            mode: "overwrite",
            autorename: false,
            mute: true,
        })?;
        let url = format!("{CONTENT_URL}/files/upload");
        let resp = self
            .send(|token| {
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .header("Dropbox-API-Arg", arg.as_str())
                    .header("Content-Type", "application/octet-stream")
                    .body(bytes.clone())
            })
            .await?;
        match classify(resp).await? {
            Reply::Ok(_) => {
                debug!(path = %path, bytes = bytes.len(), "uploaded to Dropbox");
                Ok(())
            }
            Reply::NotFound => Err(StoreError::Server {
                status: 409,
                body: format!("upload target not found: {path}"),
            }),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let path = normalize_path(path)?;
        let url = format!("{API_URL}/files/delete_v2");
        let resp = self
            .send(|token| {
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .json(&PathArg { path: &path })
            })
            .await?;
        match classify(resp).await? {
            Reply::Ok(_) | Reply::NotFound => Ok(()),
        }
    }
}

enum Reply {
    Ok(reqwest::Response),
    NotFound,
}

/// Split a response into success, a `not_found` lookup error, or a failure.
async fn classify(resp: reqwest::Response) -> Result<Reply, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(Reply::Ok(resp));
    }
    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::CONFLICT && is_not_found(&body) {
        return Ok(Reply::NotFound);
    }
    Err(StoreError::Server {
        status: status.as_u16(),
        body,
    })
}

/// Dropbox reports missing paths as a 409 whose summary mentions `not_found`.
fn is_not_found(body: &str) -> bool {
    body.contains("not_found")
}

fn token_expiry(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let secs = expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    now + Duration::seconds((secs - EXPIRY_MARGIN_SECS).max(0))
}

/// Serialise a `Dropbox-API-Arg` header value.
///
/// HTTP headers must be ASCII, so every non-ASCII character is written as a
/// JSON `\uXXXX` escape (surrogate pairs above the BMP).
fn api_arg<T: Serialize>(arg: &T) -> Result<String, StoreError> {
    let json = serde_json::to_string(arg)?;
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut buf = [0u16; 2];
            for unit in ch.encode_utf16(&mut buf) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_folder_response_to_page() {
        let json = r#"{
            "entries": [
                {".tag": "file", "name": "594.json", "id": "id:a"},
                {".tag": "folder", "name": "old", "id": "id:b"},
                {".tag": "deleted", "name": "gone.json"}
            ],
            "cursor": "AAF",
            "has_more": true
        }"#;
        let resp: ListFolderResponse = serde_json::from_str(json).unwrap();
        let page: ListPage = resp.into();
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.entries[0], ListEntry::file("594.json"));
        assert_eq!(page.entries[1].kind, EntryKind::Folder);
        assert_eq!(page.entries[2].kind, EntryKind::Deleted);
        assert_eq!(page.cursor.as_deref(), Some("AAF"));
        assert!(page.has_more);
    }

    #[test]
    fn api_arg_escapes_non_ascii() {
        let arg = api_arg(&PathArg {
            path: "/data/telaraña.csv",
        })
        .unwrap();
        assert_eq!(arg, r#"{"path":"/data/telara\u00f1a.csv"}"#);
        assert!(arg.is_ascii());
    }

    #[test]
    fn upload_arg_shape() {
        let arg = api_arg(&UploadArg {
            path: "/fichas_json/1.json",
            mode: "overwrite",
            autorename: false,
            mute: true,
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&arg).unwrap();
        assert_eq!(value["mode"], "overwrite");
        assert_eq!(value["autorename"], false);
    }

    #[test]
    fn token_expiry_keeps_margin() {
        let now = Utc::now();
        assert_eq!(token_expiry(now, Some(14_400)), now + Duration::seconds(14_340));
        assert_eq!(token_expiry(now, Some(10)), now);
        assert_eq!(
            token_expiry(now, None),
            now + Duration::seconds(DEFAULT_EXPIRES_IN_SECS - EXPIRY_MARGIN_SECS)
        );
    }

    #[test]
    fn cached_token_freshness() {
        let now = Utc::now();
        let token = CachedToken {
            access_token: "t".into(),
            expires_at: now + Duration::seconds(5),
        };
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::seconds(5)));
    }

    #[test]
    fn not_found_detection() {
        assert!(is_not_found(
            r#"{"error_summary": "path/not_found/..", "error": {".tag": "path"}}"#
        ));
        assert!(!is_not_found(
            r#"{"error_summary": "path/conflict/file/.."}"#
        ));
    }

    #[test]
    fn credentials_debug_redacts_secrets() {
        let creds = DropboxCredentials {
            app_key: "key".into(),
            app_secret: "secret".into(),
            refresh_token: "refresh".into(),
        };
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("key"));
        assert!(!dbg.contains("\"secret\""));
        assert!(!dbg.contains("\"refresh\""));
    }
}
