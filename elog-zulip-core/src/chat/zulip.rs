//! Zulip REST client.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::{ChatClient, ChatError, StreamMessage};

/// Section of a zuliprc file holding the API login.
const API_SECTION: &str = "api";

/// API login read from a `zuliprc` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZulipRc {
    pub email: String,
    pub key: String,
    /// Server root, with scheme and without trailing slash.
    pub site: String,
}

impl ZulipRc {
    /// Read a zuliprc file.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidConfig`] if the file cannot be read or lacks a key.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let path = path.as_ref();
        let invalid = |reason: String| ChatError::InvalidConfig {
            path: path.to_path_buf(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        Self::parse(&content).map_err(invalid)
    }

    /// Parse the `[api]` section of zuliprc content.
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut section = "";
        let (mut email, mut key, mut site) = (None, None, None);

        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim();
                continue;
            }
            if section != API_SECTION {
                continue;
            }
            let Some((k, v)) = line.split_once('=') else {
                continue;
            };
            let value = Some(v.trim().to_string());
            match k.trim() {
                "email" => email = value,
                "key" => key = value,
                "site" => site = value,
                _ => {}
            }
        }

        let missing = |name: &str| format!("missing '{}' in [{}]", name, API_SECTION);
        Ok(Self {
            email: email.ok_or_else(|| missing("email"))?,
            key: key.ok_or_else(|| missing("key"))?,
            site: normalize_site(&site.ok_or_else(|| missing("site"))?),
        })
    }
}

fn normalize_site(site: &str) -> String {
    let site = site.trim_end_matches('/');
    let site = site.strip_suffix("/api").unwrap_or(site);
    if site.starts_with("http://") || site.starts_with("https://") {
        site.to_string()
    } else {
        format!("https://{}", site)
    }
}

/// Body of every Zulip API response.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    result: String,
    #[serde(default)]
    msg: String,
    uri: Option<String>,
    url: Option<String>,
}

/// Client for the Zulip REST API.
pub struct ZulipClient {
    client: reqwest::Client,
    rc: ZulipRc,
}

impl ZulipClient {
    pub fn new(rc: ZulipRc) -> Self {
        Self {
            client: reqwest::Client::new(),
            rc,
        }
    }

    /// Create a client from a zuliprc file.
    pub fn from_rc_file(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        Ok(Self::new(ZulipRc::load(path)?))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.rc.site, path)
    }

    async fn call(&self, request: reqwest::RequestBuilder) -> Result<ApiResponse, ChatError> {
        let response = request
            .basic_auth(&self.rc.email, Some(&self.rc.key))
            .send()
            .await
            .map_err(|e| ChatError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChatError::RequestFailed(e.to_string()))?;

        let body: ApiResponse = serde_json::from_str(&text).map_err(|_| {
            ChatError::RequestFailed(format!(
                "HTTP {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            ))
        })?;

        if body.result != "success" {
            return Err(ChatError::Rejected(body.msg));
        }
        Ok(body)
    }
}

#[async_trait]
impl ChatClient for ZulipClient {
    async fn send_message(&self, message: &StreamMessage) -> Result<(), ChatError> {
        tracing::info!("sending to #{}>>{}", message.stream, message.topic);

        let form = [
            ("type", "stream"),
            ("to", message.stream.as_str()),
            ("topic", message.topic.as_str()),
            ("content", message.content.as_str()),
        ];
        self.call(self.client.post(self.endpoint("messages")).form(&form))
            .await?;
        Ok(())
    }

    async fn upload_file(&self, name: &str, data: Vec<u8>) -> Result<String, ChatError> {
        let part = reqwest::multipart::Part::bytes(data).file_name(name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let body = self
            .call(self.client.post(self.endpoint("user_uploads")).multipart(form))
            .await?;

        body.url
            .or(body.uri)
            .ok_or_else(|| ChatError::RequestFailed("upload response has no uri".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use mockito::Matcher;

    use super::*;

    fn rc(site: String) -> ZulipRc {
        ZulipRc {
            email: "bot@example.org".to_string(),
            key: "abc123".to_string(),
            site,
        }
    }

    fn auth_header() -> String {
        format!("Basic {}", STANDARD.encode("bot@example.org:abc123"))
    }

    fn message() -> StreamMessage {
        StreamMessage {
            stream: "operation".to_string(),
            topic: "no topic".to_string(),
            content: "hello".to_string(),
        }
    }

    #[test]
    fn test_parse_zuliprc() {
        let rc = ZulipRc::parse(
            "# comment\n[api]\nemail = bot@example.org\nkey=abc123\nsite=chat.example.org/\n\n[other]\nkey=ignored\n",
        )
        .unwrap();
        assert_eq!(rc.email, "bot@example.org");
        assert_eq!(rc.key, "abc123");
        assert_eq!(rc.site, "https://chat.example.org");
    }

    #[test]
    fn test_parse_zuliprc_missing_key() {
        let err = ZulipRc::parse("[api]\nemail=bot@example.org\nsite=https://x").unwrap_err();
        assert!(err.contains("'key'"), "{err}");
    }

    #[test]
    fn test_normalize_site() {
        assert_eq!(normalize_site("http://localhost:9991"), "http://localhost:9991");
        assert_eq!(normalize_site("https://chat.example.org/api/"), "https://chat.example.org");
    }

    #[test]
    fn test_load_missing_file() {
        let err = ZulipRc::load("/nonexistent/zuliprc").unwrap_err();
        assert!(matches!(err, ChatError::InvalidConfig { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("zuliprc-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[api]\nemail=a@b.c\nkey=k\nsite=https://chat.example.org\n").unwrap();

        let rc = ZulipRc::load(&path).unwrap();
        assert_eq!(rc.email, "a@b.c");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_send_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/messages")
            .match_header("authorization", auth_header().as_str())
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("type".into(), "stream".into()),
                Matcher::UrlEncoded("to".into(), "operation".into()),
                Matcher::UrlEncoded("topic".into(), "no topic".into()),
                Matcher::UrlEncoded("content".into(), "hello".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"result":"success","msg":"","id":42}"#)
            .create_async()
            .await;

        let client = ZulipClient::new(rc(server.url()));
        client.send_message(&message()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_message_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/messages")
            .with_status(400)
            .with_body(r#"{"result":"error","msg":"Stream 'operation' does not exist","code":"STREAM_DOES_NOT_EXIST"}"#)
            .create_async()
            .await;

        let client = ZulipClient::new(rc(server.url()));
        let err = client.send_message(&message()).await.unwrap_err();
        match err {
            ChatError::Rejected(msg) => assert!(msg.contains("does not exist")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/messages")
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create_async()
            .await;

        let client = ZulipClient::new(rc(server.url()));
        let err = client.send_message(&message()).await.unwrap_err();
        match err {
            ChatError::RequestFailed(msg) => assert!(msg.starts_with("HTTP 502"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_upload_file() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/user_uploads")
            .match_header("content-type", Matcher::Regex("^multipart/form-data".to_string()))
            .with_status(200)
            .with_body(r#"{"result":"success","msg":"","uri":"/user_uploads/1/ab/plot.png"}"#)
            .create_async()
            .await;

        let client = ZulipClient::new(rc(server.url()));
        let uri = client.upload_file("plot.png", vec![0x89, 0x50]).await.unwrap();
        assert_eq!(uri, "/user_uploads/1/ab/plot.png");

        mock.assert_async().await;
    }
}
