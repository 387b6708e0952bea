pub mod error;
pub mod types;

pub use error::{Result, SearchAdError};
pub use types::{KeywordStat, KeywordToolResponse, KeywordVolume, QueryCount};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

const BASE_URL: &str = "https://api.searchad.naver.com";

const KEYWORD_TOOL_PATH: &str = "/keywordstool";

type HmacSha256 = Hmac<Sha256>;

pub struct SearchAdClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    customer_id: String,
}

impl SearchAdClient {
    pub fn new(api_key: String, secret_key: String, customer_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
            api_key,
            secret_key,
            customer_id,
        }
    }

    /// Point the client at a different host (tests, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Fetch related-keyword statistics for a hint keyword.
    pub async fn keyword_tool(&self, hint: &str) -> Result<KeywordToolResponse> {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = sign(&timestamp, "GET", KEYWORD_TOOL_PATH, &self.secret_key)?;
        let url = format!("{}{}", self.base_url, KEYWORD_TOOL_PATH);

        let resp = self
            .client
            .get(&url)
            .query(&[("hintKeywords", hint), ("showDetail", "1")])
            .header("X-Timestamp", &timestamp)
            .header("X-API-KEY", &self.api_key)
            .header("X-Customer", &self.customer_id)
            .header("X-Signature", signature)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchAdError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Monthly volume for exactly `keyword`. Returns `None` when the tool
    /// does not list the keyword among its related rows.
    pub async fn keyword_volume(&self, keyword: &str) -> Result<Option<KeywordVolume>> {
        let hint = compact_keyword(keyword);
        if hint.is_empty() {
            return Ok(None);
        }

        let response = self.keyword_tool(&hint).await?;
        tracing::debug!(
            keyword,
            rows = response.keyword_list.len(),
            "Keyword tool responded"
        );

        let wanted = hint.to_lowercase();
        Ok(response
            .keyword_list
            .iter()
            .find(|stat| compact_keyword(&stat.rel_keyword).to_lowercase() == wanted)
            .map(KeywordVolume::from))
    }
}

/// The keyword tool rejects hints containing whitespace.
pub fn compact_keyword(keyword: &str) -> String {
    keyword.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Request signature: base64(HMAC-SHA256(secret, "{timestamp}.{method}.{path}")).
pub fn sign(timestamp: &str, method: &str, path: &str, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SearchAdError::Signing(e.to_string()))?;
    mac.update(format!("{timestamp}.{method}.{path}").as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SearchAdClient {
        SearchAdClient::new("key".into(), "secret".into(), "1234".into())
            .with_base_url(&server.uri())
    }

    #[test]
    fn signature_is_stable_and_base64_sha256() {
        let a = sign("1700000000000", "GET", "/keywordstool", "secret").unwrap();
        let b = sign("1700000000000", "GET", "/keywordstool", "secret").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 44);
        let c = sign("1700000000001", "GET", "/keywordstool", "secret").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn compact_keyword_strips_all_whitespace() {
        assert_eq!(compact_keyword(" 사회 복지사 2급 "), "사회복지사2급");
    }

    #[tokio::test]
    async fn volume_for_exact_keyword_row() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keywordstool"))
            .and(query_param("hintKeywords", "사회복지사2급"))
            .and(query_param("showDetail", "1"))
            .and(header_exists("X-Signature"))
            .and(header_exists("X-Timestamp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keywordList": [
                    { "relKeyword": "사회복지사1급", "monthlyPcQcCnt": 10, "monthlyMobileQcCnt": 20 },
                    { "relKeyword": "사회복지사2급", "monthlyPcQcCnt": 3400, "monthlyMobileQcCnt": 18100 }
                ]
            })))
            .mount(&server)
            .await;

        let volume = client_for(&server)
            .keyword_volume("사회복지사 2급")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(volume.total, Some(21500));
    }

    #[tokio::test]
    async fn unlisted_keyword_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keywordstool"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "keywordList": [] })),
            )
            .mount(&server)
            .await;

        let volume = client_for(&server).keyword_volume("없는키워드").await.unwrap();
        assert!(volume.is_none());
    }

    #[tokio::test]
    async fn api_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keywordstool"))
            .respond_with(ResponseTemplate::new(403).set_body_string("invalid signature"))
            .mount(&server)
            .await;

        let err = client_for(&server).keyword_volume("키워드").await.unwrap_err();
        assert!(matches!(err, SearchAdError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keywordstool"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).keyword_volume("키워드").await.unwrap_err();
        assert!(matches!(err, SearchAdError::Parse(_)));
    }
}
