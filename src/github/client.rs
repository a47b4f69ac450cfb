use anyhow::Context;
use bytes::Bytes;
use regex::Regex;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, LINK, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use std::sync::LazyLock;
use tracing as log;

/// One `<target>; param=value; ...` entry of a `Link` header. Targets cannot
/// contain `>`, so commas inside them do not end the entry.
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]*)>((?:\s*;\s*(?:[^;,<"]|"[^"]*")*)*)"#).unwrap());
static LINK_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#";\s*([A-Za-z*-]+)\s*=\s*(?:"([^"]*)"|([^;,\s]*))"#).unwrap()
});

/// Reads the API token from `GITHUB_TOKEN`.
///
/// Unlike most configuration this has no default: every API call needs it,
/// so callers should fail at startup when it is missing.
pub fn token_from_env() -> anyhow::Result<SecretString> {
    match std::env::var("GITHUB_TOKEN") {
        Ok(token) if !token.trim().is_empty() => Ok(token.into()),
        _ => anyhow::bail!("GITHUB_TOKEN is required for authentication"),
    }
}

/// A thin GitHub REST API client.
///
/// Cloning is cheap and shares the underlying connection pool, so a single
/// instance is built at startup and handed to every caller.
#[derive(Clone)]
pub struct GithubClient {
    /// Pre-built `Authorization` header, marked sensitive so it never shows
    /// up in debug output.
    auth: HeaderValue,
    client: Client,
    pub(crate) api_url: String,
}

impl GithubClient {
    pub fn new(token: SecretString, api_url: String) -> anyhow::Result<Self> {
        let mut auth = HeaderValue::from_maybe_shared(format!("token {}", token.expose_secret()))
            .context("GITHUB_TOKEN contains characters not allowed in a header")?;
        auth.set_sensitive(true);
        Ok(GithubClient {
            client: Client::new(),
            auth,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn new_from_env() -> anyhow::Result<Self> {
        Self::new(
            token_from_env()?,
            std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
        )
    }

    async fn send_req(&self, req: RequestBuilder) -> anyhow::Result<(Bytes, HeaderMap)> {
        log::debug!("send_req with {:?}", req);
        let req_dbg = format!("{req:?}");
        let req = req
            .build()
            .with_context(|| format!("building reqwest {req_dbg}"))?;

        let resp = self
            .client
            .execute(req)
            .await
            .with_context(|| format!("failed to send request {req_dbg}"))?;
        let maybe_err = resp.error_for_status_ref().err();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("failed to read response body {req_dbg}"))?;
        if let Some(e) = maybe_err {
            return Err(anyhow::Error::new(e))
                .with_context(|| format!("response: {}", String::from_utf8_lossy(&body)));
        }

        Ok((body, headers))
    }

    pub async fn json<T>(&self, req: RequestBuilder) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let (body, _headers) = self.send_req(req).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetches every page of a list endpoint, following `Link: rel="next"`.
    ///
    /// Only links back into `api_url` are followed, so the token is never
    /// sent anywhere else.
    pub async fn json_paged<T>(&self, url: &str) -> anyhow::Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        while let Some(url) = next {
            let (body, headers) = self.send_req(self.get(&url)).await?;
            let page: Vec<T> = serde_json::from_slice(&body)
                .with_context(|| format!("failed to deserialize page {url}"))?;
            items.extend(page);
            next = next_page_url(&headers);
            if let Some(next) = &next
                && !next.starts_with(&format!("{}/", self.api_url))
            {
                anyhow::bail!(
                    "refusing to follow pagination link {next} outside of {}",
                    self.api_url
                );
            }
        }
        Ok(items)
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        log::trace!("get {:?}", url);
        self.client.get(url).configure(self)
    }

    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        log::trace!("post {:?}", url);
        self.client.post(url).configure(self)
    }
}

/// Extracts the `rel="next"` target from a `Link` response header.
///
/// The header looks like
/// `<https://api.github.com/…?page=2>; rel="next", <…?page=5>; rel="last"`.
fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    LINK_RE.captures_iter(link).find_map(|entry| {
        let is_next = LINK_PARAM_RE.captures_iter(&entry[2]).any(|param| {
            let value = param.get(2).or_else(|| param.get(3)).map_or("", |v| v.as_str());
            param[1].eq_ignore_ascii_case("rel")
                && value.split_ascii_whitespace().any(|rel| rel == "next")
        });
        is_next.then(|| entry[1].trim().to_string())
    })
}

trait RequestSend: Sized {
    fn configure(self, g: &GithubClient) -> Self;
}

impl RequestSend for RequestBuilder {
    fn configure(self, g: &GithubClient) -> RequestBuilder {
        self.header(USER_AGENT, "team-reviewers")
            .header(ACCEPT, "application/vnd.github+json")
            .header(AUTHORIZATION, g.auth.clone())
    }
}
