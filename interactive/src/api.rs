use std::sync::Arc;

use gloo_net::http::{Request, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use vrcface_shared::ApiResponse;
use wasm_bindgen::JsCast;
use web_sys::window;

const TOKEN_KEY: &str = "vrcface_token";

/// Source of the bearer token attached to API requests.
pub trait CredentialProvider: Send + Sync {
    fn token(&self) -> Option<String>;
    fn clear(&self);
}

/// Token written by the identity provider: local storage first, then cookie.
pub struct BrowserCredentials;

impl BrowserCredentials {
    fn from_storage() -> Option<String> {
        window()?
            .local_storage()
            .ok()??
            .get_item(TOKEN_KEY)
            .ok()?
            .filter(|t| !t.is_empty())
    }

    fn html_document() -> Option<web_sys::HtmlDocument> {
        window()?.document()?.dyn_into().ok()
    }

    fn from_cookie() -> Option<String> {
        let cookies = Self::html_document()?.cookie().ok()?;
        cookie_value(&cookies, TOKEN_KEY)
    }
}

impl CredentialProvider for BrowserCredentials {
    fn token(&self) -> Option<String> {
        Self::from_storage().or_else(Self::from_cookie)
    }

    fn clear(&self) {
        if let Some(storage) = window()
            .and_then(|w| w.local_storage().ok())
            .flatten()
        {
            let _ = storage.remove_item(TOKEN_KEY);
        }
        if let Some(doc) = Self::html_document() {
            let _ = doc.set_cookie(&format!("{TOKEN_KEY}=; Max-Age=0; path=/"));
        }
    }
}

pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Reads `<meta name=... content=...>` set by the page template.
pub fn meta_content(name: &str) -> Option<String> {
    let document = window()?.document()?;
    let el = document
        .query_selector(&format!("meta[name='{name}']"))
        .ok()
        .flatten()?;
    el.get_attribute("content").filter(|url| !url.is_empty())
}

#[derive(Clone)]
pub struct ApiClient {
    base: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    pub fn new(base: impl Into<String>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            base: base.into(),
            credentials,
        }
    }

    pub fn from_page() -> Self {
        let base = meta_content("vrcface-api").unwrap_or_else(|| "http://localhost:8080".to_string());
        Self::new(base, Arc::new(BrowserCredentials))
    }

    pub fn has_token(&self) -> bool {
        self.credentials.token().is_some()
    }

    pub fn clear_token(&self) {
        self.credentials.clear();
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.credentials.token() {
            Some(token) => req.header("Authorization", &format!("Bearer {token}")),
            None => req,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, String> {
        let req = self.authorize(Request::get(&self.url(path)));
        let resp = req.send().await.map_err(|e| e.to_string())?;
        unwrap_envelope(resp).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, String> {
        let req = self
            .authorize(Request::post(&self.url(path)))
            .json(body)
            .map_err(|e| e.to_string())?;
        let resp = req.send().await.map_err(|e| e.to_string())?;
        unwrap_envelope(resp).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, String> {
        let req = self
            .authorize(Request::put(&self.url(path)))
            .json(body)
            .map_err(|e| e.to_string())?;
        let resp = req.send().await.map_err(|e| e.to_string())?;
        unwrap_envelope(resp).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), String> {
        let req = self.authorize(Request::delete(&self.url(path)));
        let resp = req.send().await.map_err(|e| e.to_string())?;
        unwrap_envelope::<serde_json::Value>(resp).await.map(|_| ())
    }
}

/// Surfaces the server's message on failure.
async fn unwrap_envelope<T: DeserializeOwned>(resp: Response) -> Result<T, String> {
    let status = resp.status();
    match resp.json::<ApiResponse<T>>().await {
        Ok(envelope) if envelope.success => envelope.data.ok_or(envelope.message),
        Ok(envelope) => Err(envelope.message),
        Err(_) => Err(format!("API error: {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lookup_by_name() {
        let jar = "theme=dark; vrcface_token=abc.def.ghi; lang=ja";
        assert_eq!(cookie_value(jar, TOKEN_KEY).as_deref(), Some("abc.def.ghi"));
        assert_eq!(cookie_value(jar, "missing"), None);
        assert_eq!(cookie_value("vrcface_token=", TOKEN_KEY), None);
    }
}
