use std::sync::Arc;
use std::time::Duration;

use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::{CONTENT_TYPE, HeaderName};
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::{AdapterError, AdapterResult};

type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

/// HTTPS client that posts JSON and decodes JSON, shared by the adapters.
#[derive(Clone)]
pub(crate) struct JsonClient {
    client: HyperClient,
    timeout: Duration,
}

impl JsonClient {
    pub(crate) fn new(timeout: Duration) -> Self {
        let mut roots = RootCertStore::empty();
        roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
            OwnedTrustAnchor::from_subject_spki_name_constraints(
                anchor.subject,
                anchor.spki,
                anchor.name_constraints,
            )
        }));

        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let mut http = HttpConnector::new();
        http.enforce_http(false);

        let connector = HttpsConnector::from((http, Arc::new(config)));

        Self {
            client: Client::builder().build::<_, Body>(connector),
            timeout,
        }
    }

    /// Posts `payload` to `endpoint` and decodes the JSON reply.
    ///
    /// `provider` only labels error messages.
    pub(crate) async fn post<P, R>(
        &self,
        provider: &str,
        endpoint: Uri,
        headers: &[(HeaderName, String)],
        payload: &P,
    ) -> AdapterResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let body = serde_json::to_vec(payload).map_err(|err| {
            AdapterError::invalid_request(format!("failed to encode {provider} request: {err}"))
        })?;

        let mut builder = Request::post(endpoint).header(CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(name, value.as_str());
        }
        let request = builder.body(Body::from(body)).map_err(|err| {
            AdapterError::transport(format!("failed to build {provider} request: {err}"))
        })?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| AdapterError::transport(format!("{provider} request timed out")))?
            .map_err(|err| AdapterError::transport(format!("{provider} request failed: {err}")))?;

        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.map_err(|err| {
            AdapterError::transport(format!("failed to read {provider} response: {err}"))
        })?;

        if status.as_u16() == 429 {
            return Err(AdapterError::RateLimited { retry_after: None });
        }

        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes);
            return Err(AdapterError::response(format!(
                "{provider} returned {status}: {reason}"
            )));
        }

        serde_json::from_slice(&bytes).map_err(|err| {
            AdapterError::response(format!("failed to decode {provider} response: {err}"))
        })
    }
}

/// Normalises a base URL to carry a scheme and a trailing slash.
pub(crate) fn sanitize_base_url(provider: &str, input: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(format!(
            "{provider} base URL must start with http:// or https://"
        )));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>().map_err(|err| {
        AdapterError::configuration(format!("invalid {provider} base URL: {err}"))
    })?;
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_requires_scheme() {
        let err = sanitize_base_url("Gemini", "generativelanguage.googleapis.com")
            .expect_err("missing scheme should error");
        assert!(matches!(err, AdapterError::Configuration { .. }));
    }

    #[test]
    fn sanitize_appends_trailing_slash() {
        let base = sanitize_base_url("OpenAI", " https://example.com/openai ").unwrap();
        assert_eq!(base, "https://example.com/openai/");
    }
}
