use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use super::wire::{has_header, host_header_value, request_bytes, response_head_bytes};
use super::{Error, HttpRequest, HttpResponse, Result};

/// Shared by every VU of a run. Connections are pooled per host by hyper.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpConnector, Full<Bytes>>,
    request_timeout: Option<Duration>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // OS-level TCP connect timeouts run to tens of seconds; unreachable targets must
        // surface as `connect` errors well inside a short run.
        Self::new(Some(Duration::from_secs(3)), Some(Duration::from_secs(60)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>, request_timeout: Option<Duration>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(connect_timeout);
        connector.set_nodelay(true);

        let inner = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            inner,
            request_timeout,
        }
    }

    /// Estimated request size even when the send fails later, so `data_sent` reflects attempts.
    pub(crate) fn estimate_sent(req: &HttpRequest) -> u64 {
        url::Url::parse(&req.url)
            .ok()
            .and_then(|parsed| {
                request_bytes(&req.method, &parsed, &req.headers, req.body.len() as u64).ok()
            })
            .unwrap_or(0)
    }

    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let timeout = req.timeout.or(self.request_timeout);
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if parsed.scheme() != "http" {
            return Err(Error::OnlyHttpSupported(req.url));
        }

        let bytes_sent = request_bytes(&req.method, &parsed, &req.headers, req.body.len() as u64)?;

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::builder().method(req.method).uri(uri);

        // Implicit headers are made explicit so byte accounting matches what is sent.
        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            builder = builder.header(http::header::HOST, host);
        }
        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }

        for (k, v) in req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(&v)?;
            builder = builder.header(name, value);
        }

        let req: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;

        let exchange = async {
            let res: hyper::Response<Incoming> = self.inner.request(req).await?;
            let (parts, body) = res.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, Error>((parts, body))
        };

        // The timeout covers the whole exchange, body included.
        let (parts, body) = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| Error::Timeout(timeout))??,
            None => exchange.await?,
        };

        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in parts.headers.iter() {
            let key = name.as_str().to_ascii_lowercase();
            let v = String::from_utf8_lossy(value.as_bytes()).into_owned();
            merged
                .entry(key)
                .and_modify(|cur| {
                    if !cur.is_empty() {
                        cur.push_str(", ");
                    }
                    cur.push_str(&v);
                })
                .or_insert(v);
        }

        let head_bytes = response_head_bytes(parts.version, parts.status, &parts.headers);
        let bytes_received = head_bytes.saturating_add(body.len() as u64);

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            body,
            headers: merged.into_iter().collect(),
            duration: Duration::ZERO,
            bytes_sent,
            bytes_received,
            error: None,
        })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}
