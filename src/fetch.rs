//! A browser-less embedder that fetches pages over HTTP.
//!
//! Each mount runs a blocking GET on its own worker thread and reports back
//! through the mount's one-shot signal, mirroring what a real frame would do:
//!
//! - network failures and error statuses fire the error signal
//! - a response whose framing policy (`X-Frame-Options`, CSP
//!   `frame-ancestors`) refuses embedding never signals and leaves an empty
//!   document behind, which the inspection timer then reports as blocked
//! - anything else fires the load signal
//!
//! Inspection follows browser isolation rules: a document from another origin
//! than the preview host cannot be read.

use crate::embed::{DocumentAccess, Embedder, LoadSignal, MountRequest, MountedFrame};
use crate::frame::Inspection;
use crate::{Error, PreviewConfig, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, CONTENT_SECURITY_POLICY, USER_AGENT};
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use url::{Origin, Url};

const X_FRAME_OPTIONS: &str = "x-frame-options";

/// Embeds pages by fetching them with a blocking HTTP client
#[derive(Debug, Clone)]
pub struct FetchEmbedder {
    user_agent: String,
    timeout: Duration,
    headers: HashMap<String, String>,
    host_origin: Option<Origin>,
}

impl FetchEmbedder {
    pub fn new(config: &PreviewConfig) -> Result<Self> {
        let host_origin = match &config.host_origin {
            Some(origin) => Some(
                Url::parse(origin)
                    .map_err(|e| Error::ConfigError(format!("host_origin {}: {}", origin, e)))?
                    .origin(),
            ),
            None => None,
        };
        Ok(Self {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            headers: config.headers.clone(),
            host_origin,
        })
    }
}

/// What a frame's document looks like from the embedding page
#[derive(Debug, Clone, PartialEq, Eq)]
enum FrameDocument {
    /// Navigation has not committed: the initial blank document
    Initial,
    /// Embedding was refused; the frame shows nothing
    Refused,
    Page { origin: Origin, html: String },
}

struct FetchedDocument {
    host_origin: Option<Origin>,
    document: Arc<Mutex<FrameDocument>>,
}

impl DocumentAccess for FetchedDocument {
    fn inspect(&self) -> Inspection {
        let document = match self.document.lock() {
            Ok(document) => document.clone(),
            Err(_) => return Inspection::AccessDenied,
        };
        match document {
            FrameDocument::Initial | FrameDocument::Refused => Inspection::Empty,
            FrameDocument::Page { origin, html } => {
                if self.host_origin.as_ref() != Some(&origin) {
                    return Inspection::AccessDenied;
                }
                if body_is_empty(&html) {
                    Inspection::Empty
                } else {
                    Inspection::HasContent
                }
            }
        }
    }
}

enum Fetched {
    Page { origin: Origin, html: String },
    Refused(String),
}

impl Embedder for FetchEmbedder {
    fn mount(&self, request: &MountRequest) -> Result<MountedFrame> {
        let (tx, rx) = oneshot::channel();
        let document = Arc::new(Mutex::new(FrameDocument::Initial));

        let worker = self.clone();
        let shared = document.clone();
        let url = request.url.clone();
        let device = request.device.id;
        let viewport_width = request.viewport.frame_width;

        std::thread::Builder::new()
            .name(format!("rfpreview-{}", device))
            .spawn(move || {
                // The blocking client must be built and dropped off the async runtime
                let outcome = worker.fetch(&url, viewport_width);
                match outcome {
                    Ok(Fetched::Page { origin, html }) => {
                        log::debug!("{}: fetched {} bytes from {}", device, html.len(), url);
                        if let Ok(mut doc) = shared.lock() {
                            *doc = FrameDocument::Page { origin, html };
                        }
                        let _ = tx.send(LoadSignal::Loaded);
                    }
                    Ok(Fetched::Refused(reason)) => {
                        log::info!("{}: {} refuses embedding ({})", device, url, reason);
                        if let Ok(mut doc) = shared.lock() {
                            *doc = FrameDocument::Refused;
                        }
                        drop(tx);
                    }
                    Err(err) => {
                        log::info!("{}: {} failed: {}", device, url, err);
                        let _ = tx.send(LoadSignal::Failed(err.to_string()));
                    }
                }
            })
            .map_err(|e| Error::LoadError(format!("Failed to spawn fetch worker: {}", e)))?;

        Ok(MountedFrame {
            signal: rx,
            document: Box::new(FetchedDocument {
                host_origin: self.host_origin.clone(),
                document,
            }),
        })
    }
}

impl FetchEmbedder {
    fn fetch(&self, url: &Url, viewport_width: u32) -> Result<Fetched> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        let mut builder = client
            .get(url.as_str())
            .header(USER_AGENT, self.user_agent.clone())
            .header("Viewport-Width", viewport_width.to_string());
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder.send().map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.timeout.as_millis() as u64)
            } else {
                Error::LoadError(format!("HTTP GET failed: {}", e))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::LoadError(format!("HTTP {}", status)));
        }

        let origin = resp.url().origin();
        if let Some(reason) = framing_refusal(resp.headers(), &origin, self.host_origin.as_ref()) {
            return Ok(Fetched::Refused(reason));
        }

        let html = resp
            .text()
            .map_err(|e| Error::LoadError(format!("Failed to read response body: {}", e)))?;
        Ok(Fetched::Page { origin, html })
    }
}

/// Reason the response forbids being framed by `host`, if it does
///
/// CSP `frame-ancestors` wins over `X-Frame-Options` when both are present.
fn framing_refusal(headers: &HeaderMap, target: &Origin, host: Option<&Origin>) -> Option<String> {
    let same_origin = host == Some(target);

    let ancestors = headers
        .get_all(CONTENT_SECURITY_POLICY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|policy| policy.split(';'))
        .map(str::trim)
        .find_map(|directive| {
            let mut parts = directive.split_whitespace();
            match parts.next() {
                Some(name) if name.eq_ignore_ascii_case("frame-ancestors") => {
                    Some(parts.map(str::to_string).collect::<Vec<_>>())
                }
                _ => None,
            }
        });

    if let Some(sources) = ancestors {
        let allowed = sources.iter().any(|source| match source.as_str() {
            "*" => true,
            "'none'" => false,
            "'self'" => same_origin,
            other => host.map_or(false, |h| source_matches(other, h)),
        });
        return if allowed {
            None
        } else {
            Some(format!("frame-ancestors {}", sources.join(" ")))
        };
    }

    let xfo = headers
        .get(X_FRAME_OPTIONS)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase())?;
    match xfo.as_str() {
        "deny" => Some("X-Frame-Options: DENY".to_string()),
        "sameorigin" if !same_origin => Some("X-Frame-Options: SAMEORIGIN".to_string()),
        _ => None,
    }
}

/// Match a CSP host source (`https://a.example`, `a.example:8080`, `https:`)
fn source_matches(source: &str, host: &Origin) -> bool {
    let serialized = host.ascii_serialization();
    if let Some(scheme) = source.strip_suffix(':') {
        return serialized.starts_with(&format!("{}://", scheme));
    }
    if source.contains("://") {
        return serialized == source.trim_end_matches('/');
    }
    serialized
        .split_once("://")
        .map_or(false, |(_, authority)| authority == source)
}

fn body_is_empty(html: &str) -> bool {
    let document = Html::parse_document(html);
    let body = match Selector::parse("body") {
        Ok(selector) => selector,
        Err(_) => return html.trim().is_empty(),
    };
    document
        .select(&body)
        .next()
        .map_or(true, |b| b.inner_html().trim().is_empty())
}
