//! Request/response data handed over by the networking layer.
//!
//! These types are plain data: the transport fills them in after an exchange
//! finishes (or is redirected) and the archiver only reads them.

use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

/// Identity of one in-flight operation. Redirect hops and the final
/// completion of the same logical exchange share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(pub u64);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single header line, kept with its original casing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// First header named `name` (case-insensitive).
pub fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: String,
    /// Defaults to `HTTP/1.1` in the archive when unknown.
    pub http_version: Option<String>,
    pub headers: Vec<Header>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            http_version: None,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Reason phrase as received; the canonical phrase is used when absent.
    pub status_text: Option<String>,
    pub http_version: Option<String>,
    pub headers: Vec<Header>,
    pub body: Option<Vec<u8>>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: None,
            http_version: None,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Captured timing of an exchange. Phases the transport could not measure stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeTiming {
    pub started_at: DateTime<Utc>,
    pub total: Option<Duration>,
    pub blocked: Option<Duration>,
    pub dns: Option<Duration>,
    pub connect: Option<Duration>,
    pub ssl: Option<Duration>,
    pub send: Option<Duration>,
    pub wait: Option<Duration>,
    pub receive: Option<Duration>,
}

impl ExchangeTiming {
    /// Timing with only a start time and total duration known.
    pub fn new(started_at: DateTime<Utc>, total: Duration) -> Self {
        Self {
            total: Some(total),
            ..Self::started(started_at)
        }
    }

    /// Timing with only the start time known.
    pub fn started(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            total: None,
            blocked: None,
            dns: None,
            connect: None,
            ssl: None,
            send: None,
            wait: None,
            receive: None,
        }
    }

    pub fn started_at_system(at: SystemTime) -> Self {
        Self::started(DateTime::<Utc>::from(at))
    }
}

/// How the host application decoded the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Xml,
    PropertyList,
    Image,
    Text,
    Binary,
}

impl ResponseFormat {
    /// Best guess from a `Content-Type` value.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence.starts_with("image/") {
            ResponseFormat::Image
        } else if essence.ends_with("json") {
            ResponseFormat::Json
        } else if essence.contains("plist") {
            ResponseFormat::PropertyList
        } else if essence.ends_with("xml") {
            ResponseFormat::Xml
        } else if essence.starts_with("text/") {
            ResponseFormat::Text
        } else {
            ResponseFormat::Binary
        }
    }
}

/// The negotiated serialization of the response and the value it decoded to,
/// passed to task filters.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseContext {
    pub format: ResponseFormat,
    pub decoded: Option<serde_json::Value>,
}

impl ResponseContext {
    pub fn new(format: ResponseFormat) -> Self {
        Self {
            format,
            decoded: None,
        }
    }
}

/// One finished exchange (success or failure), as reported on completion.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub id: ExchangeId,
    pub request: Request,
    pub response: Option<Response>,
    pub timing: ExchangeTiming,
    /// Transport failure message, if the exchange failed.
    pub failure: Option<String>,
    pub server_ip: Option<IpAddr>,
    /// Connection identifier (e.g. local port) when the transport exposes it.
    pub connection: Option<String>,
    pub context: Option<ResponseContext>,
}

impl Exchange {
    pub fn new(id: ExchangeId, request: Request, response: Response, timing: ExchangeTiming) -> Self {
        Self {
            id,
            request,
            response: Some(response),
            timing,
            failure: None,
            server_ip: None,
            connection: None,
            context: None,
        }
    }

    /// An exchange that never produced a response.
    pub fn failed(
        id: ExchangeId,
        request: Request,
        timing: ExchangeTiming,
        failure: impl Into<String>,
    ) -> Self {
        Self {
            id,
            request,
            response: None,
            timing,
            failure: Some(failure.into()),
            server_ip: None,
            connection: None,
            context: None,
        }
    }

    pub fn with_context(mut self, context: ResponseContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// One redirect hop, forwarded from the transport's redirect hook.
#[derive(Debug, Clone)]
pub struct RedirectNotice {
    pub exchange_id: ExchangeId,
    pub current: Request,
    pub new: Request,
    /// `None` means the hook fired without a redirect; nothing is recorded.
    pub response: Option<Response>,
    pub observed_at: DateTime<Utc>,
}
