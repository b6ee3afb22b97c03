//! Build HAR entries from completed exchanges and redirect hops.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::EntryBuildError;
use crate::exchange::{self, Exchange, ExchangeTiming, Header};

use super::content::{encode_body, omitted_comment, response_content};
use super::cookie::{request_cookies, response_cookies};
use super::model::{Cache, Content, Entry, NameValue, PostData, Request, Response, Timings};
use super::status::canonical_reason;

const DEFAULT_HTTP_VERSION: &str = "HTTP/1.1";
const UNKNOWN: f64 = -1.0;

/// A redirect hop waiting to be turned into an entry.
#[derive(Debug, Clone)]
pub struct Hop {
    pub current: exchange::Request,
    pub new: exchange::Request,
    pub response: exchange::Response,
    pub observed_at: DateTime<Utc>,
}

/// Entry for a finished exchange. `started_at` overrides the exchange start
/// (used after redirect hops so the final entry begins where the last hop ended).
pub fn build_entry(
    ex: &Exchange,
    started_at: Option<DateTime<Utc>>,
    max_body_bytes: usize,
) -> Result<Entry, EntryBuildError> {
    let request = build_request(&ex.request, max_body_bytes)?;
    let response = match &ex.response {
        Some(resp) => {
            let mut r = build_response(resp, max_body_bytes)?;
            r.error = ex.failure.clone();
            r
        }
        None => failed_response(&request.http_version, ex.failure.as_deref()),
    };

    let full_time = total_ms(&ex.timing);
    let (started, time) = match started_at {
        Some(at) if at > ex.timing.started_at => {
            let skipped = elapsed_ms(ex.timing.started_at, at);
            (at, (full_time - skipped).max(0.0))
        }
        _ => (ex.timing.started_at, full_time),
    };

    Ok(Entry {
        started_date_time: started,
        time,
        request,
        response,
        cache: Cache::default(),
        timings: build_timings(&ex.timing, time),
        server_ip_address: ex.server_ip.map(|ip| ip.to_string()),
        connection: ex.connection.clone(),
        comment: None,
    })
}

/// Entry for one redirect hop, spanning `started_at` to the hop's observation time.
pub fn build_hop_entry(
    hop: &Hop,
    started_at: DateTime<Utc>,
    max_body_bytes: usize,
) -> Result<Entry, EntryBuildError> {
    let request = build_request(&hop.current, max_body_bytes)?;
    let mut response = build_response(&hop.response, max_body_bytes)?;
    response.redirect_url = hop.new.url.clone();

    let time = elapsed_ms(started_at, hop.observed_at);
    let timing = ExchangeTiming::started(started_at);
    Ok(Entry {
        started_date_time: started_at,
        time,
        request,
        response,
        cache: Cache::default(),
        timings: build_timings(&timing, time),
        server_ip_address: None,
        connection: None,
        comment: None,
    })
}

fn build_request(req: &exchange::Request, max_body_bytes: usize) -> Result<Request, EntryBuildError> {
    if !is_token(&req.method) {
        return Err(EntryBuildError::InvalidMethod {
            method: req.method.clone(),
        });
    }
    validate_headers(&req.headers)?;
    let url = url::Url::parse(&req.url).map_err(|source| EntryBuildError::InvalidUrl {
        url: req.url.clone(),
        source,
    })?;

    let http_version = req
        .http_version
        .clone()
        .unwrap_or_else(|| DEFAULT_HTTP_VERSION.to_string());
    let target = match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    };
    let start_line = format!("{} {} {}", req.method, target, http_version);

    Ok(Request {
        method: req.method.clone(),
        url: req.url.clone(),
        headers_size: header_block_size(&start_line, &req.headers),
        http_version,
        cookies: request_cookies(&req.headers),
        headers: name_values(&req.headers),
        query_string: url
            .query_pairs()
            .map(|(k, v)| NameValue::new(k, v))
            .collect(),
        post_data: req
            .body
            .as_deref()
            .map(|body| post_data(body, req.header("Content-Type"), max_body_bytes)),
        body_size: req.body.as_ref().map_or(0, |b| b.len() as i64),
    })
}

fn post_data(body: &[u8], content_type: Option<&str>, max_body_bytes: usize) -> PostData {
    let mime_type = content_type.unwrap_or_default().to_string();
    if body.len() > max_body_bytes {
        return PostData {
            mime_type,
            text: String::new(),
            params: Vec::new(),
            comment: Some(omitted_comment(body.len(), max_body_bytes)),
        };
    }
    let (text, encoding) = encode_body(body, &mime_type);
    let params = if encoding.is_none()
        && mime_type
            .to_ascii_lowercase()
            .starts_with("application/x-www-form-urlencoded")
    {
        url::form_urlencoded::parse(text.as_bytes())
            .map(|(k, v)| NameValue::new(k, v))
            .collect()
    } else {
        Vec::new()
    };
    PostData {
        mime_type,
        text,
        params,
        comment: encoding.map(|e| format!("text is {e}-encoded")),
    }
}

fn build_response(resp: &exchange::Response, max_body_bytes: usize) -> Result<Response, EntryBuildError> {
    validate_headers(&resp.headers)?;
    let http_version = resp
        .http_version
        .clone()
        .unwrap_or_else(|| DEFAULT_HTTP_VERSION.to_string());
    let status_text = resp
        .status_text
        .clone()
        .or_else(|| canonical_reason(resp.status).map(str::to_string))
        .unwrap_or_default();
    let status_line = format!("{} {} {}", http_version, resp.status, status_text);
    let redirect_url = if resp.is_redirect() {
        resp.header("Location").unwrap_or_default().to_string()
    } else {
        String::new()
    };

    Ok(Response {
        status: resp.status,
        headers_size: header_block_size(&status_line, &resp.headers),
        status_text,
        http_version,
        cookies: response_cookies(&resp.headers),
        headers: name_values(&resp.headers),
        content: response_content(
            resp.body.as_deref(),
            resp.header("Content-Type"),
            max_body_bytes,
        ),
        redirect_url,
        body_size: resp.body.as_ref().map_or(0, |b| b.len() as i64),
        error: None,
    })
}

fn failed_response(http_version: &str, failure: Option<&str>) -> Response {
    Response {
        status: 0,
        status_text: String::new(),
        http_version: http_version.to_string(),
        cookies: Vec::new(),
        headers: Vec::new(),
        content: Content::default(),
        redirect_url: String::new(),
        headers_size: -1,
        body_size: -1,
        error: Some(failure.unwrap_or("no response").to_string()),
    }
}

/// `time` for an exchange: the measured total, else the sum of known phases.
fn total_ms(t: &ExchangeTiming) -> f64 {
    match t.total {
        Some(total) => ms(total),
        None => [t.blocked, t.dns, t.connect, t.send, t.wait, t.receive]
            .iter()
            .flatten()
            .map(|d| ms(*d))
            .sum(),
    }
}

/// Unknown optional phases are -1. `send`/`receive` default to 0 and `wait`
/// absorbs whatever part of `time` the known phases leave. Phases measured over
/// a longer span than `time` (an entry trimmed to start after its redirect
/// hops) are scaled down so they still add up to `time`.
fn build_timings(t: &ExchangeTiming, time: f64) -> Timings {
    let opt = |d: Option<Duration>| d.map_or(UNKNOWN, ms);
    let mut timings = Timings {
        blocked: opt(t.blocked),
        dns: opt(t.dns),
        connect: opt(t.connect),
        send: t.send.map_or(0.0, ms),
        wait: t.wait.map_or(0.0, ms),
        receive: t.receive.map_or(0.0, ms),
        ssl: opt(t.ssl),
    };
    fit_phases(&mut timings, time);
    timings
}

/// Sum of the phases that make up `time` (`ssl` is part of `connect`).
fn phase_sum(t: &Timings) -> f64 {
    [t.blocked, t.dns, t.connect].iter().map(|v| v.max(0.0)).sum::<f64>()
        + t.send
        + t.wait
        + t.receive
}

fn fit_phases(t: &mut Timings, time: f64) {
    let sum = phase_sum(t);
    if sum < time {
        t.wait += time - sum;
    } else if sum > time && sum > 0.0 {
        let factor = time / sum;
        for phase in [&mut t.blocked, &mut t.dns, &mut t.connect, &mut t.ssl] {
            if *phase > 0.0 {
                *phase *= factor;
            }
        }
        t.send *= factor;
        t.wait *= factor;
        t.receive *= factor;
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from)
        .to_std()
        .map(ms)
        .unwrap_or(0.0)
}

fn name_values(headers: &[Header]) -> Vec<NameValue> {
    headers
        .iter()
        .map(|h| NameValue::new(h.name.as_str(), h.value.as_str()))
        .collect()
}

/// Bytes of the header block on the wire: start line, header lines, blank line.
fn header_block_size(start_line: &str, headers: &[Header]) -> i64 {
    let lines: usize = headers
        .iter()
        .map(|h| h.name.len() + 2 + h.value.len() + 2)
        .sum();
    (start_line.len() + 2 + lines + 2) as i64
}

fn validate_headers(headers: &[Header]) -> Result<(), EntryBuildError> {
    match headers.iter().find(|h| !is_token(&h.name)) {
        Some(bad) => Err(EntryBuildError::InvalidHeaderName {
            name: bad.name.clone(),
        }),
        None => Ok(()),
    }
}

/// RFC 9110 token: method names and header field names.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}
