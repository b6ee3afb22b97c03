//! libcurl transport for `record`: one transfer per hop, redirects followed by
//! hand so each hop reaches the archiver's redirect hook.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::str;
use std::time::Duration;

use harchiver_core::{
    EventBus, Exchange, ExchangeId, ExchangeTiming, Header, RedirectNotice, Request, Response,
    ResponseContext, ResponseFormat,
};

/// Transfer options shared by every request of a `record` run.
#[derive(Debug, Clone)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub max_redirects: u32,
    pub headers: Vec<Header>,
}

/// Fetches `url`, publishing a redirect notice per hop and one completion at
/// the end (also on failure). Runs in the current thread; call from
/// `spawn_blocking` in async code.
pub fn fetch(bus: &EventBus, id: ExchangeId, url: &str, opts: &CurlOptions) -> Result<u16> {
    let mut request = Request::get(url);
    request.headers = opts.headers.clone();
    let mut hops = 0u32;
    let chain_start = Utc::now();
    loop {
        let started_at = Utc::now();
        let exchange = match perform(&request, opts) {
            Ok(done) => done.into_exchange(id, request.clone(), started_at),
            Err(e) => {
                let elapsed = (Utc::now() - chain_start).to_std().unwrap_or_default();
                let timing = ExchangeTiming::new(chain_start, elapsed);
                bus.publish_completed(&Exchange::failed(id, request, timing, format!("{e:#}")));
                return Err(e);
            }
        };
        let status = exchange.response.as_ref().map_or(0, |r| r.status);
        let location = exchange
            .response
            .as_ref()
            .filter(|r| r.is_redirect())
            .and_then(|r| r.header("Location"))
            .and_then(|location| resolve_location(&request.url, location));

        match location {
            Some(next) if hops < opts.max_redirects => {
                let mut new = Request::get(next.as_str());
                new.headers = request.headers.clone();
                bus.publish_redirected(&RedirectNotice {
                    exchange_id: id,
                    current: exchange.request.clone(),
                    new: new.clone(),
                    response: exchange.response.clone(),
                    observed_at: Utc::now(),
                });
                tracing::debug!(exchange = %id, from = %request.url, to = %new.url, status, "following redirect");
                request = new;
                hops += 1;
            }
            _ => {
                bus.publish_completed(&span_from(exchange, chain_start));
                return Ok(status);
            }
        }
    }
}

/// Target of a `Location` header, relative to the URL that returned it.
fn resolve_location(base: &str, location: &str) -> Option<url::Url> {
    match url::Url::parse(base).and_then(|b| b.join(location)) {
        Ok(next) => Some(next),
        Err(e) => {
            tracing::warn!(%base, location, error = %e, "unusable redirect location, not following");
            None
        }
    }
}

/// Stretches the final transfer's timing back to the start of the first hop,
/// so the exchange covers its whole redirect chain.
fn span_from(mut exchange: Exchange, chain_start: DateTime<Utc>) -> Exchange {
    let before = (exchange.timing.started_at - chain_start)
        .to_std()
        .unwrap_or_default();
    exchange.timing.started_at = chain_start;
    exchange.timing.total = exchange.timing.total.map(|t| t + before);
    exchange
}

/// Raw result of one curl transfer.
struct Transfer {
    request_lines: Vec<String>,
    response_lines: Vec<String>,
    body: Vec<u8>,
    timing: CurlTiming,
    primary_ip: Option<String>,
    local_port: Option<u16>,
}

/// Cumulative times reported by libcurl, all measured from the start of the transfer.
#[derive(Debug, Clone, Copy, Default)]
struct CurlTiming {
    namelookup: Duration,
    connect: Duration,
    appconnect: Duration,
    pretransfer: Duration,
    starttransfer: Duration,
    total: Duration,
}

fn perform(request: &Request, opts: &CurlOptions) -> Result<Transfer> {
    let mut easy = curl::easy::Easy::new();
    easy.url(&request.url).context("invalid URL")?;
    easy.follow_location(false)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.timeout(opts.timeout)?;
    easy.verbose(true)?;

    let mut list = curl::easy::List::new();
    for h in &request.headers {
        list.append(&format!("{}: {}", h.name.trim(), h.value.trim()))?;
    }
    if !request.headers.is_empty() {
        easy.http_headers(list)?;
    }

    let mut request_lines = Vec::new();
    let mut response_lines = Vec::new();
    let mut body = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.debug_function(|kind, data| {
            if let curl::easy::InfoType::HeaderOut = kind {
                if let Ok(s) = str::from_utf8(data) {
                    request_lines.extend(s.lines().map(str::to_string));
                }
            }
        })?;
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                response_lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform().context("request failed")?;
    }

    let timing = CurlTiming {
        namelookup: easy.namelookup_time()?,
        connect: easy.connect_time()?,
        appconnect: easy.appconnect_time()?,
        pretransfer: easy.pretransfer_time()?,
        starttransfer: easy.starttransfer_time()?,
        total: easy.total_time()?,
    };
    let primary_ip = easy.primary_ip()?.map(str::to_string);
    let local_port = easy.local_port().ok();

    Ok(Transfer {
        request_lines,
        response_lines,
        body,
        timing,
        primary_ip,
        local_port,
    })
}

impl Transfer {
    fn into_exchange(
        self,
        id: ExchangeId,
        mut request: Request,
        started_at: DateTime<Utc>,
    ) -> Exchange {
        if let Some((version, headers)) = parse_request_head(&self.request_lines) {
            request.http_version = Some(version);
            request.headers = headers;
        }
        let mut response = parse_response_head(&self.response_lines);
        let context = response.header("Content-Type").map(|mime| {
            let format = ResponseFormat::from_mime(mime);
            let decoded = match format {
                ResponseFormat::Json => serde_json::from_slice(&self.body).ok(),
                _ => None,
            };
            ResponseContext { format, decoded }
        });
        if !self.body.is_empty() {
            response.body = Some(self.body);
        }

        let mut exchange = Exchange::new(id, request, response, self.timing.to_exchange(started_at));
        exchange.server_ip = self.primary_ip.and_then(|ip| ip.parse().ok());
        exchange.connection = self.local_port.map(|p| p.to_string());
        exchange.context = context;
        exchange
    }
}

impl CurlTiming {
    /// Splits curl's cumulative marks into HAR phases.
    fn to_exchange(self, started_at: DateTime<Utc>) -> ExchangeTiming {
        let connected = self.connect.max(self.appconnect);
        let mut t = ExchangeTiming::new(started_at, self.total);
        t.dns = Some(self.namelookup);
        t.connect = Some(connected.saturating_sub(self.namelookup));
        t.ssl = (self.appconnect > Duration::ZERO)
            .then(|| self.appconnect.saturating_sub(self.connect));
        t.send = Some(self.pretransfer.saturating_sub(connected));
        t.wait = Some(self.starttransfer.saturating_sub(self.pretransfer));
        t.receive = Some(self.total.saturating_sub(self.starttransfer));
        t
    }
}

/// `GET /path HTTP/1.1` followed by header lines, as curl sent them.
fn parse_request_head(lines: &[String]) -> Option<(String, Vec<Header>)> {
    let mut iter = lines.iter().map(|l| l.trim_end()).filter(|l| !l.is_empty());
    let version = iter.next()?.rsplit(' ').next()?.to_string();
    let headers = iter.filter_map(parse_header_line).collect();
    Some((version, headers))
}

/// Status line and headers of the last response block (skips `100 Continue`).
fn parse_response_head(lines: &[String]) -> Response {
    let mut response = Response::new(0);
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            let mut parts = line.splitn(3, ' ');
            let version = parts.next().unwrap_or_default();
            let status = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            response = Response::new(status);
            response.http_version = Some(version.to_string());
            response.status_text = parts
                .next()
                .map(str::to_string)
                .filter(|s| !s.is_empty());
            continue;
        }
        if let Some(h) = parse_header_line(line) {
            response.headers.push(h);
        }
    }
    response
}

fn parse_header_line(line: &str) -> Option<Header> {
    let (name, value) = line.split_once(':')?;
    Some(Header::new(name.trim(), value.trim()))
}

/// Parses a `--header 'Name: value'` argument.
pub fn parse_header_arg(arg: &str) -> Result<Header> {
    let header = parse_header_line(arg)
        .filter(|h| !h.name.is_empty())
        .with_context(|| format!("header must look like 'Name: value', got {arg:?}"))?;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn response_head_uses_last_block() {
        let r = parse_response_head(&lines(&[
            "HTTP/1.1 100 Continue",
            "",
            "HTTP/1.1 302 Found",
            "Location: /new",
            "Content-Length: 0",
            "",
        ]));
        assert_eq!(r.status, 302);
        assert_eq!(r.status_text.as_deref(), Some("Found"));
        assert_eq!(r.http_version.as_deref(), Some("HTTP/1.1"));
        assert_eq!(r.header("location"), Some("/new"));
        assert_eq!(r.headers.len(), 2);
    }

    #[test]
    fn http2_status_line_without_reason() {
        let r = parse_response_head(&lines(&["HTTP/2 200", "content-type: text/html"]));
        assert_eq!(r.status, 200);
        assert!(r.status_text.is_none());
        assert_eq!(r.http_version.as_deref(), Some("HTTP/2"));
    }

    #[test]
    fn request_head_from_curl_debug_output() {
        let (version, headers) = parse_request_head(&lines(&[
            "GET /a?x=1 HTTP/1.1",
            "Host: example.com",
            "Accept: */*",
            "",
        ]))
        .unwrap();
        assert_eq!(version, "HTTP/1.1");
        assert_eq!(headers[0], Header::new("Host", "example.com"));
        assert_eq!(headers.len(), 2);
        assert!(parse_request_head(&[]).is_none());
    }

    #[test]
    fn relative_location_resolves_against_request_url() {
        let next = resolve_location("http://a.example/x/y?q=1", "../z").unwrap();
        assert_eq!(next.as_str(), "http://a.example/z");
        let abs = resolve_location("http://a.example/", "https://b.example/p").unwrap();
        assert_eq!(abs.as_str(), "https://b.example/p");
        assert!(resolve_location("http://a.example/", "http://[bad").is_none());
    }

    #[test]
    fn header_arg_parsing() {
        let h = parse_header_arg("Authorization: Bearer abc:def").unwrap();
        assert_eq!(h.name, "Authorization");
        assert_eq!(h.value, "Bearer abc:def");
        assert!(parse_header_arg("no-colon").is_err());
        assert!(parse_header_arg(": value").is_err());
    }

    #[test]
    fn curl_timing_becomes_har_phases() {
        let ms = Duration::from_millis;
        let t = CurlTiming {
            namelookup: ms(10),
            connect: ms(30),
            appconnect: ms(60),
            pretransfer: ms(62),
            starttransfer: ms(100),
            total: ms(120),
        }
        .to_exchange(Utc::now());
        assert_eq!(t.total, Some(ms(120)));
        assert_eq!(t.dns, Some(ms(10)));
        assert_eq!(t.connect, Some(ms(50)));
        assert_eq!(t.ssl, Some(ms(30)));
        assert_eq!(t.send, Some(ms(2)));
        assert_eq!(t.wait, Some(ms(38)));
        assert_eq!(t.receive, Some(ms(20)));
    }

    #[test]
    fn final_transfer_spans_whole_chain() {
        let chain_start = Utc::now();
        let started = chain_start + chrono::Duration::milliseconds(40);
        let exchange = Exchange::new(
            ExchangeId(1),
            Request::get("http://example.com/final"),
            Response::new(200),
            ExchangeTiming::new(started, Duration::from_millis(10)),
        );
        let spanned = span_from(exchange, chain_start);
        assert_eq!(spanned.timing.started_at, chain_start);
        assert_eq!(spanned.timing.total, Some(Duration::from_millis(50)));
    }

    #[test]
    fn plain_http_has_no_ssl_phase() {
        let ms = Duration::from_millis;
        let t = CurlTiming {
            namelookup: ms(1),
            connect: ms(2),
            appconnect: Duration::ZERO,
            pretransfer: ms(2),
            starttransfer: ms(5),
            total: ms(6),
        }
        .to_exchange(Utc::now());
        assert!(t.ssl.is_none());
        assert_eq!(t.connect, Some(ms(1)));
    }
}
