//! Cookie extraction from `Cookie` and `Set-Cookie` headers.

use crate::exchange::Header;

use super::model::Cookie;

/// Cookies sent by the client: every `Cookie` header, split on `;`.
pub(crate) fn request_cookies(headers: &[Header]) -> Vec<Cookie> {
    headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case("cookie"))
        .flat_map(|h| h.value.split(';'))
        .filter_map(|pair| {
            let (name, value) = split_pair(pair)?;
            Some(Cookie {
                name,
                value,
                ..Cookie::default()
            })
        })
        .collect()
}

/// Cookies set by the server: one per `Set-Cookie` header, with attributes.
pub(crate) fn response_cookies(headers: &[Header]) -> Vec<Cookie> {
    headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case("set-cookie"))
        .filter_map(|h| parse_set_cookie(&h.value))
        .collect()
}

fn parse_set_cookie(value: &str) -> Option<Cookie> {
    let mut parts = value.split(';');
    let (name, value) = split_pair(parts.next()?)?;
    let mut cookie = Cookie {
        name,
        value,
        ..Cookie::default()
    };
    for attr in parts {
        let attr = attr.trim();
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attr, None),
        };
        if key.eq_ignore_ascii_case("path") {
            cookie.path = val.map(str::to_string);
        } else if key.eq_ignore_ascii_case("domain") {
            cookie.domain = val.map(str::to_string);
        } else if key.eq_ignore_ascii_case("expires") {
            cookie.expires = val.map(str::to_string);
        } else if key.eq_ignore_ascii_case("httponly") {
            cookie.http_only = Some(true);
        } else if key.eq_ignore_ascii_case("secure") {
            cookie.secure = Some(true);
        }
    }
    Some(cookie)
}

fn split_pair(pair: &str) -> Option<(String, String)> {
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}
