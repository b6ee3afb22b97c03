//! HAR (HTTP Archive) 1.2 model and entry construction.
//!
//! `build` turns exchanges and redirect hops into entries; `model` is the
//! serialized document; `read` parses an archive back (CLI `inspect`, tests).

mod build;
mod content;
mod cookie;
pub mod model;
mod read;
mod status;

pub use build::{build_entry, build_hop_entry, Hop};
pub use model::{Entry, Har};
pub use read::read_archive;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn read_archive_parses_foreign_har() {
        let har = r#"{
            "log": {
                "version": "1.2",
                "creator": { "name": "browser", "version": "1.0" },
                "entries": [
                    {
                        "startedDateTime": "2024-03-01T12:00:00.000+01:00",
                        "time": 50,
                        "request": {
                            "method": "GET",
                            "url": "https://example.com/redirect",
                            "httpVersion": "HTTP/2",
                            "headers": [],
                            "headersSize": -1,
                            "bodySize": 0
                        },
                        "response": {
                            "status": 302,
                            "statusText": "Found",
                            "httpVersion": "HTTP/2",
                            "content": { "size": 0, "mimeType": "" },
                            "redirectURL": "https://cdn.example.com/file.zip",
                            "headersSize": -1,
                            "bodySize": 0
                        },
                        "cache": {},
                        "timings": { "blocked": -1, "dns": -1, "connect": -1, "send": 0, "wait": 50, "receive": 0, "ssl": -1 }
                    }
                ]
            }
        }"#;
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(har.as_bytes()).unwrap();
        f.flush().unwrap();
        let parsed = read_archive(f.path()).unwrap();
        assert_eq!(parsed.log.creator.name, "browser");
        let entry = &parsed.log.entries[0];
        assert_eq!(entry.response.redirect_url, "https://cdn.example.com/file.zip");
        assert_eq!(entry.started_date_time.to_rfc3339(), "2024-03-01T11:00:00+00:00");
    }

    #[test]
    fn read_archive_rejects_truncated_json() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(br#"{"log":{"version":"1.2","entries":["#).unwrap();
        f.flush().unwrap();
        assert!(read_archive(f.path()).is_err());
    }
}
