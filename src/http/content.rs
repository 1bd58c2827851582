//! Serving a seekable body with content type, conditional request and byte
//! range handling.

use std::io::{self, Read, Seek, SeekFrom};
use std::time::{SystemTime, UNIX_EPOCH};

use mime_guess::from_path;

use super::{Request, Response};

const SNIFF_LEN: usize = 512;

#[derive(Debug, PartialEq, Eq)]
enum Precondition {
    Proceed,
    NotModified,
    Failed,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ByteRange {
    /// One satisfiable range, as `(start, length)`.
    Single(u64, u64),
    /// Several ranges; answered with the whole body.
    Multiple,
    Unsatisfiable,
}

/// Seconds since the epoch, or `None` for times that carry no information.
fn unix_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
        .filter(|&secs| secs > 0)
}

fn header_secs(value: &str) -> Option<u64> {
    httpdate::parse_http_date(value).ok().and_then(unix_secs)
}

pub(crate) fn content_type_for(name: &str) -> Option<String> {
    let mime = from_path(name).first()?;
    let needs_charset = mime.type_() == mime_guess::mime::TEXT
        || matches!(mime.subtype().as_str(), "javascript" | "json");
    if needs_charset && mime.get_param("charset").is_none() {
        Some(format!("{}; charset=utf-8", mime.essence_str()))
    } else {
        Some(mime.to_string())
    }
}

/// Content type for `name`, sniffed from the start of `content` when the name
/// has no known extension.
pub(crate) fn content_type(name: &str, content: &[u8]) -> String {
    content_type_for(name).unwrap_or_else(|| {
        let head = &content[..content.len().min(SNIFF_LEN)];
        sniff_content_type(head).to_string()
    })
}

fn sniff_content_type(head: &[u8]) -> &'static str {
    let looks_textual = match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };
    if looks_textual && !head.contains(&0) {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

fn check_preconditions(request: &Request, modified: Option<u64>) -> Precondition {
    let Some(modified) = modified else {
        return Precondition::Proceed;
    };

    if let Some(since) = request.header("If-Unmodified-Since").and_then(header_secs) {
        if modified > since {
            return Precondition::Failed;
        }
    }

    if request.is_get_or_head() && request.header("If-None-Match").is_none() {
        if let Some(since) = request.header("If-Modified-Since").and_then(header_secs) {
            if modified <= since {
                return Precondition::NotModified;
            }
        }
    }

    Precondition::Proceed
}

/// `If-Range` only keeps the range alive when it names the current date.
fn range_still_valid(request: &Request, modified: Option<u64>) -> bool {
    match request.header("If-Range") {
        None => true,
        Some(value) => match (header_secs(value), modified) {
            (Some(date), Some(modified)) => date == modified,
            _ => false,
        },
    }
}

/// Parses a `Range` header against a body of `size` bytes.
pub(crate) fn parse_range(header: &str, size: u64) -> ByteRange {
    let Some(specs) = header.trim().strip_prefix("bytes=") else {
        return ByteRange::Unsatisfiable;
    };

    let mut ranges = Vec::new();
    for spec in specs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((first, last)) = spec.split_once('-') else {
            return ByteRange::Unsatisfiable;
        };
        let (first, last) = (first.trim(), last.trim());

        if first.is_empty() {
            let Ok(suffix) = last.parse::<u64>() else {
                return ByteRange::Unsatisfiable;
            };
            if suffix == 0 {
                continue;
            }
            let len = suffix.min(size);
            ranges.push((size - len, len));
            continue;
        }

        let Ok(start) = first.parse::<u64>() else {
            return ByteRange::Unsatisfiable;
        };
        let end = if last.is_empty() {
            size.saturating_sub(1)
        } else {
            match last.parse::<u64>() {
                Ok(end) if end >= start => end.min(size.saturating_sub(1)),
                _ => return ByteRange::Unsatisfiable,
            }
        };
        if start >= size {
            continue;
        }
        ranges.push((start, end - start + 1));
    }

    match ranges.as_slice() {
        [] => ByteRange::Unsatisfiable,
        [(start, len)] => ByteRange::Single(*start, *len),
        _ => ByteRange::Multiple,
    }
}

fn write_not_modified(response: &mut Response) {
    response.set_status(304);
    response.remove_header("Content-Type");
    response.remove_header("Content-Length");
    response.remove_header("Content-Encoding");
    response.set_body(Vec::new());
}

/// Fills `response` with `content`, honouring conditional and range headers.
///
/// The content type comes from `name` unless the response already has one.
/// `Content-Length` always describes the body written here.
pub fn serve_content<R: Read + Seek>(
    request: &Request,
    response: &mut Response,
    name: &str,
    modified: SystemTime,
    mut content: R,
) -> io::Result<()> {
    let size = content.seek(SeekFrom::End(0))?;
    content.seek(SeekFrom::Start(0))?;

    if response.header("Content-Type").is_none() {
        let content_type = match content_type_for(name) {
            Some(content_type) => content_type,
            None => {
                let mut head = Vec::with_capacity(SNIFF_LEN);
                (&mut content).take(SNIFF_LEN as u64).read_to_end(&mut head)?;
                sniff_content_type(&head).to_string()
            }
        };
        response.set_header("Content-Type", content_type);
    }

    let modified_secs = unix_secs(modified);
    if modified_secs.is_some() {
        response.set_header("Last-Modified", httpdate::fmt_http_date(modified));
    }

    match check_preconditions(request, modified_secs) {
        Precondition::Proceed => {}
        Precondition::NotModified => {
            write_not_modified(response);
            return Ok(());
        }
        Precondition::Failed => {
            response.set_status(412);
            response.set_header("Content-Length", "0");
            response.set_body(Vec::new());
            return Ok(());
        }
    }

    response.set_header("Accept-Ranges", "bytes");

    let mut status = 200;
    let (mut start, mut len) = (0, size);
    if let Some(range) = request.header("Range") {
        if size > 0 && range_still_valid(request, modified_secs) {
            match parse_range(range, size) {
                ByteRange::Single(first, count) => {
                    status = 206;
                    (start, len) = (first, count);
                    response.set_header(
                        "Content-Range",
                        format!("bytes {}-{}/{}", first, first + count - 1, size),
                    );
                }
                ByteRange::Multiple => {}
                ByteRange::Unsatisfiable => {
                    log::debug!("Unsatisfiable range {:?} for {} ({} bytes)", range, name, size);
                    response.set_status(416);
                    response.set_header("Content-Range", format!("bytes */{}", size));
                    response.set_header("Content-Length", "0");
                    response.set_body(Vec::new());
                    return Ok(());
                }
            }
        }
    }

    response.set_status(status);
    response.set_header("Content-Length", len.to_string());

    let mut body = Vec::new();
    if !request.is_head() {
        content.seek(SeekFrom::Start(start))?;
        body.reserve(len as usize);
        (&mut content).take(len).read_to_end(&mut body)?;
    }
    response.set_body(body);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    const BODY: &[u8] = b"Hello, World!";

    fn modified() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn serve(request: &Request) -> Response {
        let mut response = Response::new(200);
        serve_content(request, &mut response, "data.txt", modified(), Cursor::new(BODY)).unwrap();
        response
    }

    #[test]
    fn test_full_body() {
        let response = serve(&Request::new("GET", "/data.txt"));
        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), BODY);
        assert_eq!(response.header("Content-Length"), Some("13"));
        assert_eq!(response.header("Content-Type"), Some("text/plain; charset=utf-8"));
        assert_eq!(response.header("Accept-Ranges"), Some("bytes"));
        assert_eq!(
            response.header("Last-Modified"),
            Some("Tue, 14 Nov 2023 22:13:20 GMT")
        );
    }

    #[test]
    fn test_head_has_no_body() {
        let response = serve(&Request::new("HEAD", "/data.txt"));
        assert_eq!(response.status(), 200);
        assert!(response.body().is_empty());
        assert_eq!(response.header("Content-Length"), Some("13"));
    }

    #[test]
    fn test_single_ranges() {
        let response = serve(&Request::new("GET", "/").with_header("Range", "bytes=0-4"));
        assert_eq!(response.status(), 206);
        assert_eq!(response.body(), b"Hello");
        assert_eq!(response.header("Content-Range"), Some("bytes 0-4/13"));
        assert_eq!(response.header("Content-Length"), Some("5"));

        let response = serve(&Request::new("GET", "/").with_header("Range", "bytes=-6"));
        assert_eq!(response.body(), b"World!");
        assert_eq!(response.header("Content-Range"), Some("bytes 7-12/13"));

        let response = serve(&Request::new("GET", "/").with_header("Range", "bytes=7-100"));
        assert_eq!(response.body(), b"World!");
    }

    #[test]
    fn test_bad_ranges() {
        for range in ["bytes=20-", "bytes=5-2", "items=0-1", "bytes=x-1", "bytes=-0"] {
            let response = serve(&Request::new("GET", "/").with_header("Range", range));
            assert_eq!(response.status(), 416, "{}", range);
            assert_eq!(response.header("Content-Range"), Some("bytes */13"));
            assert!(response.body().is_empty());
        }
    }

    #[test]
    fn test_multiple_ranges_serve_everything() {
        let response = serve(&Request::new("GET", "/").with_header("Range", "bytes=0-1, 4-5"));
        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), BODY);
    }

    #[test]
    fn test_if_modified_since() {
        let same = httpdate::fmt_http_date(modified());
        let response = serve(&Request::new("GET", "/").with_header("If-Modified-Since", same));
        assert_eq!(response.status(), 304);
        assert!(response.body().is_empty());
        assert_eq!(response.header("Content-Length"), None);
        assert_eq!(response.header("Content-Type"), None);

        let earlier = httpdate::fmt_http_date(modified() - Duration::from_secs(60));
        let response = serve(&Request::new("GET", "/").with_header("If-Modified-Since", earlier));
        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), BODY);
    }

    #[test]
    fn test_if_unmodified_since() {
        let earlier = httpdate::fmt_http_date(modified() - Duration::from_secs(60));
        let response = serve(&Request::new("GET", "/").with_header("If-Unmodified-Since", earlier));
        assert_eq!(response.status(), 412);
    }

    #[test]
    fn test_if_range() {
        let stale = httpdate::fmt_http_date(modified() - Duration::from_secs(60));
        let request = Request::new("GET", "/")
            .with_header("Range", "bytes=0-4")
            .with_header("If-Range", stale);
        assert_eq!(serve(&request).status(), 200);

        let current = httpdate::fmt_http_date(modified());
        let request = Request::new("GET", "/")
            .with_header("Range", "bytes=0-4")
            .with_header("If-Range", current);
        assert_eq!(serve(&request).status(), 206);
    }

    #[test]
    fn test_epoch_time_is_not_advertised() {
        let mut response = Response::new(200);
        let request = Request::new("GET", "/")
            .with_header("If-Modified-Since", "Tue, 14 Nov 2023 22:13:20 GMT");
        serve_content(&request, &mut response, "a.txt", UNIX_EPOCH, Cursor::new(BODY)).unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.header("Last-Modified"), None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("index.html").as_deref(), Some("text/html; charset=utf-8"));
        assert_eq!(content_type_for("image.png").as_deref(), Some("image/png"));
        assert_eq!(content_type_for("noextension"), None);
        assert_eq!(sniff_content_type(b"plain words"), "text/plain; charset=utf-8");
        assert_eq!(sniff_content_type(&[0x1f, 0x8b, 0x08, 0x00]), "application/octet-stream");

        assert_eq!(content_type("hw", b"Hello, World!\n"), "text/plain; charset=utf-8");
        assert_eq!(content_type("hw.css", &[0, 1, 2]), "text/css; charset=utf-8");
        let mut long = "x".repeat(SNIFF_LEN);
        long.push('\0');
        assert_eq!(content_type("hw", long.as_bytes()), "text/plain; charset=utf-8");
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("bytes=0-0", 10), ByteRange::Single(0, 1));
        assert_eq!(parse_range("bytes=5-", 10), ByteRange::Single(5, 5));
        assert_eq!(parse_range("bytes=-20", 10), ByteRange::Single(0, 10));
        assert_eq!(parse_range("bytes=0-1,3-4", 10), ByteRange::Multiple);
        assert_eq!(parse_range("bytes=0-1,30-40", 10), ByteRange::Single(0, 2));
        assert_eq!(parse_range("bytes=", 10), ByteRange::Unsatisfiable);
    }
}
