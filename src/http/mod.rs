//! Minimal HTTP/1.1 request and response types.

pub mod content;

use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Reads a request line and its headers. Returns `Ok(None)` if the peer
    /// closed the connection before sending anything.
    pub fn read_from<R: BufRead>(reader: &mut R) -> io::Result<Option<Self>> {
        let mut first_line = String::new();
        if reader.read_line(&mut first_line)? == 0 {
            return Ok(None);
        }

        let mut parts = first_line.split_whitespace();
        let (method, target) = match (parts.next(), parts.next()) {
            (Some(method), Some(target)) => (method.to_string(), target.to_string()),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("malformed request line: {:?}", first_line.trim()),
                ))
            }
        };

        let mut headers = Vec::new();
        let mut line = String::new();
        while {
            line.clear();
            reader.read_line(&mut line)? > 0 && !line.trim().is_empty()
        } {
            log::trace!("Header line: {}", line.trim());
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        Ok(Some(Self {
            method,
            target,
            headers,
        }))
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// The target without its query string.
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or(&self.target)
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }

    pub fn is_get_or_head(&self) -> bool {
        self.is_head() || self.method.eq_ignore_ascii_case("GET")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Replaces every value of `name` with `value`.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.remove_header(name);
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// A bodiless response with `Content-Length: 0`.
    pub fn empty(status: u16) -> Self {
        let mut response = Self::new(status);
        response.set_header("Content-Length", "0");
        response
    }

    pub fn text(status: u16, text: &str) -> Self {
        let mut response = Self::new(status);
        response.set_header("Content-Type", "text/plain; charset=utf-8");
        response.set_header("Content-Length", text.len().to_string());
        response.set_body(text.as_bytes().to_vec());
        response
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(
            writer,
            "HTTP/1.1 {} {}\r\n",
            self.status,
            reason_phrase(self.status)
        )?;
        for (key, value) in &self.headers {
            write!(writer, "{}: {}\r\n", key, value)?;
        }
        writer.write_all(b"\r\n")?;
        writer.write_all(&self.body)?;
        writer.flush()
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        206 => "Partial Content",
        304 => "Not Modified",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        412 => "Precondition Failed",
        416 => "Range Not Satisfiable",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_request() {
        let raw = "GET /docs/a.txt?x=1 HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip, br\r\nRange:bytes=0-3\r\n\r\n";
        let request = Request::read_from(&mut Cursor::new(raw)).unwrap().unwrap();

        assert_eq!(request.method(), "GET");
        assert_eq!(request.target(), "/docs/a.txt?x=1");
        assert_eq!(request.path(), "/docs/a.txt");
        assert_eq!(request.header("accept-encoding"), Some("gzip, br"));
        assert_eq!(request.header("RANGE"), Some("bytes=0-3"));
        assert_eq!(request.header("If-Modified-Since"), None);
    }

    #[test]
    fn test_read_request_eof_and_garbage() {
        assert!(Request::read_from(&mut Cursor::new("")).unwrap().is_none());
        let err = Request::read_from(&mut Cursor::new("GARBAGE\r\n\r\n")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_write_response() {
        let mut out = Vec::new();
        Response::text(404, "Not Found").write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 9\r\n\r\nNot Found"
        );
    }

    #[test]
    fn test_set_header_replaces() {
        let mut response = Response::new(200);
        response.add_header("Vary", "Accept-Encoding");
        response.add_header("vary", "Origin");
        response.set_header("Vary", "*");
        assert_eq!(response.headers(), [("Vary".to_string(), "*".to_string())]);
    }
}
