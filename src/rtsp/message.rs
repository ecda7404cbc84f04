//! RTSP request/response parse and stringify (RFC 2326 subset used by WFD).
//!
//! Messages may arrive spliced or fragmented over TCP; `parse` reports how
//! many bytes it consumed so the session can re-parse trailing data, and
//! returns [`RtspParseError::Incomplete`] while the terminator or declared
//! body is still missing.

use super::rtsp_error::RtspParseError;
use super::{RTSP_STATUS_OK, RTSP_VERSION};

const HEADER_TERMINATOR: &str = "\r\n\r\n";

fn header_get<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Split `name: value` parameter lines of a SET_PARAMETER body.
pub fn split_parameters(body: &[String]) -> Vec<(String, String)> {
    body.iter()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            match line.split_once(':') {
                Some((name, value)) => Some((name.trim().to_string(), value.trim().to_string())),
                None => Some((line.to_string(), String::new())),
            }
        })
        .collect()
}

/// Shared parse of the header block + body; returns (headers, body, consumed).
#[allow(clippy::type_complexity)]
fn parse_common(
    text: &str,
) -> Result<(Vec<(String, String)>, Vec<String>, usize), RtspParseError> {
    let Some(header_end) = text.find(HEADER_TERMINATOR) else {
        return Err(RtspParseError::Incomplete);
    };
    let header_block = &text[..header_end];

    let mut headers = Vec::new();
    for line in header_block.split("\r\n").skip(1) {
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((name, value)) => {
                headers.push((name.trim().to_string(), value.trim().to_string()))
            }
            None => return Err(RtspParseError::Invalid(format!("bad header line: {line}"))),
        }
    }

    let body_start = header_end + HEADER_TERMINATOR.len();
    let content_length = header_get(&headers, "Content-Length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if text.len() < body_start + content_length {
        return Err(RtspParseError::Incomplete);
    }

    let body_text = &text[body_start..body_start + content_length];
    let body = body_text
        .split("\r\n")
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    Ok((headers, body, body_start + content_length))
}

fn cseq_of(headers: &[(String, String)]) -> u32 {
    header_get(headers, "CSeq")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn stringify_tail(out: &mut String, headers: &[(String, String)], body: &[String]) {
    let body_text = if body.is_empty() {
        String::new()
    } else {
        let mut text = body.join("\r\n");
        text.push_str("\r\n");
        text
    };

    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    if !body_text.is_empty() {
        out.push_str("Content-Type: text/parameters\r\n");
        out.push_str(&format!("Content-Length: {}\r\n", body_text.len()));
    }
    out.push_str("\r\n");
    out.push_str(&body_text);
}

/// An RTSP request line plus headers and an optional parameter body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RtspRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<String>,
}

impl RtspRequest {
    pub fn new(method: &str, url: &str, cseq: u32) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            headers: vec![("CSeq".to_string(), cseq.to_string())],
            body: Vec::new(),
        }
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn add_body_line(&mut self, line: &str) {
        self.body.push(line.to_string());
    }

    #[must_use]
    pub fn cseq(&self) -> u32 {
        cseq_of(&self.headers)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.header("Session")
    }

    /// Parse one request from `text`; also returns the bytes consumed.
    pub fn parse(text: &str) -> Result<(RtspRequest, usize), RtspParseError> {
        let first_line_end = text.find("\r\n").ok_or(RtspParseError::Incomplete)?;
        let first_line = &text[..first_line_end];
        let mut parts = first_line.split_whitespace();
        let method = parts.next().ok_or_else(|| {
            RtspParseError::Invalid("empty request line".to_string())
        })?;
        let url = parts
            .next()
            .ok_or_else(|| RtspParseError::Invalid("request without url".to_string()))?;
        let version = parts
            .next()
            .ok_or_else(|| RtspParseError::Invalid("request line too short".to_string()))?;
        if version != RTSP_VERSION {
            return Err(RtspParseError::Invalid(format!("bad version: {version}")));
        }
        if method.chars().any(|c| !c.is_ascii_uppercase() && c != '_') {
            return Err(RtspParseError::Invalid(format!("bad method: {method}")));
        }

        let (headers, body, consumed) = parse_common(text)?;
        Ok((
            RtspRequest {
                method: method.to_string(),
                url: url.to_string(),
                headers,
                body,
            },
            consumed,
        ))
    }

    #[must_use]
    pub fn stringify(&self) -> String {
        let mut out = format!("{} {} {}\r\n", self.method, self.url, RTSP_VERSION);
        stringify_tail(&mut out, &self.headers, &self.body);
        out
    }
}

/// An RTSP status line plus headers and an optional parameter body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<String>,
}

impl RtspResponse {
    pub fn new(cseq: u32, status: u16) -> Self {
        let reason = if status == RTSP_STATUS_OK { "OK" } else { "Error" };
        Self {
            status,
            reason: reason.to_string(),
            headers: vec![("CSeq".to_string(), cseq.to_string())],
            body: Vec::new(),
        }
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn add_body_line(&mut self, line: &str) {
        self.body.push(line.to_string());
    }

    #[must_use]
    pub fn cseq(&self) -> u32 {
        cseq_of(&self.headers)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn public_methods(&self) -> Option<&str> {
        self.header("Public")
    }

    #[must_use]
    pub fn server(&self) -> Option<&str> {
        self.header("Server")
    }

    /// `Session: id;timeout=N` split into both parts.
    #[must_use]
    pub fn session(&self) -> Option<(String, Option<u32>)> {
        let raw = self.header("Session")?;
        match raw.split_once(';') {
            Some((id, rest)) => {
                let timeout = rest
                    .trim()
                    .strip_prefix("timeout=")
                    .and_then(|v| v.parse().ok());
                Some((id.trim().to_string(), timeout))
            }
            None => Some((raw.trim().to_string(), None)),
        }
    }

    /// Parse one response from `text`; also returns the bytes consumed.
    pub fn parse(text: &str) -> Result<(RtspResponse, usize), RtspParseError> {
        let first_line_end = text.find("\r\n").ok_or(RtspParseError::Incomplete)?;
        let first_line = &text[..first_line_end];
        let mut parts = first_line.splitn(3, ' ');
        let version = parts
            .next()
            .ok_or_else(|| RtspParseError::Invalid("empty status line".to_string()))?;
        if version != RTSP_VERSION {
            return Err(RtspParseError::Invalid(format!("bad version: {version}")));
        }
        let status = parts
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| RtspParseError::Invalid("bad status code".to_string()))?;
        let reason = parts.next().unwrap_or("").to_string();

        let (headers, body, consumed) = parse_common(text)?;
        Ok((
            RtspResponse {
                status,
                reason,
                headers,
                body,
            },
            consumed,
        ))
    }

    #[must_use]
    pub fn stringify(&self) -> String {
        let mut out = format!("{} {} {}\r\n", RTSP_VERSION, self.status, self.reason);
        stringify_tail(&mut out, &self.headers, &self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn request_roundtrips_through_stringify_and_parse() {
        let mut request = RtspRequest::new("SET_PARAMETER", "rtsp://192.0.2.1/wfd1.0", 3);
        request.add_body_line("wfd_trigger_method: SETUP");

        let wire = request.stringify();
        let (parsed, consumed) = RtspRequest::parse(&wire).expect("parse");
        assert_eq!(consumed, wire.len());
        assert_eq!(parsed.method, "SET_PARAMETER");
        assert_eq!(parsed.cseq(), 3);
        assert_eq!(parsed.body, vec!["wfd_trigger_method: SETUP"]);
    }

    #[test]
    fn response_roundtrips_and_parses_session() {
        let mut response = RtspResponse::new(6, RTSP_STATUS_OK);
        response.add_header("Session", "12345678;timeout=60");

        let wire = response.stringify();
        let (parsed, _) = RtspResponse::parse(&wire).expect("parse");
        assert_eq!(parsed.status, RTSP_STATUS_OK);
        assert_eq!(parsed.cseq(), 6);
        assert_eq!(parsed.session(), Some(("12345678".to_string(), Some(60))));
    }

    #[test]
    fn missing_terminator_is_incomplete() {
        let partial = "OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n";
        assert_eq!(
            RtspRequest::parse(partial).unwrap_err(),
            RtspParseError::Incomplete
        );
    }

    #[test]
    fn short_body_is_incomplete() {
        let mut request = RtspRequest::new("SET_PARAMETER", "rtsp://x", 4);
        request.add_body_line("wfd_idr_request: ");
        let wire = request.stringify();
        let cut = &wire[..wire.len() - 5];
        assert_eq!(
            RtspRequest::parse(cut).unwrap_err(),
            RtspParseError::Incomplete
        );
    }

    #[test]
    fn spliced_messages_report_consumed_bytes() {
        let first = RtspResponse::new(2, RTSP_STATUS_OK).stringify();
        let second = RtspRequest::new("GET_PARAMETER", "rtsp://x", 3).stringify();
        let spliced = format!("{first}{second}");

        let (_, consumed) = RtspResponse::parse(&spliced).expect("first");
        assert_eq!(consumed, first.len());
        let (request, _) = RtspRequest::parse(&spliced[consumed..]).expect("second");
        assert_eq!(request.method, "GET_PARAMETER");
    }

    #[test]
    fn a_request_does_not_parse_as_a_response() {
        let wire = RtspRequest::new("OPTIONS", "*", 1).stringify();
        assert!(matches!(
            RtspResponse::parse(&wire).unwrap_err(),
            RtspParseError::Invalid(_)
        ));
    }

    #[test]
    fn split_parameters_handles_valueless_lines() {
        let body = vec![
            "wfd_video_formats".to_string(),
            "wfd_client_rtp_ports: RTP/AVP/UDP;unicast 9988 0 mode=play".to_string(),
        ];
        let params = split_parameters(&body);
        assert_eq!(params[0], ("wfd_video_formats".to_string(), String::new()));
        assert_eq!(params[1].0, "wfd_client_rtp_ports");
        assert!(params[1].1.contains("9988"));
    }
}
