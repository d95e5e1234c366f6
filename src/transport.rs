//! HTTP transport for the cloud endpoint.
//!
//! Every cloud call is a single POST with a JSON body. Authenticated calls carry
//! the token as a `token` query parameter. The transport returns the raw response
//! body; envelope decoding lives in [`crate::client`].

use serde_json::Value;
use std::time::Duration;

use crate::error::CloudError;

pub trait Transport {
    fn post(&self, url: &str, token: Option<&str>, body: &Value) -> Result<String, CloudError>;
}

/// Blocking transport backed by a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        UreqTransport { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        UreqTransport::new(Duration::from_secs(10))
    }
}

impl Transport for UreqTransport {
    fn post(&self, url: &str, token: Option<&str>, body: &Value) -> Result<String, CloudError> {
        let mut req = self.agent.post(url).header("Accept", "application/json");
        if let Some(token) = token {
            req = req.query("token", token);
        }

        let mut res = req
            .send_json(body)
            .map_err(|e| CloudError::Transport(e.to_string()))?;
        let status: http::StatusCode = res.status();
        let text = res
            .body_mut()
            .read_to_string()
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = if text.is_empty() { String::from("<no body>") } else { text };
            return Err(CloudError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(text)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    /// Accept one connection on a loopback port, answer it with `status` and
    /// `body`, and hand back the raw request text.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let raw = read_request(&mut stream);
            let reply = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(reply.as_bytes()).unwrap();
            stream.flush().unwrap();
            raw
        });
        (url, handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&raw);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if raw.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8(raw).unwrap()
    }

    fn request_body(raw: &str) -> Value {
        let (_, body) = raw.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    fn transport() -> UreqTransport {
        UreqTransport::new(Duration::from_secs(5))
    }

    #[test]
    fn authenticated_post_puts_token_in_query() {
        let (url, server) = serve_once("200 OK", r#"{"error_code":0,"result":{"deviceList":[]}}"#);
        let body = json!({"method": "getDeviceList", "params": {}});

        let text = transport().post(&url, Some("T1"), &body).unwrap();

        let raw = server.join().unwrap();
        let request_line = raw.lines().next().unwrap();
        assert_eq!(request_line, "POST /?token=T1 HTTP/1.1");
        assert_eq!(request_body(&raw), body);
        assert_eq!(text, r#"{"error_code":0,"result":{"deviceList":[]}}"#);
    }

    #[test]
    fn unauthenticated_post_has_no_query() {
        let (url, server) = serve_once("200 OK", r#"{"error_code":0,"result":{"token":"T1"}}"#);
        let body = json!({"method": "login", "params": {"cloudUserName": "me@example.com"}});

        transport().post(&url, None, &body).unwrap();

        let raw = server.join().unwrap();
        assert_eq!(raw.lines().next().unwrap(), "POST / HTTP/1.1");
        assert!(!raw.contains("token="), "{raw}");
        assert_eq!(request_body(&raw), body);
    }

    #[test]
    fn non_success_status_is_http_error() {
        let (url, server) = serve_once("503 Service Unavailable", "");

        let err = transport().post(&url, Some("T1"), &json!({"method": "getDeviceList"})).unwrap_err();
        server.join().unwrap();

        match &err {
            CloudError::Http { status, message } => {
                assert_eq!(*status, 503);
                assert_eq!(message, "<no body>");
            }
            other => panic!("expected http error, got {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::CannotConnect);
    }

    #[test]
    fn error_status_keeps_body_as_message() {
        let (url, server) = serve_once("500 Internal Server Error", "upstream down");

        let err = transport().post(&url, None, &json!({"method": "login"})).unwrap_err();
        server.join().unwrap();

        assert_eq!(err.to_string(), "http 500: upstream down");
    }
}
