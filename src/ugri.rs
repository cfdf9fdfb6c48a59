//! UGRI parsing: `ugtp[s]://host:port/page`.
//!
//! Address-bar input is user-typed, so parsing is tolerant: a missing
//! scheme is assumed to be plain transport and the input is read as
//! `host:port/page`.

use thiserror::Error;
use url::Url;

use crate::protocol::Link;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("error parsing url")]
    BadUrl,
}

/// Parse a UGRI connection string into a link.
///
/// The scheme decides the secure flag (`ugtps` = TLS). Stream markers
/// (`->`) are an address-bar concern and are handled by the caller.
pub fn link_from_string(input: &str) -> Result<Link, ParseError> {
    let input = input.trim();
    let secure = input.contains("ugtps://");

    if input.contains("ugtp") {
        // swap the scheme so the generic URL grammar applies
        let http = input.replacen("ugtp", "http", 1);
        let parsed = Url::parse(&http).map_err(|_| ParseError::BadUrl)?;
        let server = parsed.host_str().ok_or(ParseError::BadUrl)?.to_string();
        if server.is_empty() {
            return Err(ParseError::BadUrl);
        }
        let port = parsed.port_or_known_default().ok_or(ParseError::BadUrl)?;
        let page_name = parsed.path().trim_start_matches('/').to_string();
        return Ok(Link {
            page_name,
            server: Some(server),
            port: Some(port),
            secure,
            stream: false,
        });
    }

    // no scheme: read as host:port/page
    let (server, rest) = input.split_once(':').ok_or(ParseError::BadUrl)?;
    if server.is_empty() {
        return Err(ParseError::BadUrl);
    }
    let (port, page_name) = match rest.split_once('/') {
        Some((port, page)) => (port, page),
        None => (rest, ""),
    };
    let port: u16 = port.parse().map_err(|_| ParseError::BadUrl)?;
    Ok(Link {
        page_name: page_name.to_string(),
        server: Some(server.to_string()),
        port: Some(port),
        secure: false,
        stream: false,
    })
}
