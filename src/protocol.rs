//! UGTP wire protocol types.
//!
//! Defines the message structures exchanged with an UGTP server. Frames on
//! the wire are length-delimited JSON; client→server frames are an
//! [`Envelope`] carrying one [`Request`], server→client frames are a
//! [`Response`]. All types derive `Serialize`/`Deserialize` and tolerate
//! missing fields with `#[serde(default)]` so old servers stay parseable.
//!
//! These are *wire* objects; the renderable counterparts live in `boxes`
//! and are produced by the `convert` module.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Client→server frame: one request plus out-of-band metadata.
///
/// `metadata` carries cookies flagged `metadata` as plain key/value headers
/// outside the request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub request: Request,
}

/// The three calls an UGTP server exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    GetPage(PageRequest),
    GetPageStream(PageRequest),
    GetFeed(FeedRequest),
}

/// Server→client frame.
///
/// A unary `GetPage` yields exactly one `Page` or `Error`. A streaming call
/// yields zero or more `Page` frames terminated by `StreamEnd` (or by the
/// transport closing).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Page(PageResponse),
    Feed(FeedResponse),
    Error(WireError),
    StreamEnd,
}

/// Application-level error reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    NoFeed,
    Internal,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageRequest {
    pub name: String,
    pub server: String,
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub client_width: u16,
    #[serde(default)]
    pub client_height: u16,
    #[serde(default)]
    pub send_cookies: Vec<Cookie>,
    #[serde(default)]
    pub form_data: Vec<FormData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedRequest {
    #[serde(default)]
    pub send_data: bool,
}

/// Collected contents of one submitted form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormData {
    pub name: String,
    #[serde(default)]
    pub text_box_data: Vec<TextBoxData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextBoxData {
    pub name: String,
    #[serde(default)]
    pub contents: String,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageResponse {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub div_boxes: Vec<DivBox>,
    #[serde(default)]
    pub elements: Elements,
    #[serde(default)]
    pub key_strokes: Vec<KeyStroke>,
    #[serde(default)]
    pub set_cookies: Vec<Cookie>,
    #[serde(default)]
    pub stream_delay_ms: u64,
}

/// Renderable elements of a page, grouped by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Elements {
    #[serde(default)]
    pub text_blobs: Vec<TextBlob>,
    #[serde(default)]
    pub forms: Vec<Form>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub pages: Vec<FeedPage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedPage {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Page entities
// ---------------------------------------------------------------------------

/// A named rectangle on the page, with optional border and fill.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DivBox {
    pub name: String,
    #[serde(default)]
    pub border: bool,
    #[serde(default)]
    pub border_w: u16,
    #[serde(default = "default_char")]
    pub border_char: char,
    #[serde(default)]
    pub border_st: Option<Style>,
    #[serde(default = "default_char")]
    pub fill_char: char,
    #[serde(default)]
    pub fill_st: Option<Style>,
    pub start_x: u16,
    pub start_y: u16,
    pub width: u16,
    pub height: u16,
}

fn default_char() -> char {
    ' '
}

/// A run of text mated to one or more divs by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextBlob {
    pub content: String,
    #[serde(default)]
    pub wrap: bool,
    #[serde(default)]
    pub style: Option<Style>,
    #[serde(default)]
    pub div_names: Vec<String>,
}

/// Foreground/background color names plus an attribute mask.
///
/// Color names resolve against the client's named color table; unresolved
/// or empty names fall back to the terminal default. `attr` is a decimal
/// bitmask (bold 1, blink 2, reverse 4, underline 8, dim 16, italic 32).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default)]
    pub fg: String,
    #[serde(default)]
    pub bg: String,
    #[serde(default)]
    pub attr: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Form {
    pub name: String,
    pub div_name: String,
    #[serde(default)]
    pub submit_link: Option<Link>,
    #[serde(default)]
    pub text_boxes: Vec<TextBox>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextBox {
    pub name: String,
    #[serde(default)]
    pub tab_order: u16,
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub description: String,
    pub position_x: u16,
    pub position_y: u16,
    #[serde(default)]
    pub height: u16,
    pub width: u16,
    #[serde(default)]
    pub style_cursor: Option<Style>,
    #[serde(default)]
    pub style_fill: Option<Style>,
    #[serde(default)]
    pub style_text: Option<Style>,
    #[serde(default)]
    pub style_description: Option<Style>,
    #[serde(default)]
    pub show_description: bool,
    #[serde(default)]
    pub password: bool,
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// A reference to a page, possibly on another server.
///
/// `server`/`port` may be absent ("partial" link); the browser completes
/// them against the current session before dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub page_name: String,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub stream: bool,
}

/// A key designator paired with the action it triggers.
///
/// The designator is either a printable rune (`"a"`) or a symbolic key name
/// (`"F1"`, `"Enter"`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStroke {
    pub key_stroke: String,
    pub action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Link(Link),
    FormActivation { form_name: String },
    DivScroll { div_name: String, delta: i32 },
}

// ---------------------------------------------------------------------------
// Cookies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub key: String,
    #[serde(default)]
    pub value: String,
    /// Destination server this cookie is sent to. Empty on receipt means
    /// "the origin that set it"; the store fills it in.
    #[serde(default)]
    pub server: String,
    /// RFC 1123 expiry; empty means a session cookie.
    #[serde(default)]
    pub expires: String,
    #[serde(default)]
    pub same_site: SameSite,
    #[serde(default)]
    pub secure: bool,
    /// Sent as an out-of-band header instead of a request body field.
    #[serde(default)]
    pub metadata: bool,
    /// If non-empty, sent only when the requested page name matches.
    #[serde(default)]
    pub page: String,
    /// Never sent; server-internal marker.
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SameSite {
    #[default]
    Strict,
    None,
}

impl PageRequest {
    /// Build a request from a completed link. Partial fields that were never
    /// filled become their zero values, which no server will match.
    pub fn from_link(link: &Link) -> Self {
        Self {
            name: link.page_name.clone(),
            server: link.server.clone().unwrap_or_default(),
            port: link.port.unwrap_or(0),
            secure: link.secure,
            stream: link.stream,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_round_trips() {
        let env = Envelope {
            metadata: HashMap::from([("sid".to_string(), "42".to_string())]),
            request: Request::GetPage(PageRequest {
                name: "home".to_string(),
                server: "example.test".to_string(),
                port: 443,
                secure: true,
                ..PageRequest::default()
            }),
        };
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        match back.request {
            Request::GetPage(pq) => {
                assert_eq!(pq.name, "home");
                assert_eq!(pq.port, 443);
                assert!(pq.secure);
            }
            other => panic!("unexpected request variant: {:?}", other),
        }
        assert_eq!(back.metadata.get("sid").map(String::as_str), Some("42"));
    }

    #[test]
    fn page_response_tolerates_missing_fields() {
        let pr: PageResponse = serde_json::from_str(r#"{"name":"home"}"#).unwrap();
        assert_eq!(pr.name, "home");
        assert!(pr.div_boxes.is_empty());
        assert!(pr.elements.forms.is_empty());
        assert_eq!(pr.stream_delay_ms, 0);
    }

    #[test]
    fn keystroke_action_is_tagged() {
        let json = r#"{"key_stroke":"F1","action":{"type":"form_activation","form_name":"address-bar"}}"#;
        let ks: KeyStroke = serde_json::from_str(json).unwrap();
        match ks.action {
            Action::FormActivation { ref form_name } => {
                assert_eq!(form_name, "address-bar")
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn same_site_wire_names_are_screaming() {
        let c: Cookie =
            serde_json::from_str(r#"{"key":"k","same_site":"NONE"}"#).unwrap();
        assert_eq!(c.same_site, SameSite::None);
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains(r#""same_site":"NONE""#));
    }
}
