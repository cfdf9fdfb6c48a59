//! Session: the single live RPC channel to an UGTP server.
//!
//! A session owns the current origin `(server, port, secure)` and the live
//! connection. Dialing happens on the first request to a new origin; the
//! connection is reused while the origin stays the same and replaced when it
//! changes. The TLS path uses a default client configuration with the
//! bundled web trust anchors; the plain path uses no credentials.
//!
//! Frames on the wire are length-delimited JSON (see `protocol`). A unary
//! call sends one envelope and reads one response. A streaming call hands
//! the connection to a reader task that pumps pages into a channel until the
//! server ends the stream or the context is cancelled.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, error, info, warn};

use crate::cex::FetchContext;
use crate::local_pages::STROKE_MAP;
use crate::protocol::{
    Action, Envelope, ErrorCode, FeedRequest, KeyStroke, Link, PageRequest, PageResponse,
    Request, Response,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection timeout")]
    Timeout,
    #[error("connection refused: {0}")]
    Refused(String),
    #[error("error getting page from server")]
    NotFound,
    #[error("connection cancelled")]
    Cancelled,
    #[error("no server connection")]
    NoConnection,
    #[error("server provides no feed")]
    NoFeed,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

enum Conn {
    Plain(Framed<TcpStream, LengthDelimitedCodec>),
    Tls(Box<Framed<tokio_rustls::client::TlsStream<TcpStream>, LengthDelimitedCodec>>),
}

impl Conn {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), SessionError> {
        let frame = serde_json::to_vec(envelope)
            .map_err(|e| SessionError::Refused(format!("encode error: {}", e)))?;
        let frame = Bytes::from(frame);
        match self {
            Conn::Plain(f) => f.send(frame).await,
            Conn::Tls(f) => f.send(frame).await,
        }
        .map_err(|e| SessionError::Refused(e.to_string()))
    }

    /// Read one response frame. `Ok(None)` means the peer closed cleanly.
    async fn recv(&mut self) -> Result<Option<Response>, SessionError> {
        let frame = match self {
            Conn::Plain(f) => f.next().await,
            Conn::Tls(f) => f.next().await,
        };
        match frame {
            None => Ok(None),
            Some(Err(e)) => Err(SessionError::Refused(e.to_string())),
            Some(Ok(bytes)) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| SessionError::Refused(format!("decode error: {}", e))),
        }
    }
}

/// Bound a fallible operation by a fetch context: cancellation wins
/// immediately, the deadline (if any) converts to `Timeout`.
async fn bounded<T, F>(ctx: &FetchContext, fut: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    tokio::pin!(fut);
    tokio::select! {
        _ = ctx.token.cancelled() => Err(SessionError::Cancelled),
        res = async {
            match ctx.timeout {
                Some(deadline) => match tokio::time::timeout(deadline, &mut fut).await {
                    Ok(res) => res,
                    Err(_) => Err(SessionError::Timeout),
                },
                None => fut.await,
            }
        } => res,
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Session {
    conn: Option<Conn>,
    pub server: String,
    pub port: u16,
    pub stream: bool,
    pub secure: bool,
    pub secured: bool,
    pub curr_page: String,
    pub client_width: u16,
    pub client_height: u16,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session's coordinates as a UGRI string.
    pub fn ugri(&self) -> String {
        let scheme = if self.secure { "ugtps" } else { "ugtp" };
        format!("{}://{}:{}/{}", scheme, self.server, self.port, self.curr_page)
    }

    pub fn set_server(&mut self, server: &str, port: u16, secure: bool) {
        self.server = server.to_string();
        self.port = port;
        self.secure = secure;
    }

    /// Dial the current origin. Blocks until the transport handshake
    /// completes, bounded by the context. A failed secure dial clears the
    /// secure flag so retries do not silently re-attempt TLS.
    async fn get_connection(&mut self, ctx: &FetchContext) -> Result<(), SessionError> {
        let addr = format!("{}:{}", self.server, self.port);
        info!(target: "session", conn_string = %addr, secure = self.secure, "dialing server");
        let res = bounded(ctx, self.dial(&addr)).await;
        match res {
            Ok(conn) => {
                self.secured = self.secure;
                self.conn = Some(conn);
                info!(target: "session", conn_string = %addr, "connection successful");
                Ok(())
            }
            Err(e) => {
                error!(target: "session", conn_string = %addr, "fail to dial: {}", e);
                if self.secure {
                    self.secure = false;
                }
                Err(e)
            }
        }
    }

    async fn dial(&self, addr: &str) -> Result<Conn, SessionError> {
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| SessionError::Refused(e.to_string()))?;
        if !self.secure {
            return Ok(Conn::Plain(Framed::new(tcp, LengthDelimitedCodec::new())));
        }
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));
        let domain = ServerName::try_from(self.server.clone())
            .map_err(|e| SessionError::Refused(format!("bad server name: {}", e)))?;
        let tls = connector
            .connect(domain, tcp)
            .await
            .map_err(|e| SessionError::Refused(e.to_string()))?;
        Ok(Conn::Tls(Box::new(Framed::new(
            tls,
            LengthDelimitedCodec::new(),
        ))))
    }

    /// Reuse the live connection when the request targets the current
    /// origin; otherwise re-point the session and dial.
    async fn prep(&mut self, ctx: &FetchContext, pq: &PageRequest) -> Result<(), SessionError> {
        if pq.server == self.server
            && pq.port == self.port
            && pq.secure == self.secure
            && self.conn.is_some()
        {
            debug!(target: "session", "request for same origin, reusing connection");
            return Ok(());
        }
        info!(target: "session", "request for new origin, establishing new connection");
        self.set_server(&pq.server, pq.port, pq.secure);
        self.get_connection(ctx).await
    }

    /// Unary page fetch.
    pub async fn get(
        &mut self,
        ctx: &FetchContext,
        pq: PageRequest,
        metadata: std::collections::HashMap<String, String>,
    ) -> Result<PageResponse, SessionError> {
        self.prep(ctx, &pq).await?;
        let name = pq.name.clone();
        let envelope = Envelope {
            metadata,
            request: Request::GetPage(pq),
        };
        let conn = self.conn.as_mut().ok_or(SessionError::NoConnection)?;
        let res = bounded(ctx, async {
            conn.send(&envelope).await?;
            match conn.recv().await? {
                Some(Response::Page(page)) => Ok(page),
                Some(Response::Error(e)) => {
                    error!(target: "session", code = ?e.code, "error getting page from server: {}", e.message);
                    Err(SessionError::NotFound)
                }
                Some(other) => {
                    error!(target: "session", "unexpected response frame: {:?}", other);
                    Err(SessionError::NotFound)
                }
                None => Err(SessionError::Refused("connection closed".to_string())),
            }
        })
        .await;
        match res {
            Ok(page) => {
                self.curr_page = name;
                self.stream = false;
                Ok(page)
            }
            Err(e) => {
                // a half-finished exchange poisons the framed stream
                if !matches!(e, SessionError::NotFound) {
                    self.conn = None;
                }
                self.curr_page = name;
                Err(e)
            }
        }
    }

    /// Streaming page fetch. Returns a channel of pages; a dedicated task
    /// owns the connection until the server ends the stream or the context
    /// is cancelled, then closes the channel.
    pub async fn get_stream(
        &mut self,
        ctx: &FetchContext,
        pq: PageRequest,
        metadata: std::collections::HashMap<String, String>,
    ) -> Result<mpsc::Receiver<PageResponse>, SessionError> {
        self.prep(ctx, &pq).await?;
        let name = pq.name.clone();
        let envelope = Envelope {
            metadata,
            request: Request::GetPageStream(pq),
        };
        // The reader task consumes the connection; the next fetch re-dials.
        let mut conn = self.conn.take().ok_or(SessionError::NoConnection)?;
        bounded(ctx, conn.send(&envelope)).await?;
        self.curr_page = name;
        self.stream = true;

        let (tx, rx) = mpsc::channel(1);
        let token = ctx.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!(target: "session", "stream context cancelled");
                        return;
                    }
                    frame = conn.recv() => match frame {
                        Ok(Some(Response::Page(page))) => {
                            if tx.send(page).await.is_err() {
                                return;
                            }
                        }
                        Ok(Some(Response::StreamEnd)) | Ok(None) => {
                            info!(target: "session", "page stream ended");
                            return;
                        }
                        Ok(Some(other)) => {
                            warn!(target: "session", "unexpected frame in stream: {:?}", other);
                        }
                        Err(e) => {
                            error!(target: "session", "stream read error: {}", e);
                            return;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    /// Ask the current server for its feed and synthesize one link binding
    /// per page, keyed along the 35-key roster.
    pub async fn feed_key_strokes(
        &mut self,
        ctx: &FetchContext,
    ) -> Result<Vec<KeyStroke>, SessionError> {
        let conn = self.conn.as_mut().ok_or(SessionError::NoConnection)?;
        let envelope = Envelope {
            metadata: Default::default(),
            request: Request::GetFeed(FeedRequest { send_data: true }),
        };
        info!(target: "session", "requesting feed from server");
        let res = bounded(ctx, async {
            conn.send(&envelope).await?;
            match conn.recv().await? {
                Some(Response::Feed(feed)) => Ok(feed),
                Some(Response::Error(e)) if e.code == ErrorCode::NoFeed => {
                    Err(SessionError::NoFeed)
                }
                Some(other) => {
                    error!(target: "session", "unexpected response frame: {:?}", other);
                    Err(SessionError::NoFeed)
                }
                None => Err(SessionError::NoConnection),
            }
        })
        .await;
        let feed = match res {
            Ok(feed) => feed,
            Err(e) => {
                if matches!(e, SessionError::Refused(_)) {
                    self.conn = None;
                    return Err(SessionError::NoConnection);
                }
                return Err(e);
            }
        };
        let mut key_strokes = Vec::new();
        for (page, stroke) in feed.pages.iter().zip(STROKE_MAP) {
            key_strokes.push(KeyStroke {
                key_stroke: (*stroke).to_string(),
                action: Action::Link(Link {
                    page_name: page.name.clone(),
                    server: Some(self.server.clone()),
                    port: Some(self.port),
                    secure: false,
                    stream: false,
                }),
            });
        }
        debug!(target: "session", count = key_strokes.len(), "feed key strokes built");
        Ok(key_strokes)
    }

    pub fn has_connection(&self) -> bool {
        self.conn.is_some()
    }

    /// Complete a possibly-partial link against this session: missing
    /// server/port fill from the session, and a link pointing back at the
    /// session's own origin inherits its secure flag. Idempotent for a
    /// fixed session.
    pub fn complete_link(&self, partial: &Link) -> Link {
        let mut full = Link {
            page_name: partial.page_name.clone(),
            server: Some(
                partial
                    .server
                    .clone()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| self.server.clone()),
            ),
            port: Some(partial.port.unwrap_or(self.port)),
            secure: partial.secure,
            stream: partial.stream,
        };
        if full.server.as_deref() == Some(self.server.as_str()) && full.port == Some(self.port) {
            full.secure = self.secure;
        }
        full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sess() -> Session {
        let mut s = Session::new();
        s.set_server("example.test", 8888, true);
        s
    }

    #[test]
    fn partial_links_fill_from_the_session() {
        let s = sess();
        let full = s.complete_link(&Link {
            page_name: "home".to_string(),
            ..Link::default()
        });
        assert_eq!(full.server.as_deref(), Some("example.test"));
        assert_eq!(full.port, Some(8888));
        // same origin inherits the session's secure flag
        assert!(full.secure);
    }

    #[test]
    fn foreign_links_keep_their_own_coordinates() {
        let s = sess();
        let full = s.complete_link(&Link {
            page_name: "away".to_string(),
            server: Some("other.test".to_string()),
            port: Some(9999),
            secure: false,
            stream: false,
        });
        assert_eq!(full.server.as_deref(), Some("other.test"));
        assert!(!full.secure);
    }

    #[test]
    fn completion_is_idempotent() {
        let s = sess();
        for partial in [
            Link {
                page_name: "home".to_string(),
                ..Link::default()
            },
            Link {
                page_name: "away".to_string(),
                server: Some("other.test".to_string()),
                port: Some(9999),
                secure: true,
                stream: true,
            },
        ] {
            let once = s.complete_link(&partial);
            let twice = s.complete_link(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn ugri_reflects_the_scheme() {
        let mut s = sess();
        s.curr_page = "home".to_string();
        assert_eq!(s.ugri(), "ugtps://example.test:8888/home");
        s.secure = false;
        assert_eq!(s.ugri(), "ugtp://example.test:8888/home");
    }
}
