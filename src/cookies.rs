//! Per-origin cookie store.
//!
//! Cookies are kept in an `origin → ordered list` table, where the origin is
//! the server that *set* the cookie. A cookie's own `server` field names its
//! destination, which differs from the origin only for cross-site cookies.
//!
//! Within one origin no two cookies share a key; an overwrite keeps the
//! original position. The store is owned by the orchestrator task: ingest on
//! page arrival, select on request build, sweep and persist on exit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::protocol::{Cookie, PageRequest, SameSite};
use crate::vault::{Vault, VaultError};

#[derive(Debug, Error)]
pub enum JarError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("cookie jar is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// On-disk jar entry: one origin and its cookies.
#[derive(Debug, Serialize, Deserialize)]
struct ServerCookies {
    server: String,
    cookies: Vec<Cookie>,
}

#[derive(Debug, Default)]
pub struct CookieStore {
    jar: HashMap<String, Vec<Cookie>>,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.jar.values().map(Vec::len).sum()
    }

    /// Ingest the `set_cookies` of a page received from `origin`.
    ///
    /// Cookies with an empty destination get the origin filled in. A cookie
    /// whose key already exists under this origin is overwritten in place;
    /// new keys append.
    pub fn set_cookies(&mut self, origin: &str, set_cookies: &[Cookie]) {
        if set_cookies.is_empty() {
            return;
        }
        let entry = self.jar.entry(origin.to_string()).or_default();
        let mut novel = 0;
        for raw in set_cookies {
            let mut cookie = raw.clone();
            if cookie.server.is_empty() {
                cookie.server = origin.to_string();
            }
            match entry.iter().position(|c| c.key == cookie.key) {
                Some(i) => {
                    debug!(target: "cookies", key = %cookie.key, "overwriting existing cookie");
                    entry[i] = cookie;
                }
                None => {
                    novel += 1;
                    entry.push(cookie);
                }
            }
        }
        info!(
            target: "cookies",
            origin,
            total = entry.len(),
            novel,
            "set cookies from server"
        );
    }

    /// Select the cookies eligible for a request.
    ///
    /// Returns the cookies to place in the request body and the key/value
    /// pairs to attach as out-of-band metadata (cookies flagged `metadata`).
    pub fn outgoing(&self, pq: &PageRequest) -> (Vec<Cookie>, Vec<(String, String)>) {
        let now = Utc::now();
        let dest = pq.server.as_str();

        // Same-origin candidates first, then true cross-site cookies: stored
        // under another origin, destined here, and explicitly allowed to
        // travel (SameSite NONE + secure).
        let mut candidates: Vec<(&str, &Cookie)> = Vec::new();
        if let Some(cookies) = self.jar.get(dest) {
            candidates.extend(cookies.iter().map(|c| (dest, c)));
        }
        for (origin, cookies) in &self.jar {
            if origin == dest {
                continue;
            }
            for cookie in cookies {
                if cookie.server == dest && cookie.same_site == SameSite::None && cookie.secure {
                    candidates.push((origin.as_str(), cookie));
                } else if cookie.server == dest {
                    debug!(target: "cookies", key = %cookie.key, "cookie not allowed cross-site");
                }
            }
        }

        let mut body = Vec::new();
        let mut metadata = Vec::new();
        for (origin, cookie) in candidates {
            if cookie.private {
                continue;
            }
            if expired(&cookie.expires, now).unwrap_or(false) {
                continue;
            }
            if cookie.same_site == SameSite::Strict && origin != dest {
                continue;
            }
            if cookie.same_site == SameSite::None && !pq.secure {
                continue;
            }
            if !cookie.page.is_empty() && cookie.page != pq.name {
                continue;
            }
            if cookie.secure && !pq.secure {
                continue;
            }
            if cookie.metadata {
                metadata.push((cookie.key.clone(), cookie.value.clone()));
            } else {
                body.push(cookie.clone());
            }
        }
        (body, metadata)
    }

    /// Evict session cookies (empty or unparseable expiry) and anything past
    /// its expiry. Origins left empty disappear from the table.
    pub fn sweep(&mut self) {
        let now = Utc::now();
        let before = self.count();
        for cookies in self.jar.values_mut() {
            cookies.retain(|c| matches!(expired(&c.expires, now), Some(false)));
        }
        self.jar.retain(|_, cookies| !cookies.is_empty());
        debug!(target: "cookies", before, after = self.count(), "session sweep");
    }

    /// Sweep, then persist the surviving jar through the vault as JSON.
    pub fn save(&mut self, vault: &Vault) -> Result<(), JarError> {
        self.sweep();
        let jar: Vec<ServerCookies> = self
            .jar
            .iter()
            .map(|(server, cookies)| ServerCookies {
                server: server.clone(),
                cookies: cookies.clone(),
            })
            .collect();
        let payload = serde_json::to_vec(&jar)?;
        vault.write(&payload)?;
        info!(target: "cookies", origins = jar.len(), "stored cookies to vault");
        Ok(())
    }

    /// Populate the table from the vault blob.
    pub fn load(&mut self, vault: &Vault) -> Result<(), JarError> {
        let payload = vault.read()?;
        let jar: Vec<ServerCookies> = serde_json::from_slice(&payload)?;
        for entry in jar {
            self.jar.insert(entry.server, entry.cookies);
        }
        info!(target: "cookies", num_cookies = self.count(), "loaded cookies from vault");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn cookies_for(&self, origin: &str) -> &[Cookie] {
        self.jar.get(origin).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// `None` means the expiry is absent or unparseable (a session cookie).
fn expired(expires: &str, now: DateTime<Utc>) -> Option<bool> {
    if expires.is_empty() {
        return None;
    }
    // RFC 1123 dates parse with the RFC 2822 grammar.
    match DateTime::parse_from_rfc2822(expires) {
        Ok(t) => Some(now > t.with_timezone(&Utc)),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cookie(key: &str, value: &str) -> Cookie {
        Cookie {
            key: key.to_string(),
            value: value.to_string(),
            ..Cookie::default()
        }
    }

    fn future_expiry() -> String {
        (Utc::now() + Duration::days(7)).to_rfc2822()
    }

    fn request(server: &str, page: &str, secure: bool) -> PageRequest {
        PageRequest {
            name: page.to_string(),
            server: server.to_string(),
            port: 80,
            secure,
            ..PageRequest::default()
        }
    }

    #[test]
    fn empty_destination_defaults_to_origin() {
        let mut store = CookieStore::new();
        store.set_cookies("a.test", &[cookie("sid", "42")]);
        assert_eq!(store.cookies_for("a.test")[0].server, "a.test");
    }

    #[test]
    fn overwrite_preserves_position_and_uniqueness() {
        let mut store = CookieStore::new();
        store.set_cookies("a.test", &[cookie("one", "1"), cookie("two", "2")]);
        store.set_cookies("a.test", &[cookie("one", "updated")]);
        let cookies = store.cookies_for("a.test");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].key, "one");
        assert_eq!(cookies[0].value, "updated");
        assert_eq!(cookies[1].key, "two");
    }

    #[test]
    fn strict_cookie_stays_on_its_origin() {
        let mut store = CookieStore::new();
        let mut c = cookie("sid", "42");
        c.same_site = SameSite::Strict;
        store.set_cookies("a.test", &[c]);

        let (body, _) = store.outgoing(&request("a.test", "home", false));
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].value, "42");

        let (body, _) = store.outgoing(&request("b.test", "home", false));
        assert!(body.is_empty());
    }

    #[test]
    fn cross_site_requires_none_plus_secure_on_both_ends() {
        let mut store = CookieStore::new();
        let mut c = cookie("aid", "1");
        c.server = "b.test".to_string();
        c.same_site = SameSite::None;
        c.secure = true;
        store.set_cookies("a.test", &[c]);

        // over TLS the cookie travels to b
        let (body, _) = store.outgoing(&request("b.test", "home", true));
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].key, "aid");

        // over plain transport it does not
        let (body, _) = store.outgoing(&request("b.test", "home", false));
        assert!(body.is_empty());
    }

    #[test]
    fn page_restricted_cookie_only_matches_its_page() {
        let mut store = CookieStore::new();
        let mut c = cookie("p", "1");
        c.page = "inbox".to_string();
        store.set_cookies("a.test", &[c]);
        let (body, _) = store.outgoing(&request("a.test", "inbox", false));
        assert_eq!(body.len(), 1);
        let (body, _) = store.outgoing(&request("a.test", "home", false));
        assert!(body.is_empty());
    }

    #[test]
    fn private_and_expired_cookies_never_travel() {
        let mut store = CookieStore::new();
        let mut private = cookie("private", "x");
        private.private = true;
        let mut stale = cookie("stale", "y");
        stale.expires = (Utc::now() - Duration::days(1)).to_rfc2822();
        store.set_cookies("a.test", &[private, stale]);
        let (body, meta) = store.outgoing(&request("a.test", "home", false));
        assert!(body.is_empty());
        assert!(meta.is_empty());
    }

    #[test]
    fn unparseable_expiry_is_a_session_cookie() {
        let mut store = CookieStore::new();
        let mut c = cookie("odd", "1");
        c.expires = "not a date".to_string();
        store.set_cookies("a.test", &[c]);
        // session cookies still travel...
        let (body, _) = store.outgoing(&request("a.test", "home", false));
        assert_eq!(body.len(), 1);
        // ...but are evicted by the sweep
        store.sweep();
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn metadata_cookies_ride_out_of_band() {
        let mut store = CookieStore::new();
        let mut c = cookie("token", "abc");
        c.metadata = true;
        store.set_cookies("a.test", &[c]);
        let (body, meta) = store.outgoing(&request("a.test", "home", false));
        assert!(body.is_empty());
        assert_eq!(meta, vec![("token".to_string(), "abc".to_string())]);
    }

    #[test]
    fn secure_cookie_dropped_on_plain_request() {
        let mut store = CookieStore::new();
        let mut c = cookie("s", "1");
        c.secure = true;
        store.set_cookies("a.test", &[c]);
        let (body, _) = store.outgoing(&request("a.test", "home", false));
        assert!(body.is_empty());
        let (body, _) = store.outgoing(&request("a.test", "home", true));
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn save_then_load_round_trips_permanent_cookies() {
        let dir = std::env::temp_dir().join(format!(
            "uggcli_jar_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let vault = Vault::new(dir.join("jar.encrypted"), [3u8; crate::vault::KEY_LEN]);

        let mut store = CookieStore::new();
        let mut keeper = cookie("keep", "1");
        keeper.expires = future_expiry();
        store.set_cookies("a.test", &[keeper.clone(), cookie("session", "2")]);
        store.save(&vault).unwrap();

        let mut reloaded = CookieStore::new();
        reloaded.load(&vault).unwrap();
        let cookies = reloaded.cookies_for("a.test");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].key, "keep");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
