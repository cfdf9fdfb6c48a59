//! The browser orchestrator.
//!
//! A single task owns all mutable engine state: the current page, chrome,
//! forms, keystroke tables, cookie store, settings and the terminal
//! surface. Peripheral tasks (terminal event poller, context vendor,
//! stream reader) communicate with it over channels; the main loop selects
//! over those channels and dispatches.
//!
//! Keystroke routing: reserved chrome keys dispatch internally, everything
//! else is matched against the active binding table (menu bindings are
//! persistent, page bindings are rebuilt per page). Network errors never
//! crash the loop; they become status-bar messages.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::boxes::DivBox;
use crate::cex::{self, CexHandle};
use crate::convert;
use crate::cookies::CookieStore;
use crate::forms::{Form, PollOutcome, SubmitAction};
use crate::local_pages::{
    self, ADDRESS_BAR_FORM, BOOKMARKS_PAGE, COLOR_DEMO_PAGE, FEED_PAGE, SETTINGS_FORM,
    SETTINGS_PAGE,
};
use crate::protocol::{Action, FormData, KeyStroke, Link, PageRequest, PageResponse, TextBoxData};
use crate::session::{Session, SessionError};
use crate::settings::Settings;
use crate::terminal::{self, Screen, UiEvent};
use crate::ugri;
use crate::vault::{Vault, VaultError};

/// Height of the chrome band: menu, address bar, status line.
pub const MENU_HEIGHT: u16 = 3;
/// Quiet period after the last resize event before the viewport updates.
const RESIZE_DELAY: Duration = Duration::from_millis(500);
/// The terminal's opening size events are ignored for this long.
const STARTUP_RESIZE_IGNORE: Duration = Duration::from_secs(5);
/// Inter-frame delay for streams that do not declare one.
const DEFAULT_STREAM_DELAY: Duration = Duration::from_millis(500);

/// Inter-frame delay for a stream page: the declared delay, or the default
/// when the page declares none.
pub fn stream_frame_delay(declared_ms: u64) -> Duration {
    if declared_ms == 0 {
        DEFAULT_STREAM_DELAY
    } else {
        Duration::from_millis(declared_ms)
    }
}

/// What woke the main loop.
enum Wake {
    Event(UiEvent),
    Message(String),
    StreamPage(Option<PageResponse>),
    ResizeFire,
    Interrupt,
}

pub struct Browser {
    screen: Screen,
    sess: Session,
    cookies: CookieStore,
    settings: Settings,
    settings_file: PathBuf,
    cex: CexHandle,
    interrupt: CancellationToken,
    events_rx: mpsc::Receiver<UiEvent>,
    events_tx: mpsc::Sender<UiEvent>,
    msg_rx: mpsc::Receiver<String>,

    content_menu: Vec<DivBox>,
    content_ext: Vec<DivBox>,
    forms: Vec<Form>,
    menu_forms: Vec<Form>,
    active_key_strokes: Vec<KeyStroke>,
    menu_key_strokes: Vec<KeyStroke>,
    current_page: Option<PageResponse>,
    /// Set only when the current page was locally generated; drives refresh.
    current_page_local: Option<String>,
    messages: Vec<String>,
    exit_messages: Vec<String>,
    exit_code: Option<i32>,

    vw: u16,
    vh: u16,
    started_at: Instant,
    resize_deadline: Option<Instant>,
    resize_dims: (u16, u16),
    stream_rx: Option<mpsc::Receiver<PageResponse>>,
    stream_next_at: Option<Instant>,
}

impl Browser {
    /// Initialize the terminal and task plumbing, fetch the bootstrap URL
    /// if one was given, then run the main event loop until exit.
    ///
    /// Returns the exit code; exit messages are printed after the terminal
    /// has been restored.
    pub async fn run(
        settings: Settings,
        settings_file: PathBuf,
        bootstrap: Option<String>,
    ) -> Result<i32> {
        let screen = Screen::new()?;
        let interrupt = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(64);
        let (msg_tx, msg_rx) = mpsc::channel(64);
        let cex = cex::start(msg_tx, interrupt.clone());
        terminal::spawn_event_poller(events_tx.clone(), cex.cancel.clone(), interrupt.clone());

        let (vw, vh) = screen.size();
        let mut browser = Browser {
            screen,
            sess: Session::new(),
            cookies: CookieStore::new(),
            settings,
            settings_file,
            cex,
            interrupt,
            events_rx,
            events_tx,
            msg_rx,
            content_menu: Vec::new(),
            content_ext: Vec::new(),
            forms: Vec::new(),
            menu_forms: Vec::new(),
            active_key_strokes: Vec::new(),
            menu_key_strokes: Vec::new(),
            current_page: None,
            current_page_local: None,
            messages: Vec::new(),
            exit_messages: Vec::new(),
            exit_code: None,
            vw,
            vh,
            started_at: Instant::now(),
            resize_deadline: None,
            resize_dims: (vw, vh),
            stream_rx: None,
            stream_next_at: None,
        };
        browser.sess.client_width = vw;
        browser.sess.client_height = vh;
        browser.load_cookies();
        browser.bootstrap(bootstrap).await;
        let code = browser.main_loop().await;

        browser.screen.fini();
        for message in &browser.exit_messages {
            println!("{}", message);
        }
        Ok(code)
    }

    async fn bootstrap(&mut self, bootstrap: Option<String>) {
        match bootstrap {
            Some(raw) => match ugri::link_from_string(&raw) {
                Ok(link) => {
                    self.sess.set_server(
                        link.server.as_deref().unwrap_or_default(),
                        link.port.unwrap_or(0),
                        link.secure,
                    );
                    self.sess.curr_page = link.page_name.clone();
                    self.sess.stream = link.stream;
                    info!(target: "browser", "getting bootstrap page from server");
                    self.get2(PageRequest::from_link(&link)).await;
                }
                Err(e) => {
                    warn!(target: "browser", ugri = %raw, "bad bootstrap UGRI: {}", e);
                    self.message("error parsing UGRI");
                }
            },
            None => {
                info!(target: "browser", "no start link, starting blank");
                self.message("enter an address with F1");
            }
        }
    }

    async fn main_loop(&mut self) -> i32 {
        loop {
            if let Some(code) = self.exit_code {
                return code;
            }
            let wake = {
                let events = &mut self.events_rx;
                let msgs = &mut self.msg_rx;
                let stream = &mut self.stream_rx;
                let gate = self.stream_next_at;
                let resize_at = self.resize_deadline;
                tokio::select! {
                    _ = self.interrupt.cancelled() => Wake::Interrupt,
                    Some(ev) = events.recv() => Wake::Event(ev),
                    Some(msg) = msgs.recv() => Wake::Message(msg),
                    page = async {
                        if let Some(at) = gate {
                            tokio::time::sleep_until(at).await;
                        }
                        match stream.as_mut() {
                            Some(rx) => rx.recv().await,
                            None => None,
                        }
                    }, if stream.is_some() => Wake::StreamPage(page),
                    _ = async {
                        tokio::time::sleep_until(resize_at.expect("guarded")).await
                    }, if resize_at.is_some() => Wake::ResizeFire,
                }
            };
            match wake {
                Wake::Interrupt => return self.exit_code.unwrap_or(0),
                Wake::Event(ev) => self.handle_event(ev).await,
                Wake::Message(msg) => self.message(msg),
                Wake::StreamPage(page) => self.handle_stream_page(page).await,
                Wake::ResizeFire => self.finish_resize().await,
            }
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    async fn handle_event(&mut self, ev: UiEvent) {
        match ev {
            UiEvent::Key(key) => self.handle_key(key).await,
            UiEvent::Resize(w, h) => {
                if self.started_at.elapsed() < STARTUP_RESIZE_IGNORE {
                    debug!(target: "browser", "ignoring startup resize event");
                    return;
                }
                self.resize_dims = (w, h);
                self.resize_deadline = Some(Instant::now() + RESIZE_DELAY);
            }
            UiEvent::Reload => {
                debug!(
                    target: "browser",
                    key_strokes = self.active_key_strokes.len(),
                    "reloaded keystrokes"
                );
            }
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        // reserved chrome keys dispatch internally; the poller has already
        // cancelled any in-flight fetch for them
        match key.code {
            KeyCode::F(10) => {
                self.exit(0);
                return;
            }
            KeyCode::F(2) => {
                self.color_demo();
                return;
            }
            KeyCode::F(3) => {
                self.settings_page("");
                return;
            }
            KeyCode::F(4) => {
                self.get_feed().await;
                return;
            }
            KeyCode::F(5) => {
                self.refresh().await;
                return;
            }
            KeyCode::F(6) => {
                self.bookmarks_page();
                return;
            }
            KeyCode::F(7) => {
                self.bookmark_add();
                return;
            }
            _ => {}
        }

        let matched = self.match_key_stroke(&key);
        if let Some(ks) = matched {
            self.key_stroke_router(ks).await;
        }
    }

    fn match_key_stroke(&self, key: &KeyEvent) -> Option<KeyStroke> {
        let symbolic = terminal::key_name(key);
        let rune = terminal::key_rune(key).map(|c| c.to_string());
        for ks in &self.active_key_strokes {
            let hit = match (&symbolic, &rune) {
                (Some(name), _) if *name == ks.key_stroke => true,
                (None, Some(r)) if *r == ks.key_stroke => true,
                _ => false,
            };
            if hit {
                info!(target: "browser", key = %ks.key_stroke, "sending expected key to router");
                return Some(ks.clone());
            }
        }
        None
    }

    /// Dispatch a matched binding by action variant.
    async fn key_stroke_router(&mut self, ks: KeyStroke) {
        match ks.action {
            Action::Link(link) => {
                if self.is_local(&link) {
                    self.local_link_router(&link);
                } else {
                    let full = self.sess.complete_link(&link);
                    self.get2(PageRequest::from_link(&full)).await;
                }
            }
            Action::FormActivation { form_name } => {
                info!(target: "browser", form = %form_name, "form activation, passing control");
                self.pass_form(&form_name).await;
            }
            Action::DivScroll { div_name, delta } => {
                let moved = self
                    .content_ext
                    .iter_mut()
                    .find(|d| d.name == div_name)
                    .map(|d| d.scroll(delta))
                    .unwrap_or(0);
                debug!(target: "browser", div = %div_name, moved, "div scroll");
                if moved > 0 {
                    self.draw_content();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Fetching
    // ------------------------------------------------------------------

    /// Issue a unary or streaming fetch for the request, with cookies
    /// attached, and accept the result into the browser.
    async fn get2(&mut self, mut pq: PageRequest) {
        // navigating away ends any active stream
        self.stream_rx = None;
        self.stream_next_at = None;

        pq.client_width = self.vw;
        pq.client_height = self.vh;
        let dest = format!("{}:{}", pq.server, pq.port);
        self.message(format!("dialing server '{}'...", dest));

        if pq.stream {
            let ctx = self.cex.request("stream").await;
            let (body, metadata) = self.cookies.outgoing(&pq);
            pq.send_cookies = body;
            let metadata: HashMap<String, String> = metadata.into_iter().collect();
            match self.sess.get_stream(&ctx, pq, metadata).await {
                Ok(rx) => {
                    self.stream_rx = Some(rx);
                    self.current_page_local = None;
                    self.message("connected to stream!");
                }
                Err(e) => self.network_error(e, &dest),
            }
        } else {
            let ctx = self.cex.request("page").await;
            let (body, metadata) = self.cookies.outgoing(&pq);
            pq.send_cookies = body;
            let name = pq.name.clone();
            let metadata: HashMap<String, String> = metadata.into_iter().collect();
            match self.sess.get(&ctx, pq, metadata).await {
                Ok(page) => {
                    self.message("connected!");
                    self.current_page_local = None;
                    self.accept_page(page);
                }
                Err(SessionError::NotFound) => {
                    let msg = format!("error getting page '{}' from server", name);
                    error!(target: "browser", "{}", msg);
                    self.message(msg);
                }
                Err(e) => self.network_error(e, &dest),
            }
        }
    }

    fn network_error(&mut self, err: SessionError, dest: &str) {
        let msg = match err {
            SessionError::Timeout => format!("connection timeout to '{}'", dest),
            SessionError::Refused(ref detail) => {
                debug!(target: "browser", "refused: {}", detail);
                "connection refused".to_string()
            }
            SessionError::Cancelled => "connection cancelled".to_string(),
            SessionError::NoConnection => "unable to connect to server".to_string(),
            SessionError::NoFeed => "server provides no feed".to_string(),
            SessionError::NotFound => "error getting page from server".to_string(),
        };
        error!(target: "browser", "{}", msg);
        self.message(msg);
    }

    /// Accept a freshly fetched remote page: ingest cookies, swap the
    /// current page, rebuild forms and bindings, redraw.
    fn accept_page(&mut self, page: PageResponse) {
        self.cookies
            .set_cookies(&self.sess.server.clone(), &page.set_cookies);
        self.current_page = Some(page);
        self.build_draw();
    }

    async fn handle_stream_page(&mut self, page: Option<PageResponse>) {
        match page {
            Some(page) => {
                let delay = stream_frame_delay(page.stream_delay_ms);
                info!(target: "browser", "got page from stream, drawing");
                self.cookies
                    .set_cookies(&self.sess.server.clone(), &page.set_cookies);
                self.current_page = Some(page);
                self.current_page_local = None;
                self.build_draw();
                self.stream_next_at = Some(Instant::now() + delay);
            }
            None => {
                self.stream_rx = None;
                self.stream_next_at = None;
                self.message("stream ended");
            }
        }
    }

    /// Re-drive the current page: remote pages re-issue the last fetch,
    /// local pages rebuild from current state.
    async fn refresh(&mut self) {
        match self.current_page_local.as_deref() {
            None => {
                let link = Link {
                    page_name: self.sess.curr_page.clone(),
                    server: Some(self.sess.server.clone()),
                    port: Some(self.sess.port),
                    secure: self.sess.secure,
                    stream: self.sess.stream,
                };
                info!(target: "browser", "refreshing page from server");
                self.get2(PageRequest::from_link(&link)).await;
            }
            Some(COLOR_DEMO_PAGE) => self.color_demo(),
            Some(FEED_PAGE) => self.get_feed().await,
            Some(SETTINGS_PAGE) => {
                self.settings = Settings::load(&self.settings_file);
                self.settings_page("");
            }
            Some(BOOKMARKS_PAGE) => self.bookmarks_page(),
            Some(other) => {
                debug!(target: "browser", page = %other, "refresh for unknown local page")
            }
        }
    }

    async fn get_feed(&mut self) {
        info!(target: "browser", "getting feed");
        let ctx = self.cex.request("page").await;
        match self.sess.feed_key_strokes(&ctx).await {
            Ok(key_strokes) => {
                info!(target: "browser", "building feed");
                let page = local_pages::build_feed_browser(self.vw, &key_strokes);
                self.current_page_local = Some(page.name.clone());
                self.current_page = Some(page);
            }
            Err(SessionError::NoConnection) => self.message("unable to connect to server"),
            Err(SessionError::NoFeed) => self.message("server provides no feed"),
            Err(e) => self.network_error(e, &self.sess.server.clone()),
        }
        // regardless, redraw
        self.build_draw();
    }

    // ------------------------------------------------------------------
    // Local pages
    // ------------------------------------------------------------------

    fn color_demo(&mut self) {
        let page = local_pages::build_color_demo(self.vw, self.vh);
        self.current_page_local = Some(page.name.clone());
        self.current_page = Some(page);
        self.message("locally generated color demo");
        self.build_draw();
    }

    fn settings_page(&mut self, info_msg: &str) {
        info!(target: "browser", "building settings page");
        let page = local_pages::build_settings(self.vw, self.vh, &self.settings, info_msg);
        self.current_page_local = Some(page.name.clone());
        self.current_page = Some(page);
        self.message("Local Settings");
        self.build_draw();
    }

    fn bookmarks_page(&mut self) {
        info!(target: "browser", "building bookmarks page");
        let page = local_pages::build_bookmarks(self.vw, self.vh, &self.settings);
        self.current_page_local = Some(page.name.clone());
        self.current_page = Some(page);
        self.message("Bookmarks Browser");
        self.build_draw();
    }

    fn bookmark_add(&mut self) {
        let ugri = self.sess.ugri();
        self.settings.add_bookmark("", &ugri);
        info!(target: "browser", ugri = %ugri, "adding bookmark");
        let mut msg = format!("added bookmark: '{}'", ugri);
        if let Err(e) = self.settings.save(&self.settings_file) {
            error!(target: "browser", "error adding bookmark: {}", e);
            msg = "error adding bookmark, check log".to_string();
        }
        self.message(msg);
    }

    // ------------------------------------------------------------------
    // Local link routing
    // ------------------------------------------------------------------

    /// A link is local iff a trusted local page embedded the per-process
    /// auth token into its name.
    fn is_local(&self, link: &Link) -> bool {
        link.page_name.contains(local_pages::local_auth_token())
    }

    fn local_link_router(&mut self, link: &Link) {
        if !self.is_local(link) {
            return;
        }
        info!(target: "browser", "processing local link");
        if link.page_name.contains("bookmark_delete") {
            let uid = link.page_name.split('_').nth(2).and_then(|s| s.parse().ok());
            match uid {
                Some(uid) if self.settings.delete_bookmark(uid) => {
                    let mut info_msg = "bookmark deleted".to_string();
                    if let Err(e) = self.settings.save(&self.settings_file) {
                        error!(target: "browser", "error saving settings: {}", e);
                        info_msg.push_str(", error saving settings to disk");
                    }
                    self.message(info_msg.clone());
                    self.settings_page(&info_msg);
                }
                _ => self.message("bookmark not deleted, could not find"),
            }
        }
    }

    // ------------------------------------------------------------------
    // Forms
    // ------------------------------------------------------------------

    /// Hand control to the named form. Blocks the orchestrator until the
    /// form closes; the form is modal by design.
    async fn pass_form(&mut self, name: &str) {
        let ctx = self.cex.request("form").await;
        let Some(idx) = self.forms.iter().position(|f| f.name == name) else {
            warn!(target: "browser", form = %name, "form activation for unknown form");
            return;
        };
        let outcome = {
            let form = &mut self.forms[idx];
            form.poll(&ctx, &self.interrupt, &mut self.events_rx, &mut self.screen)
                .await
        };
        debug!(target: "browser", "polling passed back to main");
        match outcome {
            PollOutcome::Submitted => {
                let snapshot = self.forms[idx].clone();
                self.process_form_submission(snapshot).await;
            }
            PollOutcome::Cancelled => {
                // clear the form's cursor artifacts
                self.draw_content();
            }
        }
    }

    async fn process_form_submission(&mut self, form: Form) {
        if form.name == ADDRESS_BAR_FORM {
            let contents = form.collect();
            let input = contents.get("connstring").map(String::as_str).unwrap_or("");
            match self.process_address_bar_input(input) {
                Ok(link) => {
                    info!(
                        target: "browser",
                        page = %link.page_name,
                        "dialing form submitted server"
                    );
                    self.get2(PageRequest::from_link(&link)).await;
                }
                Err(_) => self.message("error parsing UGRI"),
            }
        } else if form.name == SETTINGS_FORM && self.current_page_local.is_some() {
            // a remote page reusing the settings form name is not trusted
            debug!(target: "browser", "detected settings submission");
            let changed = self.settings.apply_form(&form.collect());
            let mut info_msg = if changed {
                "saved settings"
            } else {
                "no settings were changed"
            }
            .to_string();
            if let Err(e) = self.settings.save(&self.settings_file) {
                error!(target: "browser", "error saving settings: {}", e);
                info_msg = "error saving settings to disk".to_string();
            }
            self.message(info_msg.clone());
            self.settings_page(&info_msg);
        } else {
            match &form.submit {
                SubmitAction::Link(link) => {
                    let full = self.sess.complete_link(link);
                    let mut pq = PageRequest::from_link(&full);
                    let data = form.collect();
                    pq.form_data = vec![FormData {
                        name: form.name.clone(),
                        text_box_data: data
                            .into_iter()
                            .map(|(name, contents)| TextBoxData { name, contents })
                            .collect(),
                    }];
                    self.get2(pq).await;
                }
                SubmitAction::LocalHook(hook) => {
                    warn!(target: "browser", hook = %hook, "dropping submit with no handler");
                }
            }
        }
    }

    /// Parse user-typed address bar contents into a link. A leading `->`
    /// on the page segment requests streaming mode.
    fn process_address_bar_input(&self, input: &str) -> Result<Link, ugri::ParseError> {
        info!(target: "browser", submission = %input, "got address bar submission");
        let mut link = ugri::link_from_string(input)?;
        if link.page_name.contains("->") {
            info!(target: "browser", "detected '->' in submitted link, converting to stream");
            link.page_name = link.page_name.replace("->", "");
            link.stream = true;
        }
        Ok(link)
    }

    // ------------------------------------------------------------------
    // Chrome, forms and keystroke tables
    // ------------------------------------------------------------------

    /// Append a status message and rebuild the chrome band around it.
    fn message(&mut self, msg: impl Into<String>) {
        self.messages.push(msg.into());
        self.build_content_menu();
    }

    /// Rebuild the chrome from current state (menu text, address bar,
    /// latest status message), then re-attach the current page's forms and
    /// bindings and redraw.
    fn build_content_menu(&mut self) {
        let msg = self.messages.last().cloned().unwrap_or_default();
        let menu_page = local_pages::build_page_menu(
            self.vw,
            MENU_HEIGHT,
            &self.sess.server,
            self.sess.port,
            &self.sess.curr_page,
            &msg,
            self.sess.secure,
        );
        self.parse_key_strokes(&menu_page, true);
        self.process_page_forms(&menu_page, true);
        self.content_menu = convert::page_boxes(&menu_page);

        if let Some(page) = self.current_page.take() {
            self.process_page_forms(&page, false);
            self.parse_key_strokes(&page, false);
            self.current_page = Some(page);
        }
        self.draw_content();
    }

    /// Rasterize the current page and redraw everything.
    fn build_draw(&mut self) {
        self.content_ext = self
            .current_page
            .as_ref()
            .map(convert::page_boxes)
            .unwrap_or_default();
        if let Some(page) = self.current_page.take() {
            self.process_page_forms(&page, false);
            self.parse_key_strokes(&page, false);
            self.current_page = Some(page);
        }
        self.screen.clear();
        self.draw_content();
    }

    /// Rebuild the form list from a page. Menu forms persist across page
    /// navigations and are re-attached at the end.
    fn process_page_forms(&mut self, page: &PageResponse, is_menu: bool) {
        self.forms.clear();
        if is_menu {
            self.menu_forms.clear();
        }
        for wire_form in &page.elements.forms {
            let mut form = Form::from_wire(wire_form);
            // shift from div-relative to absolute coordinates; non-menu
            // forms additionally clear the chrome band
            for div in &page.div_boxes {
                if div.name == wire_form.div_name {
                    let mut sy = i32::from(div.start_y) + i32::from(div.border_w);
                    if !is_menu {
                        sy += i32::from(MENU_HEIGHT);
                    }
                    form.shift_xy(i32::from(div.start_x), sy);
                }
            }
            if is_menu {
                self.menu_forms.push(form);
            } else {
                self.forms.push(form);
            }
        }
        // always add back the menu forms
        self.forms.extend(self.menu_forms.iter().cloned());
        debug!(
            target: "browser",
            forms = self.forms.len(),
            menu_forms = self.menu_forms.len(),
            "form lists rebuilt"
        );
    }

    /// Rebuild the keystroke tables from a page. The effective table is
    /// page bindings followed by the persistent menu bindings.
    fn parse_key_strokes(&mut self, page: &PageResponse, is_menu: bool) {
        if is_menu {
            self.menu_key_strokes.clear();
        }
        self.active_key_strokes.clear();
        for ks in &page.key_strokes {
            let mut ks = ks.clone();
            if let Action::Link(link) = &ks.action {
                // complete partial links while the session still matches
                if !self.is_local(link) {
                    ks.action = Action::Link(self.sess.complete_link(link));
                }
            }
            if is_menu {
                self.menu_key_strokes.push(ks);
            } else {
                self.active_key_strokes.push(ks);
            }
        }
        self.active_key_strokes
            .extend(self.menu_key_strokes.iter().cloned());
        // synthetic event so the poller notices the new table
        let _ = self.events_tx.try_send(UiEvent::Reload);
        debug!(
            target: "browser",
            active = self.active_key_strokes.len(),
            "keystroke table rebuilt"
        );
    }

    /// Compose chrome and page content onto the terminal, then overlay
    /// forms. Page divs are offset below the chrome band; there is no
    /// z-ordering beyond list order.
    fn draw_content(&mut self) {
        if self.exit_code.is_some() {
            return;
        }
        let viewport = (self.vw, self.vh);
        for div in &self.content_menu {
            draw_div(&mut self.screen, div, 0, viewport);
        }
        for div in &self.content_ext {
            draw_div(&mut self.screen, div, MENU_HEIGHT, viewport);
        }
        for form in &self.forms {
            form.draw(&mut self.screen);
        }
        self.screen.show();
        debug!(
            target: "browser",
            forms = self.forms.len(),
            menu_boxes = self.content_menu.len(),
            ext_boxes = self.content_ext.len(),
            "draw stats"
        );
    }

    // ------------------------------------------------------------------
    // Resize
    // ------------------------------------------------------------------

    async fn finish_resize(&mut self) {
        self.resize_deadline = None;
        let (w, h) = self.resize_dims;
        self.vw = w;
        self.vh = h;
        self.sess.client_width = w;
        self.sess.client_height = h;
        info!(target: "browser", width = w, height = h, "viewport resized");
        self.refresh().await;
    }

    // ------------------------------------------------------------------
    // Cookies and exit
    // ------------------------------------------------------------------

    fn load_cookies(&mut self) {
        match Vault::from_env(&self.settings.vault_file, &self.settings.vault_pass_env_var) {
            Ok(vault) => {
                if let Err(e) = self.cookies.load(&vault) {
                    // not fatal, cookies start empty
                    warn!(target: "browser", "error loading cookies from vault: {}", e);
                }
            }
            Err(e) => warn!(target: "browser", "vault unavailable: {}", e),
        }
    }

    fn store_cookies(&mut self) {
        let res = Vault::from_env(&self.settings.vault_file, &self.settings.vault_pass_env_var)
            .and_then(|vault| self.cookies.save(&vault).map_err(|e| match e {
                crate::cookies::JarError::Vault(v) => v,
                crate::cookies::JarError::Parse(p) => {
                    VaultError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, p))
                }
            }));
        if let Err(e) = res {
            error!(target: "browser", "error storing cookies on close: {}", e);
            if matches!(e, VaultError::NoPassword(_)) {
                self.exit_messages.push(
                    "Warning: Cookie storage failed on close due to a missing encryption \
                     password. Cookies will be ephemeral until this is fixed. Run the browser \
                     with `--help`, generate a password with `--vault-pass-gen`, and store it \
                     in the configured ENV var."
                        .to_string(),
                );
            }
        }
    }

    fn exit(&mut self, code: i32) {
        info!(target: "browser", code, "caught exit interrupt");
        self.exit_code = Some(code);
        self.store_cookies();
        self.interrupt.cancel();
    }
}

fn draw_div(screen: &mut Screen, div: &DivBox, y_offset: u16, viewport: (u16, u16)) {
    let (max_w, max_h) = (usize::from(viewport.0), usize::from(viewport.1));
    for (y, row) in div.rows().iter().enumerate() {
        for (x, px) in row.iter().enumerate() {
            let abs_x = div.start_x + x;
            let abs_y = div.start_y + y + usize::from(y_offset);
            if abs_x < max_w && abs_y < max_h {
                screen.set_content(abs_x as u16, abs_y as u16, px.ch, &px.style);
            }
        }
    }
}
