//! Locally synthesized pages.
//!
//! The chrome (menu, address bar, status line), the feed browser, the color
//! demo, the settings editor and the bookmarks list are all built here as
//! ordinary [`PageResponse`] values, so the rest of the browser renders
//! them exactly like a server response.
//!
//! Pages that expose sensitive actions (bookmark deletion) embed the
//! process-wide local auth token into their link names; the keystroke
//! router only treats a link as local when it carries that token, so a
//! server cannot forge one.

use std::sync::OnceLock;

use tracing::debug;

use crate::colors;
use crate::protocol::{
    Action, DivBox, Form, KeyStroke, Link, PageResponse, Style, TextBlob, TextBox,
};
use crate::settings::Settings;
use crate::ugri;

pub const MENU_PAGE: &str = "uggcli-menu";
pub const FEED_PAGE: &str = "uggcli-feedbrowser";
pub const COLOR_DEMO_PAGE: &str = "uggcli-colordemo";
pub const SETTINGS_PAGE: &str = "uggcli-settings";
pub const BOOKMARKS_PAGE: &str = "uggcli-bookmarks";

pub const ADDRESS_BAR_FORM: &str = "address-bar";
pub const SETTINGS_FORM: &str = "uggcli-settings";

/// Roster of keys handed out to list entries (feed, bookmarks).
pub const STROKE_MAP: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "a", "b", "c", "d", "e", "f", "g", "h", "i",
    "j", "k", "l", "m", "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y", "z",
];

/// Per-process token trusted local pages embed into their links so the
/// router can tell a user-activated local command from a server trying to
/// forge one. Generated once, read-mostly afterwards.
pub fn local_auth_token() -> &'static str {
    static TOKEN: OnceLock<String> = OnceLock::new();
    TOKEN.get_or_init(|| uuid::Uuid::new_v4().to_string())
}

fn style(fg: &str, bg: &str) -> Option<Style> {
    Some(Style {
        fg: fg.to_string(),
        bg: bg.to_string(),
        attr: String::new(),
    })
}

fn percent(p: u16, total: u16) -> u16 {
    (u32::from(total) * u32::from(p) / 100) as u16
}

// ---------------------------------------------------------------------------
// Theme
// ---------------------------------------------------------------------------

/// Shared look for the local pages.
struct Theme {
    text_box_description: Option<Style>,
    text_box_cursor: Option<Style>,
    text_box_text: Option<Style>,
    text_box_fill: Option<Style>,
    div_fill: Option<Style>,
    div_border: Option<Style>,
    text_blob: Option<Style>,
    div_border_width: u16,
    div_border_char: char,
    div_fill_char: char,
}

fn menu_theme() -> Theme {
    Theme {
        text_box_description: style("black", "navajowhite"),
        text_box_cursor: style("black", "white"),
        text_box_text: style("white", "darkblue"),
        text_box_fill: style("white", "darkblue"),
        div_fill: style("white", "navajowhite"),
        div_border: style("white", "black"),
        text_blob: style("white", "black"),
        div_border_width: 1,
        div_border_char: '=',
        div_fill_char: ' ',
    }
}

impl Theme {
    fn div(&self, mut d: DivBox) -> DivBox {
        d.border_w = self.div_border_width;
        d.border_char = self.div_border_char;
        d.fill_char = self.div_fill_char;
        d.border_st = self.div_border.clone();
        d.fill_st = self.div_fill.clone();
        d
    }

    fn text_box(&self, mut tb: TextBox) -> TextBox {
        tb.style_cursor = self.text_box_cursor.clone();
        tb.style_fill = self.text_box_fill.clone();
        tb.style_text = self.text_box_text.clone();
        tb.style_description = self.text_box_description.clone();
        tb
    }

    fn text_blob(&self, mut tb: TextBlob) -> TextBlob {
        tb.style = self.text_blob.clone();
        tb
    }
}

/// Drop a standalone text label onto a page at an absolute position, as its
/// own little div.
fn add_text_at(page: &mut PageResponse, x: u16, y: u16, w: u16, h: u16, text: &str) {
    let name = format!("text-{}-{}", x, y);
    page.div_boxes.push(DivBox {
        name: name.clone(),
        fill_char: ' ',
        fill_st: style("white", "black"),
        start_x: x,
        start_y: y,
        width: w,
        height: h,
        ..DivBox::default()
    });
    page.elements.text_blobs.push(TextBlob {
        content: text.to_string(),
        wrap: true,
        style: style("white", "black"),
        div_names: vec![name],
    });
}

// ---------------------------------------------------------------------------
// Menu / chrome
// ---------------------------------------------------------------------------

/// Build the chrome: menu text, address bar with its editable form, and the
/// status line carrying the latest message.
pub fn build_page_menu(
    width: u16,
    menu_height: u16,
    server: &str,
    port: u16,
    page: &str,
    msg: &str,
    secure: bool,
) -> PageResponse {
    let band = menu_height / 3;
    let mut local = PageResponse {
        name: MENU_PAGE.to_string(),
        ..PageResponse::default()
    };
    local.div_boxes.push(DivBox {
        name: "uggcli-menu".to_string(),
        fill_char: ' ',
        fill_st: style("black", "black"),
        start_x: 0,
        start_y: 0,
        width,
        height: band,
        ..DivBox::default()
    });
    local.div_boxes.push(DivBox {
        name: "uggcli-addrbar".to_string(),
        fill_char: ' ',
        fill_st: style("white", "black"),
        start_x: 0,
        start_y: 1,
        width,
        height: band,
        ..DivBox::default()
    });
    local.div_boxes.push(DivBox {
        name: "uggcli-statusbar".to_string(),
        fill_char: ' ',
        fill_st: style("white", "white"),
        start_x: 0,
        start_y: 2,
        width,
        height: band,
        ..DivBox::default()
    });

    let menu_text = format!(
        "uggcli-menu v{} ===  ColorDemo (F2)  Settings (F3)  Browse Feed (F4)  Refresh (F5)  Bookmarks (F6)  AddBookmark (F7)  Exit (F10)",
        env!("CARGO_PKG_VERSION"),
    );
    local.elements.text_blobs.push(TextBlob {
        content: menu_text,
        wrap: true,
        style: style("white", "black"),
        div_names: vec!["uggcli-menu".to_string()],
    });

    let (prefix, description_color) = if secure {
        ("ugtps://", style("white", "green"))
    } else {
        ("ugtp://", style("white", "red"))
    };
    local.elements.forms.push(Form {
        name: ADDRESS_BAR_FORM.to_string(),
        div_name: "uggcli-addrbar".to_string(),
        // built by the submission handler, not a page link
        submit_link: None,
        text_boxes: vec![TextBox {
            name: "connstring".to_string(),
            tab_order: 0,
            default_value: format!("{}{}:{}/{}", prefix, server, port, page),
            description: "Host: (F1)".to_string(),
            position_x: 14,
            position_y: 0,
            height: 1,
            width: width / 2,
            style_cursor: style("black", "olive"),
            style_fill: style("white", "navy"),
            style_text: style("white", "navy"),
            style_description: description_color,
            show_description: true,
            password: false,
        }],
    });

    local.elements.text_blobs.push(TextBlob {
        content: msg.to_string(),
        wrap: true,
        style: style("black", "white"),
        div_names: vec!["uggcli-statusbar".to_string()],
    });

    local.key_strokes.push(KeyStroke {
        key_stroke: "F1".to_string(),
        action: Action::FormActivation {
            form_name: ADDRESS_BAR_FORM.to_string(),
        },
    });
    local
}

// ---------------------------------------------------------------------------
// Feed browser
// ---------------------------------------------------------------------------

/// Numbered list of the links returned by the feed endpoint; each entry is
/// also a live keystroke binding.
pub fn build_feed_browser(width: u16, key_strokes: &[KeyStroke]) -> PageResponse {
    let height = 36;
    let mut local = PageResponse {
        name: FEED_PAGE.to_string(),
        ..PageResponse::default()
    };
    local.div_boxes.push(DivBox {
        name: "uggcli-feedbrowser-list".to_string(),
        fill_char: ' ',
        fill_st: style("grey", "black"),
        start_x: 0,
        start_y: 0,
        width,
        height,
        ..DivBox::default()
    });
    let mut content = String::new();
    for ks in key_strokes {
        if let Action::Link(link) = &ks.action {
            content.push_str(&format!("({}) {}\n", ks.key_stroke, link.page_name));
            local.key_strokes.push(ks.clone());
        }
    }
    local.elements.text_blobs.push(TextBlob {
        content,
        wrap: true,
        style: style("white", "black"),
        div_names: vec!["uggcli-feedbrowser-list".to_string()],
    });
    local
}

// ---------------------------------------------------------------------------
// Color demo
// ---------------------------------------------------------------------------

/// A grid of colored cells derived from the named color table.
pub fn build_color_demo(width: u16, height: u16) -> PageResponse {
    let cell_w: u16 = 22;
    let cell_h: u16 = 4;
    let cols = (width / cell_w).max(1);
    let rows = (height / cell_h).max(1);
    let total = colors::COLOR_NAMES.len();
    debug!(target: "local_pages", cols, rows, "color demo dimensions");

    let mut local = PageResponse {
        name: COLOR_DEMO_PAGE.to_string(),
        ..PageResponse::default()
    };
    let mut color_index = 0usize;
    'grid: for i in 0..rows {
        for j in 0..cols {
            let Some((color_name, _)) = colors::COLOR_NAMES.get(color_index) else {
                break 'grid;
            };
            let div_name = format!("color-{}", color_name);
            local.div_boxes.push(DivBox {
                name: div_name.clone(),
                fill_char: ' ',
                fill_st: Some(Style {
                    fg: String::new(),
                    bg: (*color_name).to_string(),
                    attr: "4".to_string(),
                }),
                start_x: j * cell_w,
                start_y: i * cell_h,
                width: cell_w,
                height: cell_h,
                ..DivBox::default()
            });
            local.elements.text_blobs.push(TextBlob {
                content: format!("({}/{})\n{}", color_index + 1, total, color_name),
                wrap: true,
                style: style("white", "black"),
                div_names: vec![div_name],
            });
            color_index += 1;
        }
    }
    local
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// The settings editor: vault fields, per-bookmark rows, and a delete
/// column whose links are local-auth-token protected.
pub fn build_settings(
    width: u16,
    height: u16,
    settings: &Settings,
    info_msg: &str,
) -> PageResponse {
    let theme = menu_theme();
    let mut local = PageResponse {
        name: SETTINGS_PAGE.to_string(),
        ..PageResponse::default()
    };

    let sx = percent(5, width);
    let sy = percent(5, height);
    let dw = width.saturating_sub(2 * sx);
    let dh = height.saturating_sub(2 * sy);
    let outer = "settings-outer";
    local.div_boxes.push(theme.div(DivBox {
        name: outer.to_string(),
        border: true,
        start_x: sx,
        start_y: sy,
        width: dw,
        height: dh,
        ..DivBox::default()
    }));

    let activation_key = "j";
    let tb_width = percent(20, dw);
    let mut form = Form {
        name: SETTINGS_FORM.to_string(),
        div_name: outer.to_string(),
        submit_link: None,
        text_boxes: vec![
            theme.text_box(TextBox {
                name: "VaultPassEnvVar".to_string(),
                tab_order: 1,
                default_value: settings.vault_pass_env_var.clone(),
                description: "Cookie Vault ENV var".to_string(),
                position_x: 30,
                position_y: 4,
                height: 1,
                width: tb_width,
                show_description: true,
                ..TextBox::default()
            }),
            theme.text_box(TextBox {
                name: "VaultFile".to_string(),
                tab_order: 2,
                default_value: settings.vault_file.clone(),
                description: "Cookie Vault file path".to_string(),
                position_x: 30,
                position_y: 6,
                height: 1,
                width: tb_width,
                show_description: true,
                ..TextBox::default()
            }),
        ],
    };

    // Bookmarks panel on the right half of the outer div.
    let bm_x = sx + percent(50, dw);
    let bm_y = sy + 2;
    let bm_w = percent(40, dw) + 6;
    let bm_h = dh.saturating_sub(4);
    let mut bm_div = theme.div(DivBox {
        name: "bookmarks".to_string(),
        border: true,
        start_x: bm_x,
        start_y: bm_y,
        width: bm_w,
        height: bm_h,
        ..DivBox::default()
    });
    bm_div.fill_st = style("black", "cornsilk");
    local.div_boxes.push(bm_div);
    local.elements.text_blobs.push(theme.text_blob(TextBlob {
        content: "Bookmarks:".to_string(),
        wrap: true,
        div_names: vec!["bookmarks".to_string()],
        ..TextBlob::default()
    }));

    // Column positions, relative to the outer div for the form boxes and
    // absolute for the standalone labels.
    let sn_width = percent(20, bm_w);
    let ug_width = percent(65, bm_w);
    let col_x1 = percent(50, dw) + 2;
    let col_x2 = col_x1 + sn_width + 3;
    let label_y = bm_y + 1;
    add_text_at(&mut local, sx + col_x1, label_y, 10, 1, "Short Name");
    add_text_at(&mut local, sx + col_x2, label_y, 4, 1, "UGRI");

    let mut tab_order = 3;
    let mut row_y = 4; // relative to the outer div
    let mut del_column = String::from("del\n\n");
    for (i, bm) in settings.bookmarks.iter().enumerate() {
        let Some(stroke) = STROKE_MAP.get(i) else {
            break; // more bookmarks than roster keys
        };
        form.text_boxes.push(theme.text_box(TextBox {
            name: format!("bookmark_shortname_{}", bm.uid),
            tab_order,
            default_value: bm.short_name.clone(),
            position_x: col_x1,
            position_y: row_y,
            height: 1,
            width: sn_width,
            ..TextBox::default()
        }));
        tab_order += 1;
        form.text_boxes.push(theme.text_box(TextBox {
            name: format!("bookmark_ugri_{}", bm.uid),
            tab_order,
            default_value: bm.ugri.clone(),
            position_x: col_x2,
            position_y: row_y,
            height: 1,
            width: ug_width,
            ..TextBox::default()
        }));
        tab_order += 1;
        row_y += 2;

        del_column.push_str(&format!("({})\n\n", stroke));
        local.key_strokes.push(KeyStroke {
            key_stroke: (*stroke).to_string(),
            action: Action::Link(Link {
                page_name: format!("bookmark_delete_{}_{}", bm.uid, local_auth_token()),
                ..Link::default()
            }),
        });
    }
    let del_x = sx + col_x2 + ug_width + 1;
    add_text_at(&mut local, del_x, label_y, 4, height, &del_column);

    local.elements.forms.push(form);
    local.key_strokes.push(KeyStroke {
        key_stroke: activation_key.to_string(),
        action: Action::FormActivation {
            form_name: SETTINGS_FORM.to_string(),
        },
    });

    let mut msg = format!(
        "Settings - Hit ({}) to activate form\nThen Enter to submit",
        activation_key
    );
    if !info_msg.is_empty() {
        msg.push_str(&format!("\n\n{}", info_msg));
    }
    local.elements.text_blobs.push(theme.text_blob(TextBlob {
        content: msg,
        wrap: true,
        div_names: vec![outer.to_string()],
        ..TextBlob::default()
    }));
    local
}

// ---------------------------------------------------------------------------
// Bookmarks
// ---------------------------------------------------------------------------

/// Keystroke-navigable bookmark list.
pub fn build_bookmarks(width: u16, height: u16, settings: &Settings) -> PageResponse {
    let theme = menu_theme();
    let mut local = PageResponse {
        name: BOOKMARKS_PAGE.to_string(),
        ..PageResponse::default()
    };
    let sx = percent(15, width);
    let sy = percent(15, height);
    let div_name = "bookmarks-outer";
    local.div_boxes.push(theme.div(DivBox {
        name: div_name.to_string(),
        border: true,
        start_x: sx,
        start_y: sy,
        width: width.saturating_sub(2 * sx),
        height: height.saturating_sub(2 * sy),
        ..DivBox::default()
    }));

    let mut msg = String::from("Bookmarks Browser\n\n");
    for (i, bm) in settings.bookmarks.iter().enumerate() {
        let Some(stroke) = STROKE_MAP.get(i) else {
            break;
        };
        msg.push_str(&format!("({}) -- {}: {}\n\n", stroke, bm.short_name, bm.ugri));
        match ugri::link_from_string(&bm.ugri) {
            Ok(link) => local.key_strokes.push(KeyStroke {
                key_stroke: (*stroke).to_string(),
                action: Action::Link(link),
            }),
            Err(e) => {
                debug!(
                    target: "local_pages",
                    ugri = %bm.ugri,
                    "error generating link from bookmark: {}",
                    e
                );
            }
        }
    }
    local.elements.text_blobs.push(theme.text_blob(TextBlob {
        content: msg,
        wrap: true,
        div_names: vec![div_name.to_string()],
        ..TextBlob::default()
    }));
    local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_has_three_bands_and_the_address_form() {
        let page = build_page_menu(80, 3, "example.test", 8888, "home", "hi", false);
        assert_eq!(page.name, MENU_PAGE);
        assert_eq!(page.div_boxes.len(), 3);
        assert_eq!(page.elements.forms.len(), 1);
        let form = &page.elements.forms[0];
        assert_eq!(form.name, ADDRESS_BAR_FORM);
        assert_eq!(
            form.text_boxes[0].default_value,
            "ugtp://example.test:8888/home"
        );
        assert!(matches!(
            page.key_strokes[0].action,
            Action::FormActivation { .. }
        ));
    }

    #[test]
    fn secure_menu_uses_the_tls_scheme() {
        let page = build_page_menu(80, 3, "example.test", 8443, "home", "", true);
        let form = &page.elements.forms[0];
        assert!(form.text_boxes[0].default_value.starts_with("ugtps://"));
        assert_eq!(
            form.text_boxes[0].style_description.as_ref().unwrap().bg,
            "green"
        );
    }

    #[test]
    fn feed_browser_lists_only_link_bindings() {
        let strokes = vec![
            KeyStroke {
                key_stroke: "1".to_string(),
                action: Action::Link(Link {
                    page_name: "one".to_string(),
                    ..Link::default()
                }),
            },
            KeyStroke {
                key_stroke: "x".to_string(),
                action: Action::FormActivation {
                    form_name: "nope".to_string(),
                },
            },
        ];
        let page = build_feed_browser(80, &strokes);
        assert_eq!(page.key_strokes.len(), 1);
        let blob = &page.elements.text_blobs[0];
        assert!(blob.content.contains("(1) one"));
        assert!(!blob.content.contains("nope"));
    }

    #[test]
    fn color_demo_covers_the_table_up_to_the_grid() {
        let page = build_color_demo(220, 40);
        // 10 cols x 10 rows = 100 cells
        assert_eq!(page.div_boxes.len(), 100);
        assert_eq!(page.elements.text_blobs.len(), 100);
        assert_eq!(page.div_boxes[0].start_x, 0);
        assert_eq!(page.div_boxes[1].start_x, 22);
    }

    #[test]
    fn settings_page_has_vault_fields_and_bookmark_rows() {
        let mut settings = Settings::default();
        settings.add_bookmark("home", "ugtp://a.test:1/home");
        let page = build_settings(100, 40, &settings, "");
        let form = &page.elements.forms[0];
        assert_eq!(form.name, SETTINGS_FORM);
        let names: Vec<&str> = form.text_boxes.iter().map(|tb| tb.name.as_str()).collect();
        assert!(names.contains(&"VaultPassEnvVar"));
        assert!(names.contains(&"VaultFile"));
        assert!(names.contains(&"bookmark_shortname_0"));
        assert!(names.contains(&"bookmark_ugri_0"));
    }

    #[test]
    fn settings_delete_links_carry_the_auth_token() {
        let mut settings = Settings::default();
        settings.add_bookmark("home", "ugtp://a.test:1/home");
        let page = build_settings(100, 40, &settings, "");
        let delete = page
            .key_strokes
            .iter()
            .find_map(|ks| match &ks.action {
                Action::Link(l) if l.page_name.starts_with("bookmark_delete_") => Some(l),
                _ => None,
            })
            .expect("delete link present");
        assert!(delete.page_name.contains(local_auth_token()));
    }

    #[test]
    fn bookmarks_page_binds_roster_keys() {
        let mut settings = Settings::default();
        settings.add_bookmark("a", "ugtp://a.test:1/a");
        settings.add_bookmark("bad", "not parseable");
        let page = build_bookmarks(80, 24, &settings);
        // the malformed bookmark is listed but gets no binding
        assert_eq!(page.key_strokes.len(), 1);
        assert_eq!(page.key_strokes[0].key_stroke, "1");
        let blob = &page.elements.text_blobs[0];
        assert!(blob.content.contains("(2) -- bad"));
    }
}
