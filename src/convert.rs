//! Conversion of wire protocol objects into renderable ones.
//!
//! Scalar fields are copied, color names are resolved against the named
//! color table, and absent styles become the terminal default.

use crate::boxes;
use crate::colors::{self, CellStyle};
use crate::protocol;

/// Resolve an optional wire style; `None` is the terminal default.
pub fn style(wire: &Option<protocol::Style>) -> CellStyle {
    match wire {
        Some(st) => CellStyle::from_names(&st.fg, &st.bg)
            .with_attrs(colors::attrs_from_mask(&st.attr)),
        None => CellStyle::default(),
    }
}

pub fn div_box(wire: &protocol::DivBox) -> boxes::DivBox {
    boxes::DivBox {
        name: wire.name.clone(),
        border: wire.border,
        border_w: wire.border_w as usize,
        border_char: wire.border_char,
        border_st: style(&wire.border_st),
        fill_char: wire.fill_char,
        fill_st: style(&wire.fill_st),
        start_x: wire.start_x as usize,
        start_y: wire.start_y as usize,
        width: wire.width as usize,
        height: wire.height as usize,
        ..boxes::DivBox::default()
    }
}

pub fn text_blob(wire: &protocol::TextBlob) -> boxes::TextBlob {
    boxes::TextBlob {
        content: wire.content.clone(),
        wrap: wire.wrap,
        style: style(&wire.style),
        div_names: wire.div_names.clone(),
    }
}

/// Convert a page's divs and text blobs into initialized render boxes,
/// ready to be composed onto the terminal.
pub fn page_boxes(page: &protocol::PageResponse) -> Vec<boxes::DivBox> {
    let mut out: Vec<boxes::DivBox> = page.div_boxes.iter().map(div_box).collect();
    for ele in &page.elements.text_blobs {
        text_blob(ele).mate_boxes(&mut out);
    }
    for bx in &mut out {
        bx.init();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::style::Color;

    #[test]
    fn absent_style_is_terminal_default() {
        let st = style(&None);
        assert_eq!(st, CellStyle::default());
    }

    #[test]
    fn unresolved_color_names_map_to_default() {
        let st = style(&Some(protocol::Style {
            fg: "chartreuse".to_string(),
            bg: "definitely-not-a-color".to_string(),
            attr: String::new(),
        }));
        assert_ne!(st.fg, Color::Reset);
        assert_eq!(st.bg, Color::Reset);
    }

    #[test]
    fn page_boxes_mates_and_initializes() {
        let page = protocol::PageResponse {
            name: "home".to_string(),
            div_boxes: vec![protocol::DivBox {
                name: "main".to_string(),
                fill_char: ' ',
                start_x: 0,
                start_y: 0,
                width: 10,
                height: 2,
                ..protocol::DivBox::default()
            }],
            elements: protocol::Elements {
                text_blobs: vec![protocol::TextBlob {
                    content: "hello".to_string(),
                    wrap: true,
                    style: None,
                    div_names: vec!["main".to_string()],
                }],
                forms: vec![],
            },
            ..protocol::PageResponse::default()
        };
        let bxs = page_boxes(&page);
        assert_eq!(bxs.len(), 1);
        assert_eq!(bxs[0].pixel(0, 0).ch, 'h');
        assert_eq!(bxs[0].pixel(4, 0).ch, 'o');
    }

    #[test]
    fn blob_for_unknown_div_is_ignored() {
        let page = protocol::PageResponse {
            div_boxes: vec![protocol::DivBox {
                name: "main".to_string(),
                fill_char: '.',
                width: 4,
                height: 1,
                ..protocol::DivBox::default()
            }],
            elements: protocol::Elements {
                text_blobs: vec![protocol::TextBlob {
                    content: "x".to_string(),
                    div_names: vec!["elsewhere".to_string()],
                    ..protocol::TextBlob::default()
                }],
                forms: vec![],
            },
            ..protocol::PageResponse::default()
        };
        let bxs = page_boxes(&page);
        assert_eq!(bxs[0].pixel(0, 0).ch, '.');
    }
}
