//! Renderable page composition: pixel buffers, divs and text blobs.
//!
//! A [`DivBox`] is a named rectangle owning a two-dimensional pixel buffer.
//! [`TextBlob`]s are *mated* to divs by name; `init` fills the buffer with
//! border and fill glyphs and then rasterizes the mated blobs into the
//! interior. Rows of text beyond the interior height land in a hidden
//! overflow buffer which `scroll` can pull into view.
//!
//! Composition onto the terminal is the orchestrator's job: divs draw in
//! list order at their absolute position, last writer wins, forms always
//! draw after divs.

use tracing::warn;

use crate::colors::CellStyle;
use crate::wrap;

/// One terminal cell: a glyph, its style, and whether it belongs to a border.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub ch: char,
    pub style: CellStyle,
    pub is_border: bool,
}

impl Default for Pixel {
    fn default() -> Self {
        Self {
            ch: ' ',
            style: CellStyle::default(),
            is_border: false,
        }
    }
}

/// A run of text destined for the interior of one or more divs.
#[derive(Debug, Clone, Default)]
pub struct TextBlob {
    pub content: String,
    pub wrap: bool,
    pub style: CellStyle,
    pub div_names: Vec<String>,
}

impl TextBlob {
    /// Attach this blob to every div whose name appears in `div_names`.
    /// Must happen before the divs are initialized.
    pub fn mate_boxes(&self, boxes: &mut [DivBox]) {
        for bx in boxes.iter_mut() {
            if self.div_names.iter().any(|n| *n == bx.name) {
                bx.text_blobs.push(self.clone());
            }
        }
    }
}

/// A named rectangle with border, fill, and an owned pixel buffer.
///
/// The buffer is allocated by [`DivBox::init`] and never resized; a page
/// redraw builds fresh boxes.
#[derive(Debug, Clone, Default)]
pub struct DivBox {
    pub name: String,
    pub border: bool,
    pub border_w: usize,
    pub border_char: char,
    pub border_st: CellStyle,
    pub fill_char: char,
    pub fill_st: CellStyle,
    pub start_x: usize,
    pub start_y: usize,
    pub width: usize,
    pub height: usize,
    /// Row-major pixel buffer, `height` rows of `width` cells.
    pub(crate) rows: Vec<Vec<Pixel>>,
    /// Overflow rows (interior width) that did not fit the interior height.
    pub(crate) hidden: Vec<Vec<Pixel>>,
    /// How many hidden rows have been pulled into view so far.
    pub(crate) scrolled: usize,
    pub(crate) text_blobs: Vec<TextBlob>,
    // usable fill space minus border
    pub(crate) fill_x1: usize,
    pub(crate) fill_x2: usize,
    pub(crate) fill_y1: usize,
    pub(crate) fill_y2: usize,
}

impl DivBox {
    /// Establish borders and padding, allocate the pixel buffer, and
    /// rasterize mated text blobs. After this every cell is populated and
    /// border cells are set iff the border is enabled.
    pub fn init(&mut self) {
        if !self.border {
            self.border_w = 0;
        }
        // a border wider than the box leaves an empty interior
        self.fill_x1 = self.border_w.min(self.width);
        self.fill_x2 = self.width.saturating_sub(self.border_w).max(self.fill_x1);
        self.fill_y1 = self.border_w.min(self.height);
        self.fill_y2 = self.height.saturating_sub(self.border_w).max(self.fill_y1);

        let border_px = Pixel {
            ch: self.border_char,
            style: self.border_st,
            is_border: true,
        };
        let fill_px = Pixel {
            ch: self.fill_char,
            style: self.fill_st,
            is_border: false,
        };

        // Border (or fill) everywhere, then overwrite the interior.
        let base = if self.border { border_px } else { fill_px };
        self.rows = vec![vec![base; self.width]; self.height];
        for row in &mut self.rows[self.fill_y1..self.fill_y2] {
            for px in &mut row[self.fill_x1..self.fill_x2] {
                *px = fill_px;
            }
        }

        self.hidden.clear();
        self.scrolled = 0;
        let blobs = std::mem::take(&mut self.text_blobs);
        for tb in &blobs {
            self.add_text_blob(tb);
        }
        self.text_blobs = blobs;
    }

    fn add_text_blob(&mut self, tb: &TextBlob) {
        let fill_width = self.fill_x2.saturating_sub(self.fill_x1);
        let fill_height = self.fill_y2.saturating_sub(self.fill_y1);
        let text_rows = if tb.wrap {
            wrap::soft_wrap(&tb.content, fill_width)
        } else {
            wrap::no_wrap(&tb.content)
        };

        let invisible = text_rows.len().saturating_sub(fill_height);
        if invisible > 0 {
            warn!(
                target: "boxes",
                div = %self.name,
                invisible,
                "content exceeds div height, storing overflow rows"
            );
            let fill_px = Pixel {
                ch: self.fill_char,
                style: self.fill_st,
                is_border: false,
            };
            self.hidden
                .extend(std::iter::repeat_with(|| vec![fill_px; fill_width]).take(invisible));
        }

        let hidden_base = self.hidden.len() - invisible;
        for (i, text_row) in text_rows.iter().enumerate() {
            for (j, ch) in text_row.chars().enumerate() {
                if j >= fill_width {
                    warn!(target: "boxes", div = %self.name, row = i, "content exceeds div width");
                    break;
                }
                let px = Pixel {
                    ch,
                    style: tb.style,
                    is_border: false,
                };
                if i >= fill_height {
                    self.hidden[hidden_base + i - fill_height][j] = px;
                } else {
                    self.rows[self.fill_y1 + i][self.fill_x1 + j] = px;
                }
            }
        }
    }

    /// Pull `delta` hidden rows into view, shifting interior rows up.
    /// Rows scrolled off the top are dropped; negative deltas are a no-op
    /// once rows are gone. Returns how many rows actually moved.
    pub fn scroll(&mut self, delta: i32) -> usize {
        let mut moved = 0;
        if delta <= 0 {
            return moved;
        }
        for _ in 0..delta {
            if self.hidden.is_empty() {
                break;
            }
            let mut incoming = self.hidden.remove(0);
            incoming.resize(
                self.fill_x2.saturating_sub(self.fill_x1),
                Pixel {
                    ch: self.fill_char,
                    style: self.fill_st,
                    is_border: false,
                },
            );
            self.rows[self.fill_y1..self.fill_y2].rotate_left(1);
            if self.fill_y2 > self.fill_y1 {
                let last = self.fill_y2 - 1;
                self.rows[last][self.fill_x1..self.fill_x2]
                    .iter_mut()
                    .zip(incoming)
                    .for_each(|(dst, src)| *dst = src);
            }
            self.scrolled += 1;
            moved += 1;
        }
        moved
    }

    /// Cell accessor; callers must stay within `width × height`.
    pub fn pixel(&self, x: usize, y: usize) -> &Pixel {
        &self.rows[y][x]
    }

    pub fn rows(&self) -> &[Vec<Pixel>] {
        &self.rows
    }

    pub fn hidden_rows(&self) -> usize {
        self.hidden.len()
    }

    /// How many hidden rows have been pulled into view since init.
    pub fn scrolled(&self) -> usize {
        self.scrolled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::CellStyle;

    fn plain_box(width: usize, height: usize) -> DivBox {
        DivBox {
            name: "test".to_string(),
            fill_char: '.',
            width,
            height,
            ..DivBox::default()
        }
    }

    #[test]
    fn init_fills_every_cell() {
        let mut bx = plain_box(4, 3);
        bx.init();
        for y in 0..3 {
            for x in 0..4 {
                let px = bx.pixel(x, y);
                assert_eq!(px.ch, '.');
                assert!(!px.is_border);
            }
        }
    }

    #[test]
    fn border_cells_are_marked_iff_border_enabled() {
        let mut bx = plain_box(5, 4);
        bx.border = true;
        bx.border_w = 1;
        bx.border_char = '=';
        bx.init();
        // corners and edges are border, interior is fill
        assert!(bx.pixel(0, 0).is_border);
        assert!(bx.pixel(4, 3).is_border);
        assert_eq!(bx.pixel(0, 0).ch, '=');
        assert!(!bx.pixel(1, 1).is_border);
        assert_eq!(bx.pixel(1, 1).ch, '.');
    }

    #[test]
    fn border_width_zeroed_when_border_disabled() {
        let mut bx = plain_box(4, 2);
        bx.border_w = 2; // stale value from the wire
        bx.init();
        assert_eq!(bx.border_w, 0);
        assert_eq!(bx.pixel(0, 0).ch, '.');
    }

    #[test]
    fn oversized_border_leaves_no_interior() {
        let mut bx = plain_box(3, 2);
        bx.border = true;
        bx.border_w = 5;
        bx.border_char = '#';
        bx.init();
        for y in 0..2 {
            for x in 0..3 {
                assert!(bx.pixel(x, y).is_border);
            }
        }
    }

    #[test]
    fn blob_rasterizes_into_interior_with_border_inset() {
        let mut bx = plain_box(7, 3);
        bx.border = true;
        bx.border_w = 1;
        bx.border_char = '#';
        let tb = TextBlob {
            content: "hi".to_string(),
            wrap: false,
            style: CellStyle::default(),
            div_names: vec!["test".to_string()],
        };
        tb.mate_boxes(std::slice::from_mut(&mut bx));
        bx.init();
        assert_eq!(bx.pixel(1, 1).ch, 'h');
        assert_eq!(bx.pixel(2, 1).ch, 'i');
        assert_eq!(bx.pixel(3, 1).ch, '.');
    }

    #[test]
    fn empty_blob_leaves_interior_all_fill() {
        let mut bx = plain_box(4, 2);
        let tb = TextBlob {
            content: String::new(),
            wrap: true,
            style: CellStyle::default(),
            div_names: vec!["test".to_string()],
        };
        tb.mate_boxes(std::slice::from_mut(&mut bx));
        bx.init();
        for y in 0..2 {
            for x in 0..4 {
                assert_eq!(bx.pixel(x, y).ch, '.');
            }
        }
    }

    #[test]
    fn overflow_rows_land_in_hidden_buffer() {
        let mut bx = plain_box(5, 2);
        let tb = TextBlob {
            content: "aa bb cc dd".to_string(),
            wrap: true,
            style: CellStyle::default(),
            div_names: vec!["test".to_string()],
        };
        tb.mate_boxes(std::slice::from_mut(&mut bx));
        bx.init();
        // width 5 wraps to "aa bb" / "cc dd", but only 2 rows fit... both fit.
        assert_eq!(bx.hidden_rows(), 0);

        let mut small = plain_box(5, 1);
        let tb2 = TextBlob {
            content: "aa bb cc dd".to_string(),
            wrap: true,
            style: CellStyle::default(),
            div_names: vec!["test".to_string()],
        };
        tb2.mate_boxes(std::slice::from_mut(&mut small));
        small.init();
        assert_eq!(small.hidden_rows(), 1);
        assert_eq!(small.pixel(0, 0).ch, 'a');
    }

    #[test]
    fn scroll_pulls_hidden_rows_into_view() {
        let mut bx = plain_box(5, 1);
        let tb = TextBlob {
            content: "aa bb cc dd".to_string(),
            wrap: true,
            style: CellStyle::default(),
            div_names: vec!["test".to_string()],
        };
        tb.mate_boxes(std::slice::from_mut(&mut bx));
        bx.init();
        assert_eq!(bx.pixel(0, 0).ch, 'a');
        let moved = bx.scroll(1);
        assert_eq!(moved, 1);
        assert_eq!(bx.scrolled(), 1);
        assert_eq!(bx.pixel(0, 0).ch, 'c');
        assert_eq!(bx.hidden_rows(), 0);
        // nothing left to pull
        assert_eq!(bx.scroll(1), 0);
    }

    #[test]
    fn reinit_rebuilds_from_scratch() {
        let mut bx = plain_box(5, 1);
        let tb = TextBlob {
            content: "aa bb cc dd".to_string(),
            wrap: true,
            style: CellStyle::default(),
            div_names: vec!["test".to_string()],
        };
        tb.mate_boxes(std::slice::from_mut(&mut bx));
        bx.init();
        bx.scroll(1);
        bx.init();
        assert_eq!(bx.pixel(0, 0).ch, 'a');
        assert_eq!(bx.hidden_rows(), 1);
    }
}
