//! Pagination utilities.
//!
//! Chapter text is word-wrapped into lines sized from the viewport and font
//! scale, and every line remembers the byte offset it starts at so a position
//! survives any re-layout. Pages are runs of whole lines.

use crate::render::Viewport;

const MIN_CHARS_PER_LINE: usize = 10;
const MIN_ROWS_PER_PAGE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Byte offset of the line's first character within the chapter text.
    pub offset: usize,
    pub text: String,
}

/// Characters per line and lines per page for a viewport at a font scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMetrics {
    pub chars_per_line: usize,
    pub rows_per_page: usize,
}

impl PageMetrics {
    pub fn new(viewport: Viewport, font_scale_percent: u16) -> Self {
        let scale = usize::from(font_scale_percent.max(1));
        Self {
            chars_per_line: (usize::from(viewport.columns) * 100 / scale).max(MIN_CHARS_PER_LINE),
            rows_per_page: (usize::from(viewport.rows) * 100 / scale).max(MIN_ROWS_PER_PAGE),
        }
    }

    /// A spread shows two pages side by side, each half the width.
    pub fn for_spread(self) -> Self {
        Self {
            chars_per_line: (self.chars_per_line / 2).max(MIN_CHARS_PER_LINE),
            ..self
        }
    }
}

/// Wrap `text` into lines no wider than `width` characters. Blank source lines
/// are kept as paragraph breaks; words longer than a line are hard-split.
pub fn wrap_lines(text: &str, width: usize) -> Vec<Line> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut line_start = 0usize;

    for raw in text.split_inclusive('\n') {
        let content = raw.trim_end_matches(['\n', '\r']);
        if content.trim().is_empty() {
            lines.push(Line {
                offset: line_start,
                text: String::new(),
            });
        } else {
            wrap_paragraph_line(content, line_start, width, &mut lines);
        }
        line_start += raw.len();
    }

    if lines.is_empty() {
        lines.push(Line {
            offset: 0,
            text: String::new(),
        });
    }
    lines
}

fn wrap_paragraph_line(content: &str, base: usize, width: usize, out: &mut Vec<Line>) {
    let mut current = String::new();
    let mut current_offset = base;
    let mut current_chars = 0usize;

    for (word_start, word) in split_words(content) {
        let word_chars = word.chars().count();
        if word_chars > width {
            if !current.is_empty() {
                out.push(Line {
                    offset: current_offset,
                    text: std::mem::take(&mut current),
                });
                current_chars = 0;
            }
            let mut chunk_offset = base + word_start;
            let mut chunk = String::new();
            for ch in word.chars() {
                if chunk.chars().count() == width {
                    let len = chunk.len();
                    out.push(Line {
                        offset: chunk_offset,
                        text: std::mem::take(&mut chunk),
                    });
                    chunk_offset += len;
                }
                chunk.push(ch);
            }
            current_offset = chunk_offset;
            current_chars = chunk.chars().count();
            current = chunk;
            continue;
        }

        let needed = if current.is_empty() {
            word_chars
        } else {
            current_chars + 1 + word_chars
        };
        if needed > width && !current.is_empty() {
            out.push(Line {
                offset: current_offset,
                text: std::mem::take(&mut current),
            });
            current_chars = 0;
        }
        if current.is_empty() {
            current_offset = base + word_start;
            current.push_str(word);
            current_chars = word_chars;
        } else {
            current.push(' ');
            current.push_str(word);
            current_chars += 1 + word_chars;
        }
    }

    if !current.is_empty() {
        out.push(Line {
            offset: current_offset,
            text: current,
        });
    }
}

/// Whitespace-separated words with their byte offsets.
fn split_words(content: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start = None;
    for (idx, ch) in content.char_indices() {
        if ch.is_whitespace() {
            if let Some(begin) = start.take() {
                words.push((begin, &content[begin..idx]));
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(begin) = start {
        words.push((begin, &content[begin..]));
    }
    words
}

/// Index of the last line starting at or before `offset`.
pub fn line_for_offset(lines: &[Line], offset: usize) -> usize {
    match lines.binary_search_by(|line| line.offset.cmp(&offset)) {
        Ok(index) => index,
        Err(0) => 0,
        Err(insert) => insert - 1,
    }
}

/// Group lines into pages of `rows` lines.
pub fn paginate(lines: &[Line], rows: usize) -> Vec<Vec<Line>> {
    let rows = rows.max(1);
    if lines.is_empty() {
        return vec![Vec::new()];
    }
    lines.chunks(rows).map(<[Line]>::to_vec).collect()
}

pub fn join_lines(lines: &[Line]) -> String {
    lines
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
