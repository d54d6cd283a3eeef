//! Minimal PDF 1.4 writer for text reports.
//!
//! Supports a title, headings, wrapped paragraphs and a per-page footer on
//! A4 pages using the standard Helvetica fonts, which every viewer ships, so
//! no font data is embedded.

use std::fmt::Write as _;

use crate::error::ReportError;

// ---

const PAGE_WIDTH: f64 = 595.0;
const PAGE_HEIGHT: f64 = 842.0;
const MARGIN: f64 = 72.0;
const FOOTER_Y: f64 = 40.0;

/// Documents longer than this are refused by [`PdfDocument::render`].
pub const MAX_PAGES: usize = 100;

#[derive(Debug, Clone)]
enum Block {
    Title(String),
    Heading(String),
    Text(String),
    Spacer(f64),
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    size: f64,
    bold: bool,
    y: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PdfDocument {
    // ---
    title: Option<String>,
    blocks: Vec<Block>,
    footer: Option<String>,
}

impl PdfDocument {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(&mut self, text: impl Into<String>) -> &mut Self {
        let text = text.into();
        self.title.get_or_insert_with(|| text.clone());
        self.blocks.push(Block::Title(text));
        self
    }

    pub fn heading(&mut self, text: impl Into<String>) -> &mut Self {
        self.blocks.push(Block::Heading(text.into()));
        self
    }

    /// Add text; embedded newlines start new lines.
    pub fn paragraph(&mut self, text: impl Into<String>) -> &mut Self {
        self.blocks.push(Block::Text(text.into()));
        self
    }

    pub fn spacer(&mut self, points: f64) -> &mut Self {
        self.blocks.push(Block::Spacer(points));
        self
    }

    /// Footer text; page numbers are appended on every page.
    pub fn footer(&mut self, text: impl Into<String>) -> &mut Self {
        self.footer = Some(text.into());
        self
    }

    /// Lay out and serialize the document.
    pub fn render(&self) -> Result<Vec<u8>, ReportError> {
        // ---
        if self.blocks.is_empty() {
            return Err(ReportError::Render("document has no content".into()));
        }

        let pages = self.layout();
        if pages.len() > MAX_PAGES {
            return Err(ReportError::Render(format!(
                "document needs {} pages, limit is {}",
                pages.len(),
                MAX_PAGES
            )));
        }

        Ok(self.serialize(&pages))
    }

    /// Render, dropping pages past [`MAX_PAGES`]. Never fails.
    pub fn render_truncated(&self) -> Vec<u8> {
        // ---
        let mut pages = self.layout();
        pages.truncate(MAX_PAGES);
        if pages.is_empty() {
            pages.push(Vec::new());
        }
        self.serialize(&pages)
    }

    fn layout(&self) -> Vec<Vec<Line>> {
        // ---
        let mut pages: Vec<Vec<Line>> = Vec::new();
        let mut page: Vec<Line> = Vec::new();
        let mut y = PAGE_HEIGHT - MARGIN;

        for block in &self.blocks {
            let (text, size, bold, gap_after) = match block {
                Block::Title(t) => (t.as_str(), 20.0, true, 16.0),
                Block::Heading(t) => (t.as_str(), 14.0, true, 4.0),
                Block::Text(t) => (t.as_str(), 10.0, false, 6.0),
                Block::Spacer(points) => {
                    y -= points;
                    continue;
                }
            };
            let leading = size * 1.4;

            for raw_line in text.lines() {
                for wrapped in wrap(raw_line, max_chars(size)) {
                    if y - leading < MARGIN {
                        pages.push(std::mem::take(&mut page));
                        y = PAGE_HEIGHT - MARGIN;
                    }
                    y -= leading;
                    page.push(Line {
                        text: wrapped,
                        size,
                        bold,
                        y,
                    });
                }
            }
            y -= gap_after;
        }

        if !page.is_empty() || pages.is_empty() {
            pages.push(page);
        }
        pages
    }

    fn serialize(&self, pages: &[Vec<Line>]) -> Vec<u8> {
        // ---
        let n = pages.len();
        let info_id = 5 + 2 * n;
        let mut w = PdfWriter::new();

        w.object(1, b"<< /Type /Catalog /Pages 2 0 R >>");

        let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 5 + 2 * i)).collect();
        w.object(
            2,
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), n).as_bytes(),
        );
        w.object(
            3,
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        );
        w.object(
            4,
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
        );

        for (i, lines) in pages.iter().enumerate() {
            let page_id = 5 + 2 * i;
            let content_id = page_id + 1;

            w.object(
                page_id,
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                     /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                    PAGE_WIDTH, PAGE_HEIGHT, content_id
                )
                .as_bytes(),
            );

            let mut content = Vec::new();
            for line in lines {
                let font = if line.bold { "F2" } else { "F1" };
                push_text(&mut content, font, line.size, MARGIN, line.y, &line.text);
            }
            if let Some(footer) = &self.footer {
                let text = format!("{} | Page {} of {}", footer, i + 1, n);
                push_text(&mut content, "F1", 8.0, MARGIN, FOOTER_Y, &text);
            }

            let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
            stream.extend_from_slice(&content);
            stream.extend_from_slice(b"\nendstream");
            w.object(content_id, &stream);
        }

        let mut info = b"<< /Producer (envwatch)".to_vec();
        if let Some(title) = &self.title {
            info.extend_from_slice(b" /Title (");
            info.extend_from_slice(&encode_text(title));
            info.extend_from_slice(b")");
        }
        info.extend_from_slice(b" >>");
        w.object(info_id, &info);

        w.finish(1, info_id)
    }
}

/// Approximate characters per line at `size` for Helvetica.
fn max_chars(size: f64) -> usize {
    ((PAGE_WIDTH - 2.0 * MARGIN) / (size * 0.5)) as usize
}

/// Greedy word wrap. Words longer than `width` are split.
fn wrap(line: &str, width: usize) -> Vec<String> {
    // ---
    let mut out = Vec::new();
    let mut current = String::new();

    for word in line.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            out.push(word.drain(..width).collect());
        }
        let word: String = word.into_iter().collect();

        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if needed > width && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() || out.is_empty() {
        out.push(current);
    }
    out
}

fn push_text(content: &mut Vec<u8>, font: &str, size: f64, x: f64, y: f64, text: &str) {
    // ---
    content.extend_from_slice(format!("BT /{} {} Tf {} {:.2} Td (", font, size, x, y).as_bytes());
    content.extend_from_slice(&encode_text(text));
    content.extend_from_slice(b") Tj ET\n");
}

/// Encode as a WinAnsi PDF string body, escaping delimiters.
fn encode_text(text: &str) -> Vec<u8> {
    // ---
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            ' '..='~' => out.push(c as u8),
            '\u{a0}'..='\u{ff}' => out.push(c as u32 as u8),
            '₂' => out.push(b'2'),
            '•' => out.push(0x95),
            '–' => out.push(0x96),
            '—' => out.push(0x97),
            _ => out.push(b'?'),
        }
    }
    out
}

/// Tracks byte offsets of objects for the cross-reference table.
struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    // ---
    fn new() -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.4\n");
        Self {
            buf,
            offsets: vec![0],
        }
    }

    /// Objects must be written in ascending id order starting at 1.
    fn object(&mut self, id: usize, body: &[u8]) {
        // ---
        debug_assert_eq!(id, self.offsets.len());
        self.offsets.push(self.buf.len());
        self.buf.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn finish(mut self, root: usize, info: usize) -> Vec<u8> {
        // ---
        let xref_at = self.buf.len();
        let mut xref = String::new();
        let _ = writeln!(xref, "xref\n0 {}", self.offsets.len());
        xref.push_str("0000000000 65535 f \n");
        for offset in &self.offsets[1..] {
            let _ = writeln!(xref, "{:010} 00000 n ", offset);
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            self.offsets.len(),
            root,
            info,
            xref_at
        );
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}
