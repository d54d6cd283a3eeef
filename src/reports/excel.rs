//! Minimal `.xlsx` workbook writer.
//!
//! A workbook is a zip archive of SpreadsheetML parts. Cells are written as
//! inline strings or numbers; no shared-string table or styles part is
//! needed. Column widths fit the longest value, capped at
//! [`MAX_COLUMN_WIDTH`].

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ReportError;

// ---

pub const MAX_COLUMN_WIDTH: usize = 30;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    fn display_len(&self) -> usize {
        match self {
            Cell::Text(s) => s.chars().count(),
            Cell::Number(v) => v.to_string().len(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<usize> for Cell {
    fn from(v: usize) -> Self {
        Cell::Number(v as f64)
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    // ---
    pub fn push_row<I, C>(&mut self, cells: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    /// Width per column: longest value + 2, at most [`MAX_COLUMN_WIDTH`].
    pub fn column_widths(&self) -> Vec<usize> {
        // ---
        let columns = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        (0..columns)
            .map(|c| {
                let longest = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(c))
                    .map(Cell::display_len)
                    .max()
                    .unwrap_or(0);
                (longest + 2).min(MAX_COLUMN_WIDTH)
            })
            .collect()
    }

    fn to_xml(&self) -> String {
        // ---
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<worksheet xmlns=\"{}\">",
            MAIN_NS
        );

        let widths = self.column_widths();
        if !widths.is_empty() {
            xml.push_str("<cols>");
            for (i, w) in widths.iter().enumerate() {
                xml.push_str(&format!(
                    "<col min=\"{n}\" max=\"{n}\" width=\"{w}\" customWidth=\"1\"/>",
                    n = i + 1,
                    w = w
                ));
            }
            xml.push_str("</cols>");
        }

        xml.push_str("<sheetData>");
        for (r, row) in self.rows.iter().enumerate() {
            xml.push_str(&format!("<row r=\"{}\">", r + 1));
            for (c, cell) in row.iter().enumerate() {
                let reference = format!("{}{}", column_name(c), r + 1);
                match cell {
                    Cell::Text(s) => xml.push_str(&format!(
                        "<c r=\"{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                        reference,
                        escape_xml(s)
                    )),
                    Cell::Number(v) if v.is_finite() => {
                        xml.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", reference, v))
                    }
                    Cell::Number(_) => {}
                }
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData></worksheet>");
        xml
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, name: impl Into<String>) -> &mut Sheet {
        self.sheets.push(Sheet {
            name: name.into(),
            rows: Vec::new(),
        });
        let last = self.sheets.len() - 1;
        &mut self.sheets[last]
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Serialize to `.xlsx` bytes.
    pub fn to_xlsx(&self) -> Result<Vec<u8>, ReportError> {
        // ---
        self.validate()?;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(self.content_types().as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
                 <Relationships xmlns=\"{}\"><Relationship Id=\"rId1\" \
                 Type=\"{}/officeDocument\" Target=\"xl/workbook.xml\"/></Relationships>",
                PKG_REL_NS, REL_NS
            )
            .as_bytes(),
        )?;

        zip.start_file("xl/workbook.xml", options)?;
        zip.write_all(self.workbook_xml().as_bytes())?;

        zip.start_file("xl/_rels/workbook.xml.rels", options)?;
        zip.write_all(self.workbook_rels().as_bytes())?;

        for (i, sheet) in self.sheets.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
            zip.write_all(sheet.to_xml().as_bytes())?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }

    fn validate(&self) -> Result<(), ReportError> {
        // ---
        if self.sheets.is_empty() {
            return Err(ReportError::Render("workbook has no sheets".into()));
        }
        for (i, sheet) in self.sheets.iter().enumerate() {
            let name = &sheet.name;
            if name.is_empty()
                || name.chars().count() > 31
                || name.contains(['[', ']', ':', '*', '?', '/', '\\'])
            {
                return Err(ReportError::Render(format!("invalid sheet name {:?}", name)));
            }
            if self.sheets[..i].iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
                return Err(ReportError::Render(format!("duplicate sheet name {:?}", name)));
            }
        }
        Ok(())
    }

    fn content_types(&self) -> String {
        // ---
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
             <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
             <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
             <Override PartName=\"/xl/workbook.xml\" \
             ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
        );
        for i in 1..=self.sheets.len() {
            xml.push_str(&format!(
                "<Override PartName=\"/xl/worksheets/sheet{}.xml\" \
                 ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
                i
            ));
        }
        xml.push_str("</Types>");
        xml
    }

    fn workbook_xml(&self) -> String {
        // ---
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <workbook xmlns=\"{}\" xmlns:r=\"{}\"><sheets>",
            MAIN_NS, REL_NS
        );
        for (i, sheet) in self.sheets.iter().enumerate() {
            xml.push_str(&format!(
                "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
                escape_xml(&sheet.name),
                i + 1,
                i + 1
            ));
        }
        xml.push_str("</sheets></workbook>");
        xml
    }

    fn workbook_rels(&self) -> String {
        // ---
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"{}\">",
            PKG_REL_NS
        );
        for i in 1..=self.sheets.len() {
            xml.push_str(&format!(
                "<Relationship Id=\"rId{i}\" Type=\"{ns}/worksheet\" Target=\"worksheets/sheet{i}.xml\"/>",
                i = i,
                ns = REL_NS
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }
}

/// Spreadsheet column letters: 0 → A, 25 → Z, 26 → AA.
fn column_name(mut index: usize) -> String {
    // ---
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}

fn escape_xml(s: &str) -> String {
    // ---
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
