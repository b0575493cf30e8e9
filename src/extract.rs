//! Text extraction for the binary and tabular input formats.
//!
//! The loader hands raw bytes to these functions and gets back UTF-8 text:
//! one string per page for PDF, a markdown-style table rendering for CSV and
//! XLSX, and encoding-detected text for plain files.

use std::collections::BTreeMap;
use std::io::Read;

use thiserror::Error;

/// Maximum sheets to render from a workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Last column a worksheet can address (`XFD`), zero-based.
const XLSX_MAX_COLUMN: u32 = 16_383;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction failure. The loader wraps it into a `LoadError` naming the file.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("XLSX extraction failed: {0}")]
    Ooxml(String),
    #[error("CSV parsing failed: {0}")]
    Csv(String),
    #[error("text decoding failed: {0}")]
    Encoding(String),
}

/// Extract text page by page. Index `i` of the result is page `i + 1`.
///
/// `pdf-extract` can panic on some malformed files; a panic is reported as
/// an ordinary extraction error.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(result) => result.map_err(|e| ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked on malformed input".to_string())),
    }
}

/// Decode a plain-text file, detecting its character encoding.
///
/// A byte-order mark wins; otherwise valid UTF-8 is taken as is, and anything
/// else goes through `chardetng`'s guess. Text that still contains NUL
/// characters after decoding is treated as binary and rejected.
pub fn decode_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = if let Some((encoding, bom_len)) = encoding_rs::Encoding::for_bom(bytes) {
        let (decoded, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        if had_errors {
            return Err(ExtractError::Encoding(format!(
                "invalid {} byte sequence",
                encoding.name()
            )));
        }
        decoded.into_owned()
    } else if let Ok(s) = std::str::from_utf8(bytes) {
        s.to_string()
    } else {
        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(bytes, true);
        let encoding = detector.guess(None, true);
        let (decoded, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            return Err(ExtractError::Encoding(format!(
                "bytes are not valid {}",
                encoding.name()
            )));
        }
        decoded.into_owned()
    };

    if text.contains('\0') {
        return Err(ExtractError::Encoding(
            "file looks binary (contains NUL characters)".to_string(),
        ));
    }
    Ok(text)
}

/// Render a CSV file as a markdown table. The first record is the header.
pub fn csv_to_markdown(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = decode_text(bytes).map_err(|e| ExtractError::Csv(e.to_string()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractError::Csv(e.to_string()))?;
        rows.push(record.iter().map(|f| f.trim().to_string()).collect());
    }
    Ok(render_markdown_table(&rows))
}

/// Render rows as a markdown table, padding short rows to the widest one.
///
/// The first row is the header. Pipes and newlines inside cells are escaped
/// so every row stays on a single line.
pub fn render_markdown_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let render_row = |row: &[String]| -> String {
        let mut line = String::from("|");
        for i in 0..width {
            let cell = row.get(i).map(|c| escape_cell(c)).unwrap_or_default();
            line.push(' ');
            line.push_str(&cell);
            line.push_str(" |");
        }
        line
    };

    let mut out = Vec::with_capacity(rows.len() + 1);
    out.push(render_row(&rows[0]));
    out.push(format!("|{}", " --- |".repeat(width)));
    for row in &rows[1..] {
        out.push(render_row(row));
    }
    out.join("\n")
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Render every worksheet of an XLSX workbook as a markdown table.
pub fn xlsx_to_markdown(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let shared_strings = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };
    let sheet_names = list_worksheet_names(&archive);
    if sheet_names.is_empty() {
        return Err(ExtractError::Ooxml("workbook has no worksheets".to_string()));
    }

    let mut sections = Vec::new();
    for (idx, name) in sheet_names.into_iter().take(XLSX_MAX_SHEETS).enumerate() {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let rows = read_sheet_rows(&sheet_xml, &shared_strings)?;
        if rows.is_empty() {
            continue;
        }
        sections.push(format!(
            "## Sheet {}\n\n{}",
            idx + 1,
            render_markdown_table(&rows)
        ));
    }
    Ok(sections.join("\n\n"))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().unwrap_or_default());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Cell type attribute (`t="…"`) of the cell being read.
#[derive(Clone, Copy, PartialEq, Eq)]
enum CellType {
    SharedString,
    InlineString,
    Boolean,
    Other,
}

/// Read a worksheet into dense rows. Cell references (`r="C4"`) decide
/// placement, so sparse sheets keep their column alignment. Columns that
/// hold no value in any row are left out of the result.
fn read_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut grid: BTreeMap<u32, BTreeMap<u32, String>> = BTreeMap::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut rows_seen: u32 = 0;
    let mut row_idx: u32 = 0;
    let mut next_col: u32 = 0;
    let mut cell_col: u32 = 0;
    let mut cell_type = CellType::Other;
    let mut in_value = false;
    let mut value = String::new();
    let mut cell_count = 0usize;

    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_idx = attr_value(&e, b"r")
                        .and_then(|r| r.parse::<u32>().ok())
                        .map(|r| r.saturating_sub(1))
                        .unwrap_or(rows_seen);
                    rows_seen = row_idx.saturating_add(1);
                    next_col = 0;
                }
                b"c" => {
                    cell_col = match attr_value(&e, b"r") {
                        Some(r) => column_index(&r)?.unwrap_or(next_col),
                        None => next_col,
                    };
                    if cell_col > XLSX_MAX_COLUMN {
                        return Err(ExtractError::Ooxml(format!(
                            "row {} has more than {} columns",
                            row_idx.saturating_add(1),
                            XLSX_MAX_COLUMN + 1
                        )));
                    }
                    cell_type = match attr_value(&e, b"t").as_deref() {
                        Some("s") => CellType::SharedString,
                        Some("inlineStr") => CellType::InlineString,
                        Some("b") => CellType::Boolean,
                        _ => CellType::Other,
                    };
                    value.clear();
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_value => {
                value.push_str(&te.unescape().unwrap_or_default());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    let rendered = match cell_type {
                        CellType::SharedString => value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i).cloned())
                            .unwrap_or_default(),
                        CellType::Boolean => {
                            let flag = if value.trim() == "1" { "TRUE" } else { "FALSE" };
                            flag.to_string()
                        }
                        CellType::InlineString | CellType::Other => value.trim().to_string(),
                    };
                    if !rendered.is_empty() {
                        grid.entry(row_idx).or_default().insert(cell_col, rendered);
                        cell_count += 1;
                    }
                    next_col = cell_col + 1;
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    // Map each used column to its position in the output row.
    let used: BTreeMap<u32, usize> = grid
        .values()
        .flat_map(|cols| cols.keys().copied())
        .collect::<std::collections::BTreeSet<u32>>()
        .into_iter()
        .enumerate()
        .map(|(pos, col)| (col, pos))
        .collect();
    Ok(grid
        .into_values()
        .map(|cols| {
            let mut row = vec![String::new(); used.len()];
            for (c, v) in cols {
                if let Some(&pos) = used.get(&c) {
                    row[pos] = v;
                }
            }
            row
        })
        .collect())
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Zero-based column index of an A1-style reference (`"C4"` → 2).
///
/// `None` when the reference has no column letters. Columns past `XFD`
/// are an error.
fn column_index(reference: &str) -> Result<Option<u32>, ExtractError> {
    let out_of_range = || ExtractError::Ooxml(format!("cell reference {} is out of range", reference));
    let mut col: u32 = 0;
    let mut any = false;
    for b in reference.bytes().take_while(|b| b.is_ascii_alphabetic()) {
        any = true;
        let digit = u32::from(b.to_ascii_uppercase() - b'A' + 1);
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(digit))
            .filter(|c| *c <= XLSX_MAX_COLUMN + 1)
            .ok_or_else(out_of_range)?;
    }
    Ok(any.then(|| col - 1))
}
