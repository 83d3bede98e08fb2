//! Text extraction for binary source formats (PDF, XLSX).
//!
//! The normalizer hands over raw bytes; this module returns plain UTF-8
//! text or an [`ExtractError`], never panics. Spreadsheets come out one line
//! per row with cells separated by tabs.

use std::io::{Cursor, Read};

use quick_xml::events::Event;

use crate::error::ExtractError;

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// pdf-extract can panic on malformed input; that is reported as an error.
pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(result) => result.map_err(|e| ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("extractor panicked".to_string())),
    }
}

pub fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(spreadsheet_err)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_names = list_worksheet_names(&archive);

    let mut sheets = Vec::new();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name)?;
        let rows = extract_sheet_rows(&sheet_xml, &shared_strings)?;
        if !rows.is_empty() {
            sheets.push(rows.join("\n"));
        }
    }
    Ok(sheets.join("\n\n"))
}

/// CSV rows become tab-separated lines; quoting is left as-is.
pub fn extract_csv(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = String::from_utf8_lossy(bytes);
    Ok(text
        .lines()
        .map(|line| line.split(',').map(str::trim).collect::<Vec<_>>().join("\t"))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn spreadsheet_err(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Spreadsheet(e.to_string())
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive.by_name(name).map_err(spreadsheet_err)?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(spreadsheet_err)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Spreadsheet(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Workbooks holding only numbers have no shared string table.
fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    if archive.index_for_name("xl/sharedStrings.xml").is_none() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(last) = strings.last_mut() {
                    last.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => in_t = false,
            Ok(Event::Eof) => break,
            Err(e) => return Err(spreadsheet_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &Archive<'_>) -> Vec<String> {
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

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Value,
}

fn extract_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<String>, ExtractError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut kind = CellKind::Value;
    let mut in_text = false;
    let mut cell_count = 0usize;

    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    cell.clear();
                    kind = CellKind::Value;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"t" {
                            kind = match attr.value.as_ref() {
                                b"s" => CellKind::Shared,
                                b"inlineStr" => CellKind::Inline,
                                _ => CellKind::Value,
                            };
                        }
                    }
                }
                b"v" => in_text = kind != CellKind::Inline,
                b"t" => in_text = kind == CellKind::Inline,
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if kind == CellKind::Shared {
                    if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared_strings.get(i)) {
                        cell.push_str(s);
                    }
                } else {
                    cell.push_str(value);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_text = false,
                b"c" => {
                    if !cell.is_empty() {
                        row.push(std::mem::take(&mut cell));
                        cell_count += 1;
                    }
                }
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join("\t"));
                        row.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(spreadsheet_err(e)),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join("\t"));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn xlsx_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_spreadsheet_error() {
        let err = extract_xlsx(b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Spreadsheet(_)));
    }

    #[test]
    fn xlsx_rows_become_lines() {
        let shared = r#"<sst><si><t>Pair</t></si><si><t>Close</t></si><si><r><t>EUR</t></r><r><t>/USD</t></r></si></sst>"#;
        let sheet = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
            <row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>1.0842</v></c></row>
        </sheetData></worksheet>"#;
        let bytes = xlsx_with(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        let text = extract_xlsx(&bytes).unwrap();
        assert_eq!(text, "Pair\tClose\nEUR/USD\t1.0842");
    }

    #[test]
    fn xlsx_without_shared_strings_keeps_numbers() {
        let sheet = r#"<worksheet><sheetData><row><c><v>42</v></c><c t="inlineStr"><is><t>pips</t></is></c></row></sheetData></worksheet>"#;
        let bytes = xlsx_with(&[("xl/worksheets/sheet1.xml", sheet)]);
        assert_eq!(extract_xlsx(&bytes).unwrap(), "42\tpips");
    }

    #[test]
    fn csv_rows_are_tab_separated() {
        let text = extract_csv(b"symbol, close\nGBPUSD,1.27\n\n").unwrap();
        assert_eq!(text, "symbol\tclose\nGBPUSD\t1.27");
    }
}
