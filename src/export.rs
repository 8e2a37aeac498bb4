use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::catalog::schema::{Field, Record};

const SHEET_NAME: &str = "Catalog";
const SS_NAMESPACE: &str = "urn:schemas-microsoft-com:office:spreadsheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Csv,
    Json,
    Xml,
}

impl Format {
    /// Format implied by the file extension; unknown extensions get CSV.
    pub fn from_path(path: &Path) -> Format {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Format::Json,
            "xml" | "xls" => Format::Xml,
            _ => Format::Csv,
        }
    }
}

/// Write the table to `path`, creating parent directories as needed.
pub fn write(records: &[Record], path: &Path, format: Format) -> Result<()> {
    let body = match format {
        Format::Csv => to_csv(records),
        Format::Json => to_json(records)?,
        Format::Xml => to_xml(records)?,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn csv_cell(value: &str) -> String {
    if value.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line<'a>(cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = cells.map(csv_cell).collect::<Vec<_>>().join(",");
    line.push_str("\r\n");
    line
}

pub fn to_csv(records: &[Record]) -> String {
    let mut out = csv_line(Field::ALL.iter().map(|f| f.name()));
    for record in records {
        out.push_str(&csv_line(record.values().iter().map(String::as_str)));
    }
    out
}

pub fn to_json(records: &[Record]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// SpreadsheetML 2003: one worksheet, header row first.
pub fn to_xml(records: &[Record]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::PI(BytesPI::new(r#"mso-application progid="Excel.Sheet""#)))?;

    writer.write_event(Event::Start(
        BytesStart::new("Workbook").with_attributes([("xmlns", SS_NAMESPACE), ("xmlns:ss", SS_NAMESPACE)]),
    ))?;
    writer.write_event(Event::Start(BytesStart::new("Worksheet").with_attributes([("ss:Name", SHEET_NAME)])))?;
    writer.write_event(Event::Start(BytesStart::new("Table")))?;

    write_row(&mut writer, Field::ALL.iter().map(|f| f.name()))?;
    for record in records {
        write_row(&mut writer, record.values().iter().map(String::as_str))?;
    }

    writer.write_event(Event::End(BytesEnd::new("Table")))?;
    writer.write_event(Event::End(BytesEnd::new("Worksheet")))?;
    writer.write_event(Event::End(BytesEnd::new("Workbook")))?;

    String::from_utf8(writer.into_inner()).context("SpreadsheetML output is not UTF-8")
}

fn write_row<'a>(writer: &mut Writer<Vec<u8>>, cells: impl Iterator<Item = &'a str>) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("Row")))?;
    for cell in cells {
        writer.write_event(Event::Start(BytesStart::new("Cell")))?;
        writer.write_event(Event::Start(BytesStart::new("Data").with_attributes([("ss:Type", "String")])))?;
        writer.write_event(Event::Text(BytesText::new(cell)))?;
        writer.write_event(Event::End(BytesEnd::new("Data")))?;
        writer.write_event(Event::End(BytesEnd::new("Cell")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Row")))?;
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Record> {
        let mut r = Record::default();
        r.set(Field::Name, "Say \"hi\", twice");
        r.set(Field::Code, "a();\nb();");
        r.set(Field::Table, "incident");
        r.set(Field::Html, "<div class=\"x\">&</div>");
        vec![r]
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(Format::from_path(Path::new("out/catalog.JSON")), Format::Json);
        assert_eq!(Format::from_path(Path::new("catalog.xml")), Format::Xml);
        assert_eq!(Format::from_path(Path::new("catalog.csv")), Format::Csv);
        assert_eq!(Format::from_path(Path::new("catalog")), Format::Csv);
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let csv = to_csv(&sample());
        let mut lines = csv.split("\r\n");
        let header = lines.next().unwrap();
        assert!(header.starts_with("name,description,script_type,"));
        assert_eq!(header.split(',').count(), Field::ALL.len());

        assert!(csv.contains("\"Say \"\"hi\"\", twice\""));
        assert!(csv.contains("\"a();\nb();\""));
        assert!(csv.contains(",incident,"));
        assert!(csv.ends_with("\r\n"));
    }

    #[test]
    fn json_keys_in_field_order() {
        let json = to_json(&sample()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let row = &parsed[0];
        assert_eq!(row["table"], "incident");
        assert_eq!(row.as_object().unwrap().len(), Field::ALL.len());

        let name_at = json.find("\"name\"").unwrap();
        let desc_at = json.find("\"description\"").unwrap();
        let run_time_at = json.find("\"run_time\"").unwrap();
        assert!(name_at < desc_at && desc_at < run_time_at);
    }

    #[test]
    fn xml_escapes_cells() {
        let xml = to_xml(&sample()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<?mso-application progid=\"Excel.Sheet\"?>"));
        assert!(xml.contains("<Worksheet ss:Name=\"Catalog\">"));
        assert!(xml.contains("&lt;div class=&quot;x&quot;&gt;&amp;&lt;/div&gt;"));
        assert_eq!(xml.matches("<Row>").count(), 2);
        assert_eq!(xml.matches("<Cell>").count(), Field::ALL.len() * 2);
    }
}
