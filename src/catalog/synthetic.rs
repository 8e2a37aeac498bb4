//! Records for files that live outside any snippet unit: shared assets and
//! static pages. They skip classification and fill a reduced field set.

use std::collections::HashMap;

use super::extract::page_title;
use super::finalize::finalize;
use super::group::{extension_of, file_name, is_text_path, ASSET_ROOT, PAGES_ROOT};
use super::rules::Role;
use super::schema::{Field, Record, RecordBuilder};

pub const ASSET_TYPE: &str = "Asset";
pub const PAGE_TYPE: &str = "Static Page";

fn asset_field(extension: &str) -> Field {
    match extension {
        "js" => Field::Code,
        "css" | "scss" => Field::Css,
        "html" | "htm" => Field::Html,
        _ => Role::AssetText.slots().0,
    }
}

/// One record per asset path. Binary assets and failed fetches still get
/// a record, just without content.
pub fn asset_records(paths: &[String], texts: &HashMap<String, String>) -> Vec<Record> {
    let prefix = format!("{}/", ASSET_ROOT);
    paths
        .iter()
        .map(|path| {
            let rel = path.strip_prefix(&prefix).unwrap_or(path);
            let subcategory = match rel.split_once('/') {
                Some((folder, _)) => folder,
                None => "root",
            };

            let mut row = RecordBuilder::new();
            row.set_if_empty(Field::Name, file_name(path));
            row.set_if_empty(Field::ScriptType, ASSET_TYPE);
            row.set_if_empty(Field::Category, ASSET_ROOT);
            row.set_if_empty(Field::Subcategory, subcategory);
            row.set_if_empty(Field::RepoPath, path);
            if is_text_path(path) {
                if let Some(text) = texts.get(path) {
                    row.append(asset_field(&extension_of(path)), text);
                }
            }
            finalize(row.finish(), "", ASSET_ROOT, subcategory)
        })
        .collect()
}

/// One record per `.html` page; the `<title>` becomes the description.
pub fn page_records(paths: &[String], texts: &HashMap<String, String>) -> Vec<Record> {
    paths
        .iter()
        .filter(|path| extension_of(path) == "html")
        .map(|path| {
            let mut row = RecordBuilder::new();
            row.set_if_empty(Field::Name, file_name(path));
            row.set_if_empty(Field::ScriptType, PAGE_TYPE);
            row.set_if_empty(Field::Category, PAGES_ROOT);
            row.set_if_empty(Field::RepoPath, path);
            if let Some(html) = texts.get(path) {
                row.set_if_empty(Field::Description, &page_title(html));
                row.append(Role::Page.slots().0, html);
            }
            finalize(row.finish(), "", PAGES_ROOT, "")
        })
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn assets_routed_by_extension() {
        let paths = vec![
            "assets/logo.png".to_string(),
            "assets/css/site.scss".to_string(),
            "assets/js/app.js".to_string(),
            "assets/readme.txt".to_string(),
        ];
        let t = texts(&[
            ("assets/css/site.scss", "body {}"),
            ("assets/js/app.js", "init();"),
            ("assets/readme.txt", "hello"),
        ]);
        let records = asset_records(&paths, &t);
        assert_eq!(records.len(), 4);

        assert_eq!(records[0].get(Field::Name), "logo.png");
        assert_eq!(records[0].get(Field::Subcategory), "root");
        assert_eq!(records[0].get(Field::Notes), "");

        assert_eq!(records[1].get(Field::Css), "body {}");
        assert_eq!(records[1].get(Field::Subcategory), "css");
        assert_eq!(records[2].get(Field::Code), "init();");
        assert_eq!(records[3].get(Field::Notes), "hello");
        assert!(records.iter().all(|r| r.get(Field::ScriptType) == ASSET_TYPE));
        assert!(records.iter().all(|r| r.get(Field::Category) == "assets"));
    }

    #[test]
    fn pages_take_title() {
        let paths = vec!["pages/index.html".to_string(), "pages/style.css".to_string()];
        let t = texts(&[("pages/index.html", "<html><head><title> Home </title></head></html>")]);
        let records = page_records(&paths, &t);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(Field::Description), "Home");
        assert_eq!(records[0].get(Field::ScriptType), "Static Page");
        assert_eq!(records[0].get(Field::RepoPath), "pages/index.html");
        assert!(records[0].get(Field::Html).starts_with("<html>"));
    }
}
