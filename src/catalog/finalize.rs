use std::sync::LazyLock;

use regex::Regex;

use super::extract::{description, event_from_code, event_from_readme, fields_from_code, table_from_code, table_from_readme};
use super::rules::{
    unit_policy, AJAX_PROCESSOR_MARKER, PORTAL_CATEGORY, SCRIPT_INCLUDE_TYPES, SPECIALIZED_CATEGORY,
    SPECIALIZED_TYPE,
};
use super::schema::{Field, Record};

static CONTROLLER_AS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"controllerAs\s*:\s*['"]([A-Za-z_$][\w$]*)['"]"#).unwrap());
static SELF_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:var|let|const)\s+([A-Za-z_$][\w$]*)\s*=\s*this\s*;").unwrap());
static LINK_FN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bfunction\s+link\s*\([^)]*\)\s*\{").unwrap());

const FIELD_NAME_LIMIT: usize = 3;
const TABLE_SOURCES: &[Field] = &[Field::ClientScript, Field::Code, Field::ScriptInclude, Field::ServerScript];

/// Cross-field derivations on an assembled record. Each rule only fills a
/// field that is still empty, except the readme copy which always wins.
pub fn finalize(mut record: Record, readme: &str, category: &str, subcategory: &str) -> Record {
    if record.is_empty(Field::Description) {
        record.set_if_empty(Field::Description, &description(readme));
    }

    if record.is_empty(Field::ClientSideType) {
        let mut event = event_from_readme(readme);
        if event.is_empty() {
            let script = first_non_empty(&record, &[Field::ClientScript, Field::ClientScriptV2]);
            event = event_from_code(script).unwrap_or_default().to_string();
        }
        record.set_if_empty(Field::ClientSideType, &event);
    }

    if record.is_empty(Field::Table) {
        let mut table = table_from_readme(readme);
        if table.is_empty() {
            table = TABLE_SOURCES
                .iter()
                .map(|f| table_from_code(record.get(*f)))
                .find(|t| !t.is_empty())
                .unwrap_or_default();
        }
        record.set_if_empty(Field::Table, &table);
    }

    if record.is_empty(Field::FieldName) {
        let fields = fields_from_code(record.get(Field::ClientScript));
        let top: Vec<&str> = fields.iter().take(FIELD_NAME_LIMIT).map(String::as_str).collect();
        record.set_if_empty(Field::FieldName, &top.join(", "));
    }

    if category == SPECIALIZED_CATEGORY && record.is_empty(Field::TypeForSpecializedAreas) {
        record.set_if_empty(Field::TypeForSpecializedAreas, subcategory);
        if record.get(Field::ScriptType) == subcategory {
            record.set(Field::ScriptType, SPECIALIZED_TYPE);
        }
    }

    if (category, subcategory) == PORTAL_CATEGORY && !record.is_empty(Field::ClientScript) {
        let alias = controller_as(record.get(Field::ClientScript));
        record.set_if_empty(Field::ControllerAs, &alias);
        let link = link_function(record.get(Field::ClientScript));
        record.set_if_empty(Field::Link, &link);
    }

    if record.is_empty(Field::ClientCallable)
        && SCRIPT_INCLUDE_TYPES.iter().any(|t| *t == record.get(Field::ScriptType))
        && record.get(Field::ScriptInclude).contains(AJAX_PROCESSOR_MARKER)
    {
        record.set(Field::ClientCallable, "true");
    }

    for (field, value) in unit_policy(record.get(Field::RepoPath)).defaults {
        record.set_if_empty(*field, value);
    }

    record.set(Field::DescriptionMarkdown, readme.trim());
    record
}

fn first_non_empty<'a>(record: &'a Record, fields: &[Field]) -> &'a str {
    fields
        .iter()
        .map(|f| record.get(*f))
        .find(|v| !v.is_empty())
        .unwrap_or("")
}

/// Controller alias: an explicit `controllerAs`, else `var x = this;`.
pub fn controller_as(script: &str) -> String {
    CONTROLLER_AS_RE
        .captures(script)
        .or_else(|| SELF_ALIAS_RE.captures(script))
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}

/// Source of `function link(...) { ... }`, verbatim. Braces inside strings
/// and comments are ignored. Unbalanced input yields an empty string.
pub fn link_function(script: &str) -> String {
    let Some(m) = LINK_FN_RE.find(script) else {
        return String::new();
    };
    match matching_brace(script, m.end()) {
        Some(end) => script[m.start()..=end].to_string(),
        None => String::new(),
    }
}

/// Byte offset of the `}` closing a block whose `{` ends just before `start`.
fn matching_brace(src: &str, start: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 1usize;
    let mut i = start;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= bytes.len() {
                    return None;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                if i + 1 >= bytes.len() {
                    return None;
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

// ── Tests ──
