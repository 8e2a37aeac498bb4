//! Readme metadata extraction: ordered pattern cascades per field, plus
//! the code scans used as fallbacks when the readme says nothing.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::rules::EVENT_HANDLERS;
use super::schema::{normalize, Field};

/// Per field, patterns tried in order; the first capture wins.
/// Every pattern stays on one line (`[ \t]` rather than `\s`).
const README_PATTERNS: &[(Field, &[&str])] = &[
    (Field::Name, &[r"(?im)^[ \t>*\-]*(?:job[ \t_]*)?name[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::AppliesTo, &[r"(?im)\bapplies[ \t_]*to[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::Condition, &[r"(?im)\bcondition[ \t]*[:\-][ \t]*(.+)$"]),
    (
        Field::WhenToRun,
        &[
            r"(?im)\bwhen[ \t_]*to[ \t_]*run[ \t]*[:\-][ \t]*(.+)$",
            r"(?im)\bwhen[ \t]*[:\-][ \t]*(.+)$",
        ],
    ),
    (Field::ActionName, &[r"(?im)\baction[ \t_]*name[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::OnClick, &[r"(?im)\bon[ \t_]*click[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::Coalesce, &[r"(?im)\bcoalesce[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::SourceTable, &[r"(?im)\bsource[ \t_]*table[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::TargetTable, &[r"(?im)\btarget[ \t_]*table[ \t]*[:\-][ \t]*(.+)$"]),
    (
        Field::ClientCallable,
        &[
            r"(?im)\bclient[ \t_]*callable[ \t]*[:\-][ \t]*(.+)$",
            r"(?im)\bglide[ \t_]*ajax[ \t_]*enabled[ \t]*[:\-][ \t]*(.+)$",
        ],
    ),
    (Field::ApiName, &[r"(?im)\bapi[ \t_]*name[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::Access, &[r"(?im)\baccessible[ \t_]*from[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::Active, &[r"(?im)^[ \t>*\-]*active[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::MobileCallable, &[r"(?im)\bmobile[ \t_]*callable[ \t]*[:\-][ \t]*(.+)$"]),
    (
        Field::SandboxCallable,
        &[
            r"(?im)\bsandbox[ \t_]*enabled[ \t]*[:\-][ \t]*(.+)$",
            r"(?im)\bsandbox[ \t_]*callable[ \t]*[:\-][ \t]*(.+)$",
        ],
    ),
    (Field::UiType, &[r"(?im)\bui[ \t_]*type[ \t]*[:\-][ \t]*(.+)$"]),
    (
        Field::SysScope,
        &[
            r"(?im)\bsys[ \t_]*scope[ \t]*[:\-][ \t]*(.+)$",
            r"(?im)^[ \t>*\-]*application[ \t]*[:\-][ \t]*(.+)$",
        ],
    ),
    (Field::CatalogItem, &[r"(?im)\bcat(?:alog)?[ \t_]*item[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::DataTable, &[r"(?im)\bdata[ \t_]*table[ \t]*[:\-][ \t]*(.+)$"]),
    (
        Field::FieldName,
        &[
            r"(?im)\bfield[ \t_]*names?[ \t]*[:\-][ \t]*(.+)$",
            r"(?im)\bfields?[ \t]*[:\-][ \t]*(.+)$",
        ],
    ),
    (Field::Link, &[r"(?im)\blink[ \t]*[:\-][ \t]*<?(https?://[^\s>)]+)"]),
    (Field::RunAs, &[r"(?im)\brun[ \t_]*as[ \t]*[:\-][ \t]*(.+)$"]),
    (
        Field::RunStart,
        &[
            r"(?im)\brun[ \t_]*start[ \t]*[:\-][ \t]*(.+)$",
            r"(?im)^[ \t>*\-]*start[ \t]*[:\-][ \t]*(.+)$",
        ],
    ),
    (Field::RunPeriod, &[r"(?im)\brun[ \t_]*period[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::RunDayOfWeek, &[r"(?im)\bday[ \t_]*of[ \t_]*week[ \t]*[:\-][ \t]*(.+)$"]),
    (Field::RunDayOfMonth, &[r"(?im)\bday[ \t_]*of[ \t_]*month[ \t]*[:\-][ \t]*(.+)$"]),
    (
        Field::RunTime,
        &[
            r"(?im)\brun[ \t_]*time[ \t]*[:\-][ \t]*(.+)$",
            r"(?im)^[ \t>*\-]*time[ \t]*[:\-][ \t]*(.+)$",
        ],
    ),
];

static CASCADES: LazyLock<Vec<(Field, Vec<Regex>)>> = LazyLock::new(|| {
    README_PATTERNS
        .iter()
        .map(|(field, patterns)| (*field, patterns.iter().map(|p| Regex::new(p).unwrap()).collect()))
        .collect()
});

static DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)\bdescription[ \t]*[:\-][ \t]*(.+)$").unwrap());
// Lines the description fallback must never pick up.
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:job[ \t_]*)?(?:name|table|applies|type|event|ui|ui[ \t_]*type|scope|sys[ \t_]*scope|application|field|fields|field[ \t_]*names?|condition|when|action|onclick|on[ \t_]*click|source[ \t_]*table|target[ \t_]*table|data[ \t_]*table|coalesce|client[ \t_]*callable|glide[ \t_]*ajax[ \t_]*enabled|mobile[ \t_]*callable|sandbox[ \t_]*enabled|api[ \t_]*name|accessible[ \t_]*from|active|cat(?:alog)?[ \t_]*item|link|run|run[ \t_]*as|run[ \t_]*start|start|run[ \t_]*period|day[ \t_]*of[ \t_]*week|day[ \t_]*of[ \t_]*month|run[ \t_]*time|time)[ \t]*[:\-]",
    )
    .unwrap()
});
static EVENT_RES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    EVENT_HANDLERS
        .iter()
        .map(|h| (*h, Regex::new(&format!(r"(?i)\b{}\b", h)).unwrap()))
        .collect()
});
static EVENT_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t>*\-]*(?:client[ \t_]*side[ \t_]*)?(?:type|event)[ \t]*[:\-][ \t]*`?([A-Za-z_]+)").unwrap()
});
static TABLE_README_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    // Capture is a lowercase table identifier; prose like "A Catalog Item" never matches.
    [
        r"(?m)^[ \t>*\-]*(?i:table(?:[ \t_]*name)?)[ \t]*[:\-][ \t]*`?([a-z0-9_]+(?:\.[a-z0-9_]+)*)`?(?:[ \t,;.)]|$)",
        r"(?m)(?i:\bapplies[ \t_]*to)[ \t]*[:\-][ \t]*`?([a-z0-9_]+(?:\.[a-z0-9_]+)*)`?(?:[ \t,;.)]|$)",
        r"(?m)(?i:\bon[ \t]+table)[ \t]*[:\-][ \t]*`?([a-z0-9_]+(?:\.[a-z0-9_]+)*)`?(?:[ \t,;.)]|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});
static TABLE_CODE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"\bnew\s+Glide(?:Record|RecordSecure|Aggregate)\(\s*['"]([A-Za-z0-9_.]+)['"]\s*\)"#,
        r#"\bGlideRecord\(\s*['"]([A-Za-z0-9_.]+)['"]\s*\)"#,
        r#"\btableName\s*[:=]\s*['"]([A-Za-z0-9_.]+)['"]"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});
static FORM_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\bg_form\.(?:getValue|getControl|setValue|setDisplay|setVisible|setMandatory|setReadOnly|showFieldMsg|clearValue|hideAllSections|addInfoMessage|addErrorMessage)\(\s*['"]([A-Za-z0-9_.]+)['"]"#,
    )
    .unwrap()
});
static CODE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*(?i:javascript|js|json|xml|html|css)[ \t]*\r?\n(.*?)\r?\n[ \t]*```").unwrap()
});
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

/// Fields pulled out of one readme. Absent fields are simply not present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    fields: BTreeMap<Field, String>,
}

impl Metadata {
    #[cfg(test)]
    pub fn get(&self, field: Field) -> &str {
        self.fields.get(&field).map(String::as_str).unwrap_or("")
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.fields.iter().map(|(f, v)| (*f, v.as_str()))
    }

    fn insert(&mut self, field: Field, value: &str) {
        let value = normalize(field, value);
        if !value.is_empty() {
            self.fields.entry(field).or_insert(value);
        }
    }
}

/// Run every field cascade over the readme.
pub fn extract(readme: &str) -> Metadata {
    let mut meta = Metadata::default();
    if readme.trim().is_empty() {
        return meta;
    }
    let text = strip_emphasis(readme);

    for (field, patterns) in CASCADES.iter() {
        if let Some(value) = first_capture(patterns, &text) {
            meta.insert(*field, &value);
        }
    }
    meta.insert(Field::ClientSideType, &event_from_readme(readme));
    meta.insert(Field::Table, &table_from_readme(readme));
    meta.insert(Field::Description, &description(readme));
    meta
}

fn strip_emphasis(text: &str) -> String {
    text.replace("**", "")
}

fn clean(value: &str) -> String {
    value.trim().trim_matches('`').trim().to_string()
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .filter_map(|re| re.captures(text))
        .map(|caps| clean(&caps[1]))
        .find(|v| !v.is_empty())
}

/// Explicit `description:` line, else the first prose line that is not a
/// heading, a fenced code line or a metadata label.
pub fn description(readme: &str) -> String {
    let text = strip_emphasis(readme);
    if let Some(caps) = DESCRIPTION_RE.captures(&text) {
        let value = clean(&caps[1]);
        if !value.is_empty() {
            return value;
        }
    }

    let mut in_fence = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("<!--") {
            continue;
        }
        let body = trimmed.trim_start_matches(|c: char| matches!(c, '-' | '*' | '+' | '>' | '|') || c.is_whitespace());
        if body.is_empty() || LABEL_RE.is_match(body) {
            continue;
        }
        return body.to_string();
    }
    String::new()
}

/// Handler names win over `type:`/`event:` labels. Returns the canonical
/// spelling, e.g. `onChange`.
pub fn event_from_readme(readme: &str) -> String {
    if let Some(event) = event_from_code(readme) {
        return event.to_string();
    }
    let text = strip_emphasis(readme);
    EVENT_LABEL_RE
        .captures(&text)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}

/// First handler name, in handler priority order, that occurs in `text`.
pub fn event_from_code(text: &str) -> Option<&'static str> {
    EVENT_RES
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(name, _)| *name)
}

pub fn table_from_readme(readme: &str) -> String {
    let text = strip_emphasis(readme);
    first_capture(&TABLE_README_RES, &text).unwrap_or_default()
}

/// Table name passed as a string literal to a record constructor.
pub fn table_from_code(code: &str) -> String {
    first_capture(&TABLE_CODE_RES, code).unwrap_or_default()
}

/// Field names passed to form accessors, most frequent first; ties keep
/// the order they were first seen in.
pub fn fields_from_code(code: &str) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for caps in FORM_FIELD_RE.captures_iter(code) {
        let name = &caps[1];
        match counts.iter_mut().find(|(n, _)| n == name) {
            Some((_, count)) => *count += 1,
            None => counts.push((name.to_string(), 1)),
        }
    }
    // sort_by is stable, so first-seen order survives among equals
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(name, _)| name).collect()
}

/// Bodies of fenced code blocks tagged with a code language.
pub fn code_blocks(readme: &str) -> Vec<String> {
    CODE_BLOCK_RE
        .captures_iter(readme)
        .map(|caps| caps[1].trim().to_string())
        .filter(|b| !b.is_empty())
        .collect()
}

/// `<title>` text with whitespace collapsed.
pub fn page_title(html: &str) -> String {
    TITLE_RE
        .captures(html)
        .map(|caps| caps[1].split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

// ── Tests ──
