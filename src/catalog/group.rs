use std::collections::{BTreeMap, HashMap};

use clap::ValueEnum;

pub const ASSET_ROOT: &str = "assets";
pub const PAGES_ROOT: &str = "pages";

const BASE_FOLDERS: &[&str] = &[
    "Client-Side Components",
    "Core ServiceNow APIs",
    "Integration",
    "Modern Development",
    "Server-Side Components",
    "Specialized Areas",
];

pub const TEXT_EXTENSIONS: &[&str] = &[
    "css", "scss", "html", "htm", "js", "json", "md", "txt", "xml",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
}

impl EntryKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "blob" => Some(EntryKind::Blob),
            "tree" => Some(EntryKind::Tree),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Blob => "blob",
            EntryKind::Tree => "tree",
        }
    }
}

/// One row of the repository listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub path: String,
    pub kind: EntryKind,
}

impl PathEntry {
    #[cfg(test)]
    pub fn blob(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: EntryKind::Blob,
        }
    }
}

/// A top-level folder and how many segments below it name one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootSpec {
    pub prefix: &'static str,
    pub depth: usize,
}

/// Built-in catalog profiles. `All` is the unified scrape; the others
/// restrict the run to one documentation area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    All,
    ClientScripts,
    CatalogClientScripts,
    ScriptIncludes,
    ScheduledJobs,
    BackgroundScripts,
    InboundActions,
    ServerSide,
    SpWidgets,
}

impl Profile {
    pub fn roots(self) -> Vec<RootSpec> {
        let single = |prefix| vec![RootSpec { prefix, depth: 1 }];
        match self {
            Profile::All => BASE_FOLDERS
                .iter()
                .map(|&prefix| RootSpec { prefix, depth: 2 })
                .collect(),
            Profile::ClientScripts => single("Client-Side Components/Client Scripts"),
            Profile::CatalogClientScripts => single("Client-Side Components/Catalog Client Script"),
            Profile::ScriptIncludes => single("Server-Side Components/Script Includes"),
            Profile::ScheduledJobs => single("Server-Side Components/Scheduled Jobs"),
            Profile::BackgroundScripts => single("Server-Side Components/Background Scripts"),
            Profile::InboundActions => single("Server-Side Components/Inbound Actions"),
            Profile::ServerSide => vec![RootSpec {
                prefix: "Server-Side Components",
                depth: 2,
            }],
            Profile::SpWidgets => single("Modern Development/Service Portal Widgets"),
        }
    }

    /// Whether standalone asset and static page records are produced.
    pub fn includes_synthetic(self) -> bool {
        self == Profile::All
    }

    pub fn name(self) -> &'static str {
        match self {
            Profile::All => "all",
            Profile::ClientScripts => "client-scripts",
            Profile::CatalogClientScripts => "catalog-client-scripts",
            Profile::ScriptIncludes => "script-includes",
            Profile::ScheduledJobs => "scheduled-jobs",
            Profile::BackgroundScripts => "background-scripts",
            Profile::InboundActions => "inbound-actions",
            Profile::ServerSide => "server-side",
            Profile::SpWidgets => "sp-widgets",
        }
    }
}

/// File layout of one unit, before any text is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitListing {
    pub readme: Option<String>,
    pub files: Vec<String>,
}

/// One documented folder with its texts loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetUnit {
    pub unit_id: String,
    pub category: String,
    pub subcategory: String,
    pub name: String,
    pub readme_text: Option<String>,
    /// Sorted by relative path; merge order depends on it.
    pub content_files: Vec<ContentFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    pub relative_path: String,
    pub extension: String,
    pub text: String,
}

/// Last path segment.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn extension_of(path: &str) -> String {
    let name = file_name(path);
    match name.rfind('.') {
        Some(i) if i > 0 => name[i + 1..].to_lowercase(),
        _ => String::new(),
    }
}

pub fn is_text_path(path: &str) -> bool {
    TEXT_EXTENSIONS.contains(&extension_of(path).as_str())
}

fn is_readme(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .is_some_and(|name| name.eq_ignore_ascii_case("readme.md"))
}

/// Fold a flat listing into units keyed by `root/<depth segments>`.
///
/// Paths outside the roots, and paths with no file below the unit folder,
/// are dropped. The readme closest to the unit folder wins; any deeper
/// readme is kept as ordinary content. Only text files are listed.
pub fn group(entries: &[PathEntry], roots: &[RootSpec]) -> BTreeMap<String, UnitListing> {
    let mut grouped: BTreeMap<String, UnitListing> = BTreeMap::new();

    for entry in entries.iter().filter(|e| e.kind == EntryKind::Blob) {
        let Some(root) = roots
            .iter()
            .find(|r| entry.path.starts_with(&format!("{}/", r.prefix)))
        else {
            continue;
        };
        let rel = &entry.path[root.prefix.len() + 1..];
        let parts: Vec<&str> = rel.split('/').collect();
        if parts.len() <= root.depth || parts[..root.depth].iter().any(|p| p.is_empty()) {
            continue;
        }
        let unit_id = format!("{}/{}", root.prefix, parts[..root.depth].join("/"));
        let listing = grouped.entry(unit_id).or_default();
        if !is_text_path(&entry.path) {
            continue;
        }
        listing.files.push(entry.path.clone());
    }

    for listing in grouped.values_mut() {
        listing.files.sort();
        let depth = |p: &str| p.matches('/').count();
        let readme = listing
            .files
            .iter()
            .filter(|p| is_readme(p))
            .min_by(|a, b| {
                depth(a.as_str())
                    .cmp(&depth(b.as_str()))
                    .then_with(|| a.cmp(b))
            })
            .cloned();
        if let Some(ref path) = readme {
            listing.files.retain(|p| p != path);
        }
        listing.readme = readme;
    }

    grouped
}

/// Every blob under `root/`, sorted.
pub fn gather(entries: &[PathEntry], root: &str) -> Vec<String> {
    let prefix = format!("{}/", root);
    let mut paths: Vec<String> = entries
        .iter()
        .filter(|e| e.kind == EntryKind::Blob && e.path.starts_with(&prefix))
        .map(|e| e.path.clone())
        .collect();
    paths.sort();
    paths
}

/// Split a unit id into (category, subcategory, name).
pub fn split_unit_id(unit_id: &str) -> (String, String, String) {
    let parts: Vec<&str> = unit_id.split('/').collect();
    match parts.as_slice() {
        [] => (String::new(), String::new(), String::new()),
        [only] => (only.to_string(), String::new(), only.to_string()),
        [first, middle @ .., last] => (first.to_string(), middle.join("/"), last.to_string()),
    }
}

impl UnitListing {
    /// Attach fetched texts. Files whose fetch failed are skipped; a missing
    /// readme text leaves the unit without one.
    pub fn load(&self, unit_id: &str, texts: &HashMap<String, String>) -> SnippetUnit {
        let (category, subcategory, name) = split_unit_id(unit_id);
        let readme_text = self.readme.as_ref().and_then(|p| texts.get(p)).cloned();

        let mut content_files: Vec<ContentFile> = self
            .files
            .iter()
            .filter_map(|path| {
                let text = texts.get(path)?;
                let relative_path = path
                    .strip_prefix(unit_id)
                    .and_then(|r| r.strip_prefix('/'))
                    .unwrap_or(path)
                    .to_string();
                Some(ContentFile {
                    extension: extension_of(path),
                    relative_path,
                    text: text.clone(),
                })
            })
            .collect();
        content_files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        SnippetUnit {
            unit_id: unit_id.to_string(),
            category,
            subcategory,
            name,
            readme_text,
            content_files,
        }
    }

    /// Paths that need fetching for this unit.
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.readme.iter().chain(self.files.iter())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(paths: &[&str]) -> Vec<PathEntry> {
        paths.iter().map(|p| PathEntry::blob(p)).collect()
    }

    #[test]
    fn names_and_extensions() {
        assert_eq!(file_name("a/b/Widget.SCSS"), "Widget.SCSS");
        assert_eq!(file_name("LICENSE"), "LICENSE");
        assert_eq!(extension_of("a/b/Widget.SCSS"), "scss");
        assert_eq!(extension_of("a/.env"), "");
        assert!(is_text_path("x/notes.txt"));
        assert!(!is_text_path("x/shot.png"));
    }

    #[test]
    fn groups_two_segments_deep() {
        let e = entries(&[
            "Client-Side Components/Client Scripts/Hide Field/README.md",
            "Client-Side Components/Client Scripts/Hide Field/script.js",
            "Client-Side Components/Client Scripts/Other/onload.js",
            "README.md",
            "Unrelated/folder/x.js",
        ]);
        let g = group(&e, &Profile::All.roots());
        assert_eq!(g.len(), 2);
        let unit = &g["Client-Side Components/Client Scripts/Hide Field"];
        assert_eq!(
            unit.readme.as_deref(),
            Some("Client-Side Components/Client Scripts/Hide Field/README.md")
        );
        assert_eq!(unit.files.len(), 1);
        assert!(g["Client-Side Components/Client Scripts/Other"].readme.is_none());
    }

    #[test]
    fn depth_one_root_yields_same_unit_ids() {
        let e = entries(&[
            "Server-Side Components/Scheduled Jobs/Nightly Cleanup/readme.MD",
            "Server-Side Components/Scheduled Jobs/Nightly Cleanup/job.js",
        ]);
        let narrow = group(&e, &Profile::ScheduledJobs.roots());
        let wide = group(&e, &Profile::All.roots());
        assert_eq!(narrow, wide);
        assert!(narrow.contains_key("Server-Side Components/Scheduled Jobs/Nightly Cleanup"));
    }

    #[test]
    fn short_paths_are_discarded() {
        let e = entries(&[
            "Client-Side Components/README.md",
            "Client-Side Components/Client Scripts/loose.js",
        ]);
        assert!(group(&e, &Profile::All.roots()).is_empty());
    }

    #[test]
    fn trees_and_binary_files_are_ignored() {
        let mut e = entries(&[
            "Specialized Areas/ATF/Check Form/logo.png",
            "Specialized Areas/ATF/Check Form/step.js",
        ]);
        e.push(PathEntry {
            path: "Specialized Areas/ATF/Check Form".into(),
            kind: EntryKind::Tree,
        });
        let g = group(&e, &Profile::All.roots());
        assert_eq!(g["Specialized Areas/ATF/Check Form"].files, vec![
            "Specialized Areas/ATF/Check Form/step.js".to_string()
        ]);
    }

    #[test]
    fn shallowest_readme_wins() {
        let e = entries(&[
            "Integration/Mail Scripts/Sig/docs/README.md",
            "Integration/Mail Scripts/Sig/README.md",
        ]);
        let g = group(&e, &Profile::All.roots());
        let unit = &g["Integration/Mail Scripts/Sig"];
        assert_eq!(unit.readme.as_deref(), Some("Integration/Mail Scripts/Sig/README.md"));
        assert_eq!(unit.files, vec!["Integration/Mail Scripts/Sig/docs/README.md".to_string()]);
    }

    #[test]
    fn load_sorts_and_skips_missing_texts() {
        let listing = UnitListing {
            readme: Some("A/B/C/README.md".into()),
            files: vec!["A/B/C/b.js".into(), "A/B/C/a.js".into(), "A/B/C/gone.js".into()],
        };
        let texts: HashMap<String, String> = [
            ("A/B/C/b.js", "b"),
            ("A/B/C/a.js", "a"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let unit = listing.load("A/B/C", &texts);
        assert_eq!(unit.category, "A");
        assert_eq!(unit.subcategory, "B");
        assert_eq!(unit.name, "C");
        assert!(unit.readme_text.is_none());
        let rels: Vec<&str> = unit.content_files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(rels, vec!["a.js", "b.js"]);
    }

    #[test]
    fn extension_handling() {
        assert_eq!(extension_of("x/y/Widget.HTML"), "html");
        assert_eq!(extension_of("x/.gitignore"), "");
        assert_eq!(extension_of("x/Makefile"), "");
        assert!(is_text_path("a/b.scss"));
        assert!(!is_text_path("a/b.png"));
    }
}
