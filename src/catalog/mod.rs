pub mod assemble;
pub mod classify;
pub mod extract;
pub mod finalize;
pub mod group;
pub mod rules;
pub mod schema;
pub mod synthetic;

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use assemble::{assemble, ClassifiedFile};
use group::{extension_of, gather, group, is_text_path, PathEntry, Profile, SnippetUnit, ASSET_ROOT, PAGES_ROOT};
use schema::Record;

const CHUNK_SIZE: usize = 256;

/// Classify → extract → assemble → finalize for one unit.
pub fn process_unit(unit: &SnippetUnit) -> Record {
    let readme = unit.readme_text.as_deref().unwrap_or("");
    let lines: Vec<&str> = readme.lines().collect();

    let files: Vec<ClassifiedFile> = unit
        .content_files
        .iter()
        .map(|file| {
            let role = (file.extension == "js")
                .then(|| classify::classify(&unit.unit_id, &file.relative_path, &file.text, &lines));
            ClassifiedFile { file, role }
        })
        .collect();

    let metadata = extract::extract(readme);
    let blocks = extract::code_blocks(readme);
    debug!(
        "{}: {} files, {} metadata fields, {} readme blocks",
        unit.unit_id,
        files.len(),
        metadata.iter().count(),
        blocks.len()
    );

    let record = assemble(unit, &files, &metadata, &blocks);
    finalize::finalize(record, readme, &unit.category, &unit.subcategory)
}

/// Result of one catalog build.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Units by id, then assets, then pages.
    pub records: Vec<Record>,
    pub units: usize,
    /// Wanted text files with no fetched text.
    pub skipped_files: usize,
}

/// Build every record for `profile` from a tree listing and the texts
/// fetched so far. Units run in parallel; output order never depends on
/// it. `tick` is called with the number of units finished per chunk.
pub fn build_catalog(
    entries: &[PathEntry],
    texts: &HashMap<String, String>,
    profile: Profile,
    mut tick: impl FnMut(usize),
) -> Catalog {
    let listings = group(entries, &profile.roots());
    let mut skipped_files = listings
        .values()
        .flat_map(|l| l.paths())
        .filter(|p| !texts.contains_key(*p))
        .count();

    let units: Vec<SnippetUnit> = listings
        .iter()
        .map(|(unit_id, listing)| listing.load(unit_id, texts))
        .collect();

    let mut records = Vec::with_capacity(units.len());
    for chunk in units.chunks(CHUNK_SIZE) {
        let done: Vec<Record> = chunk.par_iter().map(process_unit).collect();
        records.extend(done);
        tick(chunk.len());
    }

    if profile.includes_synthetic() {
        let assets = gather(entries, ASSET_ROOT);
        let pages = gather(entries, PAGES_ROOT);
        skipped_files += synthetic_text_paths(&assets, &pages)
            .filter(|p| !texts.contains_key(*p))
            .count();
        records.extend(synthetic::asset_records(&assets, texts));
        records.extend(synthetic::page_records(&pages, texts));
    }

    Catalog {
        records,
        units: units.len(),
        skipped_files,
    }
}

/// Every path whose text the catalog for `profile` would read.
pub fn wanted_paths(entries: &[PathEntry], profile: Profile) -> Vec<String> {
    let mut paths: Vec<String> = group(entries, &profile.roots())
        .values()
        .flat_map(|l| l.paths().cloned())
        .collect();
    if profile.includes_synthetic() {
        let assets = gather(entries, ASSET_ROOT);
        let pages = gather(entries, PAGES_ROOT);
        paths.extend(synthetic_text_paths(&assets, &pages).cloned());
    }
    paths.sort();
    paths.dedup();
    paths
}

/// Text assets plus `.html` pages: the synthetic files that carry content.
fn synthetic_text_paths<'a>(assets: &'a [String], pages: &'a [String]) -> impl Iterator<Item = &'a String> {
    assets
        .iter()
        .filter(|p| is_text_path(p))
        .chain(pages.iter().filter(|p| extension_of(p) == "html"))
}

// ── Tests ──
