use tracing::debug;

use super::extract::Metadata;
use super::group::{ContentFile, SnippetUnit};
use super::rules::{script_type, unit_policy, Role};
use super::schema::{Field, Record, RecordBuilder};

/// A content file and, for scripts, the role the classifier gave it.
#[derive(Debug, Clone, Copy)]
pub struct ClassifiedFile<'a> {
    pub file: &'a ContentFile,
    pub role: Option<Role>,
}

/// Where a non-script file goes, decided by extension and path.
/// Returns `(primary, spill)` pairs; `.scss` lands in two fields.
pub fn route_by_extension(file: &ContentFile) -> Vec<(Field, Option<Field>)> {
    match file.extension.as_str() {
        "html" | "htm" => vec![(Field::Html, None)],
        "css" => vec![(Field::Css, None)],
        "scss" => vec![(Field::Scss, None), (Field::Css, None)],
        "xml" => vec![(Field::Code, Some(Field::Code2))],
        "json" => {
            let rel = file.relative_path.to_lowercase();
            if ["option_schema", "options_schema", "option-schema", "options-schema"]
                .iter()
                .any(|m| rel.contains(m))
            {
                vec![(Field::OptionSchema, None)]
            } else if rel.contains("demo") || rel.contains("sample") {
                vec![(Field::DemoData, None)]
            } else {
                vec![(Field::Notes, None)]
            }
        }
        "md" | "txt" => vec![(Field::Notes, None)],
        _ => Vec::new(),
    }
}

/// Turn unknown script roles into concrete ones using the unit policy:
/// when the unit must have a client script and none was found, the first
/// unknown becomes it; every other unknown goes to the overflow bucket.
pub fn resolve_unknowns(unit_id: &str, roles: &[Option<Role>]) -> Vec<Option<Role>> {
    let policy = unit_policy(unit_id);
    let mut need_client = policy.require_client && !roles.contains(&Some(Role::Client));

    roles
        .iter()
        .map(|role| match role {
            Some(Role::Unknown) if need_client => {
                need_client = false;
                Some(Role::Client)
            }
            Some(Role::Unknown) => Some(policy.overflow),
            other => *other,
        })
        .collect()
}

/// Merge one unit's files and readme metadata into a record.
///
/// `files` must be in the unit's content order. Metadata only fills empty
/// fields. Readme code blocks are used when no file supplied server code.
pub fn assemble(
    unit: &SnippetUnit,
    files: &[ClassifiedFile<'_>],
    metadata: &Metadata,
    code_blocks: &[String],
) -> Record {
    let mut row = RecordBuilder::new();

    for (field, value) in metadata.iter() {
        row.set_if_empty(field, value);
    }
    row.set_if_empty(Field::Name, &unit.name);
    row.set_if_empty(Field::ScriptType, &script_type(&unit.category, &unit.subcategory));
    row.set_if_empty(Field::Category, &unit.category);
    row.set_if_empty(Field::Subcategory, &unit.subcategory);
    row.set_if_empty(Field::RepoPath, &unit.unit_id);

    let roles: Vec<Option<Role>> = files.iter().map(|f| f.role).collect();
    let resolved = resolve_unknowns(&unit.unit_id, &roles);

    for (classified, role) in files.iter().zip(resolved) {
        let text = &classified.file.text;
        match role {
            Some(role) => {
                debug!("{}: {} -> {}", unit.unit_id, classified.file.relative_path, role.as_str());
                let (primary, spill) = role.slots();
                row.append_with_spill(primary, spill, text);
            }
            None => {
                for (primary, spill) in route_by_extension(classified.file) {
                    row.append_with_spill(primary, spill, text);
                }
            }
        }
    }

    if row.is_empty(Field::Code) && row.is_empty(Field::ServerScript) {
        if let Some((first, rest)) = code_blocks.split_first() {
            row.append(Field::Code, first);
            for block in rest {
                row.append(Field::Code2, block);
            }
        }
    }

    row.finish()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::extract::extract;

    fn file(rel: &str, text: &str) -> ContentFile {
        let extension = rel.rsplit('.').next().unwrap_or("").to_lowercase();
        ContentFile {
            relative_path: rel.to_string(),
            extension,
            text: text.to_string(),
        }
    }

    fn unit(unit_id: &str, files: Vec<ContentFile>) -> SnippetUnit {
        let parts: Vec<&str> = unit_id.split('/').collect();
        SnippetUnit {
            unit_id: unit_id.to_string(),
            category: parts[0].to_string(),
            subcategory: parts[1].to_string(),
            name: parts[2].to_string(),
            readme_text: None,
            content_files: files,
        }
    }

    #[test]
    fn every_field_present_and_identity_set() {
        let u = unit("Server-Side Components/Script Includes/Util", vec![]);
        let record = assemble(&u, &[], &Metadata::default(), &[]);
        assert_eq!(record.values().len(), crate::catalog::schema::FIELD_COUNT);
        assert_eq!(record.get(Field::Name), "Util");
        assert_eq!(record.get(Field::ScriptType), "Script Include");
        assert_eq!(record.get(Field::RepoPath), "Server-Side Components/Script Includes/Util");
        assert_eq!(record.get(Field::Code), "");
    }

    #[test]
    fn readme_name_beats_folder_name() {
        let u = unit("Server-Side Components/Script Includes/Util", vec![]);
        let meta = extract("Name: Date Utilities\n");
        let record = assemble(&u, &[], &meta, &[]);
        assert_eq!(record.get(Field::Name), "Date Utilities");
    }

    #[test]
    fn same_role_spills_then_joins_in_file_order() {
        let files = vec![file("a.js", "  a  "), file("b.js", "b"), file("c.js", "c")];
        let u = unit("Server-Side Components/Scheduled Jobs/Nightly", files);
        let classified: Vec<ClassifiedFile> = u
            .content_files
            .iter()
            .map(|f| ClassifiedFile { file: f, role: Some(Role::Server) })
            .collect();
        let record = assemble(&u, &classified, &Metadata::default(), &[]);
        assert_eq!(record.get(Field::Code), "a");
        assert_eq!(record.get(Field::Code2), "b\n\nc");
    }

    #[test]
    fn list_join_order_for_one_field() {
        let files = vec![file("a.js", "first"), file("b.js", "second")];
        let u = unit("Server-Side Components/Script Includes/Two", files);
        let classified: Vec<ClassifiedFile> = u
            .content_files
            .iter()
            .map(|f| ClassifiedFile { file: f, role: Some(Role::ScriptInclude) })
            .collect();
        let record = assemble(&u, &classified, &Metadata::default(), &[]);
        assert_eq!(record.get(Field::ScriptInclude), "first\n\nsecond");
    }

    #[test]
    fn catalog_unknowns_fill_client_then_include() {
        let roles = [Some(Role::Unknown), None, Some(Role::Unknown)];
        let resolved = resolve_unknowns("Client-Side Components/Catalog Client Script/Price", &roles);
        assert_eq!(resolved, vec![Some(Role::Client), None, Some(Role::ScriptInclude)]);

        let roles = [Some(Role::Client), Some(Role::Unknown)];
        let resolved = resolve_unknowns("Client-Side Components/Catalog Client Script/Price", &roles);
        assert_eq!(resolved, vec![Some(Role::Client), Some(Role::ScriptInclude)]);
    }

    #[test]
    fn other_unknowns_overflow_to_server() {
        let roles = [Some(Role::Unknown), Some(Role::Unknown)];
        let resolved = resolve_unknowns("Specialized Areas/Misc/Thing", &roles);
        assert_eq!(resolved, vec![Some(Role::Server), Some(Role::Server)]);
    }

    #[test]
    fn extension_routing() {
        assert_eq!(route_by_extension(&file("w.html", "")), vec![(Field::Html, None)]);
        assert_eq!(
            route_by_extension(&file("s.scss", "")),
            vec![(Field::Scss, None), (Field::Css, None)]
        );
        assert_eq!(route_by_extension(&file("option_schema.json", "")), vec![(Field::OptionSchema, None)]);
        assert_eq!(route_by_extension(&file("demo_data.json", "")), vec![(Field::DemoData, None)]);
        assert_eq!(route_by_extension(&file("package.json", "")), vec![(Field::Notes, None)]);
        assert_eq!(route_by_extension(&file("notes.txt", "")), vec![(Field::Notes, None)]);
        assert!(route_by_extension(&file("a.js", "")).is_empty());
    }

    #[test]
    fn readme_blocks_fill_code_only_when_empty() {
        let blocks = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let u = unit("Specialized Areas/Misc/Thing", vec![]);
        let record = assemble(&u, &[], &Metadata::default(), &blocks);
        assert_eq!(record.get(Field::Code), "one");
        assert_eq!(record.get(Field::Code2), "two\n\nthree");

        let files = vec![file("server.js", "data.x = 1;")];
        let u = unit("Modern Development/Service Portal Widgets/Clock", files);
        let classified = [ClassifiedFile { file: &u.content_files[0], role: Some(Role::PortalServer) }];
        let record = assemble(&u, &classified, &Metadata::default(), &blocks);
        assert_eq!(record.get(Field::ServerScript), "data.x = 1;");
        assert_eq!(record.get(Field::Code), "");
    }
}
