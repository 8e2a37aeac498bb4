use super::group::file_name;
use super::rules::{
    terms_match, Role, RoleRule, CATEGORY_RULES, CLIENT_MARKERS, CLIENT_NAME_HINTS,
    EVENT_HANDLERS, FORM_MARKER, INCLUDE_NAME_HINTS, README_ROLE_PHRASES, SERVER_IDIOMS,
};

/// Decide the role of one script.
///
/// `unit_path` is the unit id, `relative_path` the file's path inside the
/// unit. Category rules run first; then readme co-mentions, filename hints
/// and content signatures. The first rule that decides wins.
pub fn classify(unit_path: &str, relative_path: &str, content: &str, readme_lines: &[&str]) -> Role {
    let lower_path = unit_path.to_lowercase();
    let lower_rel = relative_path.to_lowercase();
    let filename = file_name(relative_path);
    let lower_name = filename.to_lowercase();
    let lower_content = content.to_lowercase();

    for category in CATEGORY_RULES {
        let applies = terms_match(category.terms, &lower_path)
            || (category.match_file && terms_match(category.terms, &lower_rel));
        if !applies {
            continue;
        }
        match category.rule {
            RoleRule::Force(role) => return role,
            RoleRule::Infer { otherwise } => match infer(filename, content, readme_lines) {
                Role::Unknown => {
                    if let Some(role) = otherwise {
                        return role;
                    }
                }
                known => return known,
            },
            RoleRule::ByFilename {
                hints,
                marker,
                fallback,
            } => {
                let hinted = hints
                    .iter()
                    .find(|(hint, _)| lower_name.contains(hint))
                    .map(|(_, role)| *role);
                return hinted.unwrap_or(if lower_content.contains(FORM_MARKER) {
                    marker
                } else {
                    fallback
                });
            }
        }
    }

    infer(filename, content, readme_lines)
}

/// Readme co-mention, filename hint, then content signature.
pub fn infer(filename: &str, content: &str, readme_lines: &[&str]) -> Role {
    let name = filename.to_lowercase();
    let content = content.to_lowercase();

    for (phrase, role) in README_ROLE_PHRASES {
        if readme_mentions(filename, readme_lines, phrase) {
            return *role;
        }
    }

    if INCLUDE_NAME_HINTS.iter().any(|h| name.contains(h)) && !content.contains(FORM_MARKER) {
        return Role::ScriptInclude;
    }
    if CLIENT_NAME_HINTS.iter().any(|h| name.contains(h)) {
        return Role::Client;
    }

    let defines_handler = EVENT_HANDLERS
        .iter()
        .any(|h| content.contains(&format!("function {}", h.to_lowercase())));
    if defines_handler || CLIENT_MARKERS.iter().any(|m| content.contains(m)) {
        return Role::Client;
    }
    if SERVER_IDIOMS.iter().any(|t| content.contains(t)) && !content.contains(FORM_MARKER) {
        return Role::ScriptInclude;
    }

    Role::Unknown
}

/// Lowercase alphanumerics only.
pub fn normalize_token(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// True when one readme line names both `phrase` and the file (extension
/// dropped, compared on alphanumerics only).
fn readme_mentions(filename: &str, lines: &[&str], phrase: &str) -> bool {
    let stem = match filename.rfind('.') {
        Some(i) if i > 0 => &filename[..i],
        _ => filename,
    };
    let token = normalize_token(stem);
    if token.is_empty() {
        return false;
    }
    lines
        .iter()
        .any(|line| line.to_lowercase().contains(phrase) && normalize_token(line).contains(&token))
}

// ── Tests ──
