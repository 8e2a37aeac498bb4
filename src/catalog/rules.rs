//! Declarative tables driving classification and record defaults.
//!
//! Category rules are matched against the lowercased unit id, in order.
//! The first rule whose terms all occur decides how a script is classified.

use super::schema::Field;

/// Semantic role of one content file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    ScriptInclude,
    Server,
    PortalServer,
    AssetText,
    Page,
    Unknown,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::ScriptInclude => "script_include",
            Role::Server => "server",
            Role::PortalServer => "portal_server",
            Role::AssetText => "asset_text",
            Role::Page => "page",
            Role::Unknown => "unknown",
        }
    }

    /// Primary field for the role and the field that takes overflow once
    /// the primary is filled.
    pub fn slots(self) -> (Field, Option<Field>) {
        match self {
            Role::Client => (Field::ClientScript, Some(Field::ClientScriptV2)),
            Role::ScriptInclude => (Field::ScriptInclude, None),
            Role::PortalServer => (Field::ServerScript, None),
            Role::Server | Role::Unknown => (Field::Code, Some(Field::Code2)),
            Role::AssetText => (Field::Notes, None),
            Role::Page => (Field::Html, None),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RoleRule {
    /// Every script in the category gets this role.
    Force(Role),
    /// Run the inference cascade. A known result wins; an unknown result
    /// becomes `otherwise`, or falls through to later rules when `None`.
    Infer { otherwise: Option<Role> },
    /// First filename hint that occurs wins; else the client-form marker
    /// decides between `marker` and `fallback`.
    ByFilename {
        hints: &'static [(&'static str, Role)],
        marker: Role,
        fallback: Role,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub terms: &'static [&'static str],
    /// Terms may also match the file's path inside the unit.
    pub match_file: bool,
    pub rule: RoleRule,
}

const fn rule(terms: &'static [&'static str], rule: RoleRule) -> CategoryRule {
    CategoryRule {
        terms,
        match_file: false,
        rule,
    }
}

pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        terms: &["script include"],
        match_file: true,
        rule: RoleRule::Force(Role::ScriptInclude),
    },
    rule(&["client scripts"], RoleRule::Infer { otherwise: Some(Role::Client) }),
    rule(&["catalog client script"], RoleRule::Infer { otherwise: None }),
    rule(
        &["service portal widgets"],
        RoleRule::ByFilename {
            hints: &[
                ("client", Role::Client),
                ("server", Role::PortalServer),
                ("link", Role::Client),
            ],
            marker: Role::Client,
            fallback: Role::PortalServer,
        },
    ),
    rule(
        &["service portal"],
        RoleRule::ByFilename {
            hints: &[
                ("client", Role::Client),
                ("server", Role::PortalServer),
                ("controller", Role::Client),
            ],
            marker: Role::Client,
            fallback: Role::PortalServer,
        },
    ),
    rule(
        &["ui actions"],
        RoleRule::ByFilename {
            hints: &[
                ("script include", Role::ScriptInclude),
                ("scriptinclude", Role::ScriptInclude),
                ("client", Role::Client),
                ("workspace", Role::Client),
                ("server", Role::Server),
            ],
            marker: Role::Client,
            fallback: Role::Server,
        },
    ),
    rule(&["scheduled jobs"], RoleRule::Force(Role::Server)),
    rule(&["background scripts"], RoleRule::Force(Role::Server)),
    rule(&["inbound actions"], RoleRule::Force(Role::Server)),
    rule(&["transform map scripts"], RoleRule::Force(Role::Server)),
    rule(&["core servicenow apis"], RoleRule::Force(Role::Server)),
    rule(&["integration", "mail scripts"], RoleRule::Force(Role::Server)),
];

/// Unit-wide policy, matched like [`CATEGORY_RULES`].
#[derive(Debug, Clone, Copy)]
pub struct UnitPolicy {
    pub terms: &'static [&'static str],
    /// The first unknown script becomes the client script when no file
    /// was classified as client.
    pub require_client: bool,
    /// Bucket for the remaining unknown scripts.
    pub overflow: Role,
    /// Values written after finalization when the field is still empty.
    pub defaults: &'static [(Field, &'static str)],
}

pub const DEFAULT_POLICY: UnitPolicy = UnitPolicy {
    terms: &[],
    require_client: false,
    overflow: Role::Server,
    defaults: &[],
};

pub const UNIT_POLICIES: &[UnitPolicy] = &[UnitPolicy {
    terms: &["catalog client script"],
    require_client: true,
    overflow: Role::ScriptInclude,
    defaults: &[(Field::AppliesTo, "A Catalog Item"), (Field::UiType, "All")],
}];

pub fn terms_match(terms: &[&str], haystack: &str) -> bool {
    !terms.is_empty() && terms.iter().all(|t| haystack.contains(t))
}

pub fn unit_policy(unit_id: &str) -> &'static UnitPolicy {
    let lower = unit_id.to_lowercase();
    UNIT_POLICIES
        .iter()
        .find(|p| terms_match(p.terms, &lower))
        .unwrap_or(&DEFAULT_POLICY)
}

const SCRIPT_TYPES: &[((&str, &str), &str)] = &[
    (("Client-Side Components", "Client Scripts"), "Client Script"),
    (("Client-Side Components", "Catalog Client Script"), "Catalog Client Script"),
    (("Client-Side Components", "UI Actions"), "UI Action"),
    (("Client-Side Components", "UI Macros"), "UI Macro"),
    (("Client-Side Components", "UI Pages"), "UI Page"),
    (("Client-Side Components", "UI Scripts"), "UI Script"),
    (("Client-Side Components", "UX Client Script Include"), "UX Script Include"),
    (("Client-Side Components", "UX Client Scripts"), "UX Client Script"),
    (("Client-Side Components", "UX Data Broker Transform"), "UX Data Broker Transform"),
    (("Core ServiceNow APIs", "GlideAggregate"), "Core API"),
    (("Core ServiceNow APIs", "GlideAjax"), "Core API"),
    (("Core ServiceNow APIs", "GlideDate"), "Core API"),
    (("Core ServiceNow APIs", "GlideDateTime"), "Core API"),
    (("Core ServiceNow APIs", "GlideElement"), "Core API"),
    (("Core ServiceNow APIs", "GlideFilter"), "Core API"),
    (("Core ServiceNow APIs", "GlideHTTPRequest"), "Core API"),
    (("Core ServiceNow APIs", "GlideJsonPath"), "Core API"),
    (("Core ServiceNow APIs", "GlideModal"), "Core API"),
    (("Core ServiceNow APIs", "GlideQuery"), "Core API"),
    (("Core ServiceNow APIs", "GlideRecord"), "Core API"),
    (("Core ServiceNow APIs", "GlideSystem"), "Core API"),
    (("Core ServiceNow APIs", "GlideTableDescriptor"), "Core API"),
    (("Integration", "Mail Scripts"), "Mail Script"),
    (("Modern Development", "Service Portal Widgets"), "Service Portal Widget"),
    (("Server-Side Components", "Script Includes"), "Script Include"),
];

pub const SCRIPT_INCLUDE_TYPES: &[&str] = &["Script Include", "UX Script Include"];
pub const SPECIALIZED_CATEGORY: &str = "Specialized Areas";
pub const SPECIALIZED_TYPE: &str = "Specialized Area";
pub const PORTAL_CATEGORY: (&str, &str) = ("Modern Development", "Service Portal Widgets");
pub const AJAX_PROCESSOR_MARKER: &str = "AbstractAjaxProcessor";

/// Declared type for a unit: table lookup, else the subcategory itself.
pub fn script_type(category: &str, subcategory: &str) -> String {
    SCRIPT_TYPES
        .iter()
        .find(|((c, s), _)| *c == category && *s == subcategory)
        .map(|(_, t)| t.to_string())
        .unwrap_or_else(|| subcategory.to_string())
}

// Inference hint lists, all lowercase.

pub const README_ROLE_PHRASES: &[(&str, Role)] = &[
    ("script include", Role::ScriptInclude),
    ("server script", Role::ScriptInclude),
    ("client script", Role::Client),
];
pub const INCLUDE_NAME_HINTS: &[&str] = &["include", "processor", "server", "script_include", "ajax"];
pub const CLIENT_NAME_HINTS: &[&str] = &["client", "workspace", "portal"];
pub const EVENT_HANDLERS: &[&str] = &["onChange", "onLoad", "onSubmit", "onCellEdit", "onValueChange"];
pub const FORM_MARKER: &str = "g_form";
pub const CLIENT_MARKERS: &[&str] = &["g_form", "g_scratchpad"];
pub const SERVER_IDIOMS: &[&str] = &["class.create", "prototype =", "gs.", "gliderecord"];
