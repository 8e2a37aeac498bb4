use serde::ser::{Serialize, SerializeMap, Serializer};

/// How repeated values for one field combine while a record is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// First non-empty value wins; later values are ignored.
    OverwriteIfEmpty,
    /// Values accumulate in order and are joined with a blank line.
    ListAppendJoin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalizer {
    None,
    BoolCanonical,
    Trim,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub merge_policy: MergePolicy,
    pub normalizer: Normalizer,
}

/// Every output column. Declaration order is the export column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Name,
    Description,
    ScriptType,
    ClientScript,
    ScriptInclude,
    Code,
    Code2,
    ClientSideType,
    TypeForSpecializedAreas,
    Table,
    DataTable,
    FieldName,
    Html,
    Css,
    OptionSchema,
    Link,
    Condition,
    WhenToRun,
    RepoPath,
    ActionName,
    ClientScriptV2,
    OnClick,
    Coalesce,
    SourceTable,
    TargetTable,
    ClientCallable,
    Category,
    Subcategory,
    DescriptionMarkdown,
    ServerScript,
    ApiName,
    Access,
    Active,
    MobileCallable,
    SandboxCallable,
    UiType,
    SysScope,
    CatalogItem,
    AppliesTo,
    ControllerAs,
    DemoData,
    Scss,
    Notes,
    RunAs,
    RunStart,
    RunPeriod,
    RunDayOfWeek,
    RunDayOfMonth,
    RunTime,
}

pub const FIELD_COUNT: usize = 49;

impl Field {
    pub const ALL: [Field; FIELD_COUNT] = [
        Field::Name,
        Field::Description,
        Field::ScriptType,
        Field::ClientScript,
        Field::ScriptInclude,
        Field::Code,
        Field::Code2,
        Field::ClientSideType,
        Field::TypeForSpecializedAreas,
        Field::Table,
        Field::DataTable,
        Field::FieldName,
        Field::Html,
        Field::Css,
        Field::OptionSchema,
        Field::Link,
        Field::Condition,
        Field::WhenToRun,
        Field::RepoPath,
        Field::ActionName,
        Field::ClientScriptV2,
        Field::OnClick,
        Field::Coalesce,
        Field::SourceTable,
        Field::TargetTable,
        Field::ClientCallable,
        Field::Category,
        Field::Subcategory,
        Field::DescriptionMarkdown,
        Field::ServerScript,
        Field::ApiName,
        Field::Access,
        Field::Active,
        Field::MobileCallable,
        Field::SandboxCallable,
        Field::UiType,
        Field::SysScope,
        Field::CatalogItem,
        Field::AppliesTo,
        Field::ControllerAs,
        Field::DemoData,
        Field::Scss,
        Field::Notes,
        Field::RunAs,
        Field::RunStart,
        Field::RunPeriod,
        Field::RunDayOfWeek,
        Field::RunDayOfMonth,
        Field::RunTime,
    ];

    /// Column name as it appears in exported tables.
    pub fn name(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Description => "description",
            Field::ScriptType => "script_type",
            Field::ClientScript => "client_script",
            Field::ScriptInclude => "script_include",
            Field::Code => "code",
            Field::Code2 => "code2",
            Field::ClientSideType => "client_side_type",
            Field::TypeForSpecializedAreas => "type_for_specialized_areas",
            Field::Table => "table",
            Field::DataTable => "data_table",
            Field::FieldName => "field_name",
            Field::Html => "html",
            Field::Css => "css",
            Field::OptionSchema => "option_schema",
            Field::Link => "link",
            Field::Condition => "condition",
            Field::WhenToRun => "when_to_run",
            Field::RepoPath => "repo_path",
            Field::ActionName => "action_name",
            Field::ClientScriptV2 => "client_script_v2",
            Field::OnClick => "onClick",
            Field::Coalesce => "coalesce",
            Field::SourceTable => "source_table",
            Field::TargetTable => "target_table",
            Field::ClientCallable => "client_callable",
            Field::Category => "category",
            Field::Subcategory => "subcategory",
            Field::DescriptionMarkdown => "description_markdown",
            Field::ServerScript => "server_script",
            Field::ApiName => "api_name",
            Field::Access => "access",
            Field::Active => "active",
            Field::MobileCallable => "mobile_callable",
            Field::SandboxCallable => "sandbox_callable",
            Field::UiType => "ui_type",
            Field::SysScope => "sys_scope",
            Field::CatalogItem => "catalog_item",
            Field::AppliesTo => "applies_to",
            Field::ControllerAs => "controller_as",
            Field::DemoData => "demo_data",
            Field::Scss => "scss",
            Field::Notes => "notes",
            Field::RunAs => "run_as",
            Field::RunStart => "run_start",
            Field::RunPeriod => "run_period",
            Field::RunDayOfWeek => "run_dayofweek",
            Field::RunDayOfMonth => "run_dayofmonth",
            Field::RunTime => "run_time",
        }
    }

    pub fn merge_policy(self) -> MergePolicy {
        match self {
            Field::ClientScript
            | Field::ClientScriptV2
            | Field::ScriptInclude
            | Field::Code
            | Field::Code2
            | Field::ServerScript
            | Field::Html
            | Field::Css
            | Field::Scss
            | Field::OptionSchema
            | Field::Link
            | Field::DemoData
            | Field::DataTable
            | Field::Notes
            | Field::OnClick => MergePolicy::ListAppendJoin,
            _ => MergePolicy::OverwriteIfEmpty,
        }
    }

    pub fn normalizer(self) -> Normalizer {
        match self {
            Field::ClientCallable
            | Field::MobileCallable
            | Field::SandboxCallable
            | Field::Coalesce
            | Field::Active => Normalizer::BoolCanonical,
            _ if self.merge_policy() == MergePolicy::OverwriteIfEmpty => Normalizer::Trim,
            _ => Normalizer::None,
        }
    }

    pub fn spec(self) -> FieldSpec {
        FieldSpec {
            name: self.name(),
            merge_policy: self.merge_policy(),
            normalizer: self.normalizer(),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.name() == name)
    }
}

/// Canonical truthy/falsy table; anything else passes through trimmed.
pub fn normalize_bool(value: &str) -> String {
    let trimmed = value.trim();
    match trimmed.to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "enabled" | "checked" => "true".to_string(),
        "false" | "no" | "n" | "0" | "disabled" | "unchecked" => "false".to_string(),
        _ => trimmed.to_string(),
    }
}

pub fn normalize(field: Field, value: &str) -> String {
    match field.spec().normalizer {
        Normalizer::BoolCanonical => normalize_bool(value),
        Normalizer::Trim => value.trim().to_string(),
        Normalizer::None => value.to_string(),
    }
}

/// One finished catalog row. Every declared field is always present;
/// the empty string stands for "absent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    values: Vec<String>,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            values: vec![String::new(); FIELD_COUNT],
        }
    }
}

impl Record {
    pub fn get(&self, field: Field) -> &str {
        &self.values[field.index()]
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.values[field.index()] = value.into();
    }

    /// Writes `value` (normalized) only when the field is still empty.
    pub fn set_if_empty(&mut self, field: Field, value: &str) -> bool {
        let normalized = normalize(field, value);
        if self.is_empty(field) && !normalized.is_empty() {
            self.values[field.index()] = normalized;
            return true;
        }
        false
    }

    pub fn is_empty(&self, field: Field) -> bool {
        self.values[field.index()].is_empty()
    }

    /// Values in declared column order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn from_values(values: Vec<String>) -> Option<Self> {
        (values.len() == FIELD_COUNT).then_some(Self { values })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        Field::ALL
            .iter()
            .copied()
            .zip(self.values.iter().map(String::as_str))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FIELD_COUNT))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.name(), value)?;
        }
        map.end()
    }
}

/// Mutable accumulator used while a unit's files are merged.
/// Scalar fields hold one value; list fields collect entries that are
/// joined by [`RecordBuilder::finish`].
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    scalars: Record,
    lists: Vec<Vec<String>>,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self {
            scalars: Record::default(),
            lists: vec![Vec::new(); FIELD_COUNT],
        }
    }

    pub fn is_empty(&self, field: Field) -> bool {
        match field.spec().merge_policy {
            MergePolicy::OverwriteIfEmpty => self.scalars.is_empty(field),
            MergePolicy::ListAppendJoin => self.lists[field.index()].is_empty(),
        }
    }

    /// Appends to a list field, or fills a scalar field if it is empty.
    /// Blank values are dropped.
    pub fn append(&mut self, field: Field, value: &str) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        match field.spec().merge_policy {
            MergePolicy::ListAppendJoin => self.lists[field.index()].push(trimmed.to_string()),
            MergePolicy::OverwriteIfEmpty => {
                self.scalars.set_if_empty(field, trimmed);
            }
        }
    }

    /// Metadata write: never replaces a value that is already there.
    pub fn set_if_empty(&mut self, field: Field, value: &str) {
        if self.is_empty(field) {
            self.append(field, value);
        }
    }

    /// Appends to `primary` while it is empty, otherwise spills into `secondary`.
    pub fn append_with_spill(&mut self, primary: Field, secondary: Option<Field>, value: &str) {
        match secondary {
            Some(spill) if !self.is_empty(primary) => self.append(spill, value),
            _ => self.append(primary, value),
        }
    }

    pub fn finish(self) -> Record {
        let mut record = self.scalars;
        for (field, entries) in Field::ALL.iter().copied().zip(self.lists) {
            if field.merge_policy() == MergePolicy::ListAppendJoin {
                let joined = entries
                    .iter()
                    .map(|e| e.trim())
                    .filter(|e| !e.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                record.set(field, joined);
            }
        }
        record
    }
}

// ── Tests ──
