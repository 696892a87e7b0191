//! Change intent between two descriptors
//!
//! Both sides are rendered to their template resources and compared
//! property by property. Whether a property change forces the platform to
//! replace the resource comes from a static table; this module only reports
//! the hint.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::error::RenderError;
use super::model::ValidatedDescriptor;
use super::render::{resources, Resource};

/// (resource type, property) pairs whose change replaces the resource
const REPLACEMENT_FIELDS: &[(&str, &str)] = &[
    ("AWS::IAM::Role", "RoleName"),
    ("AWS::IAM::Role", "Path"),
    ("AWS::IAM::OIDCProvider", "Url"),
];

fn requires_replacement(resource_type: &str, field: &str) -> bool {
    REPLACEMENT_FIELDS
        .iter()
        .any(|(t, f)| *t == resource_type && *f == field)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Replace,
    Delete,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            ChangeAction::Create => "+ create",
            ChangeAction::Update => "~ update",
            ChangeAction::Replace => "-/+ replace",
            ChangeAction::Delete => "- delete",
        };
        f.write_str(symbol)
    }
}

/// One changed property. `None` means absent on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub requires_replacement: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceChange {
    pub logical_id: String,
    pub resource_type: String,
    pub action: ChangeAction,
    pub fields: Vec<FieldChange>,
}

/// Ordered list of resource changes; empty when nothing differs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub changes: Vec<ResourceChange>,
}

impl Plan {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.changes.len()
    }

    pub fn change(&self, logical_id: &str) -> Option<&ResourceChange> {
        self.changes.iter().find(|c| c.logical_id == logical_id)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_noop() {
            return writeln!(f, "No changes.");
        }
        for change in &self.changes {
            writeln!(f, "{} {} ({})", change.action, change.logical_id, change.resource_type)?;
            for field in &change.fields {
                let hint = if field.requires_replacement { " [forces replacement]" } else { "" };
                writeln!(
                    f,
                    "    {}: {} -> {}{}",
                    field.field,
                    field.before.as_deref().unwrap_or("(absent)"),
                    field.after.as_deref().unwrap_or("(absent)"),
                    hint
                )?;
            }
        }
        writeln!(f, "{} resource change(s).", self.mutation_count())
    }
}

/// (type, properties) of each rendered resource, keyed by logical id
type Snapshot = BTreeMap<String, (&'static str, Map<String, Value>)>;

fn snapshot(descriptor: &ValidatedDescriptor) -> Result<Snapshot, RenderError> {
    resources(descriptor)
        .into_iter()
        .map(|(id, resource)| {
            let resource_type = resource.type_name();
            Ok((id, (resource_type, properties(&resource)?)))
        })
        .collect()
}

fn properties(resource: &Resource<'_>) -> Result<Map<String, Value>, RenderError> {
    let value = serde_json::to_value(resource)?;
    Ok(match value {
        Value::Object(mut object) => match object.remove("Properties") {
            Some(Value::Object(props)) => props,
            _ => Map::new(),
        },
        _ => Map::new(),
    })
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn field_changes(resource_type: &str, before: &Map<String, Value>, after: &Map<String, Value>) -> Vec<FieldChange> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|key| before.get(*key) != after.get(*key))
        .map(|key| FieldChange {
            field: key.clone(),
            before: before.get(key).map(display),
            after: after.get(key).map(display),
            requires_replacement: requires_replacement(resource_type, key),
        })
        .collect()
}

/// Compare two validated descriptors resource by resource
pub fn plan(before: &ValidatedDescriptor, after: &ValidatedDescriptor) -> Result<Plan, RenderError> {
    let old = snapshot(before)?;
    let new = snapshot(after)?;
    let empty = Map::new();

    let mut changes = Vec::new();
    for (id, (resource_type, old_props)) in &old {
        match new.get(id) {
            None => changes.push(ResourceChange {
                logical_id: id.clone(),
                resource_type: resource_type.to_string(),
                action: ChangeAction::Delete,
                fields: field_changes(resource_type, old_props, &empty),
            }),
            Some((_, new_props)) => {
                let fields = field_changes(resource_type, old_props, new_props);
                if fields.is_empty() {
                    continue;
                }
                let action = if fields.iter().any(|f| f.requires_replacement) {
                    ChangeAction::Replace
                } else {
                    ChangeAction::Update
                };
                changes.push(ResourceChange {
                    logical_id: id.clone(),
                    resource_type: resource_type.to_string(),
                    action,
                    fields,
                });
            }
        }
    }

    for (id, (resource_type, new_props)) in new.iter().filter(|(id, _)| !old.contains_key(*id)) {
        changes.push(ResourceChange {
            logical_id: id.clone(),
            resource_type: resource_type.to_string(),
            action: ChangeAction::Create,
            fields: field_changes(resource_type, &empty, new_props),
        });
    }

    Ok(Plan { changes })
}
