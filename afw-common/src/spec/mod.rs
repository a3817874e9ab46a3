//! Declarative entity specs
//!
//! An [`EntitySpec`] describes one record type: its table, its fields with
//! their validation rules, and which roles may perform which actions. Specs
//! are immutable once the [`SpecRegistry`] is built.
//!
//! # Usage
//!
//! ```
//! use afw_common::spec::{Action, EntitySpec, FieldSpec, FieldType, Role};
//!
//! let spec = EntitySpec::new("team", "teams")
//!     .field(FieldSpec::new("name", FieldType::Text).required())
//!     .allow(Action::View, &[Role::Partner, Role::Manager]);
//!
//! assert!(spec.allows(Role::Partner, Action::View));
//! assert!(!spec.allows(Role::Partner, Action::Delete));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

mod builtin;
mod registry;

pub use builtin::{builtin_specs, CHAT_PARENTS, MESSAGE_ENTITY};
pub use registry::SpecRegistry;

/// Columns present on every entity table, managed by the query engine
pub const SYSTEM_COLUMNS: [&str; 4] = ["id", "created_at", "updated_at", "created_by"];

/// Name of the soft-delete status value
pub const STATUS_DELETED: &str = "deleted";

/// User role. Flat model: no role implies another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Partner,
    Manager,
    Clerk,
    Client,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Partner, Role::Manager, Role::Clerk, Role::Client];

    /// Firm-side roles
    pub const STAFF: [Role; 3] = [Role::Partner, Role::Manager, Role::Clerk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Partner => "partner",
            Role::Manager => "manager",
            Role::Clerk => "clerk",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown role: {}", s)))
    }
}

/// Operation a user can attempt against an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    List,
    View,
    Create,
    Update,
    Delete,
    Chat,
    React,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::View => "view",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Chat => "chat",
            Action::React => "react",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic field type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Int,
    Float,
    Bool,
    Enum,
    Date,
    Timestamp,
    Json,
    Reference,
    Email,
}

impl FieldType {
    /// SQLite column type used when creating the table
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Int | FieldType::Bool | FieldType::Timestamp => "INTEGER",
            FieldType::Float => "REAL",
            _ => "TEXT",
        }
    }
}

/// One field of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Allowed values for `enum` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Target entity for `reference` fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            options: Vec::new(),
            references: None,
        }
    }

    /// Mark field as required on create
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set enum options
    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    /// Set reference target entity
    pub fn references(mut self, entity: impl Into<String>) -> Self {
        self.references = Some(entity.into());
        self
    }
}

/// Declarative schema and access policy of a record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Action → roles allowed to perform it. Missing action means denied.
    #[serde(default)]
    pub access: BTreeMap<Action, BTreeSet<Role>>,
}

impl EntitySpec {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
            access: BTreeMap::new(),
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Grant an action to a set of roles
    pub fn allow(mut self, action: Action, roles: &[Role]) -> Self {
        self.access.entry(action).or_default().extend(roles.iter().copied());
        self
    }

    /// Look up a declared field
    pub fn get_field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    /// Declared field or system column
    pub fn is_column(&self, name: &str) -> bool {
        SYSTEM_COLUMNS.contains(&name) || self.has_field(name)
    }

    /// Whether records of this entity are soft-deleted via `status`
    pub fn has_status(&self) -> bool {
        self.has_field("status")
    }

    pub fn allows(&self, role: Role, action: Action) -> bool {
        self.access
            .get(&action)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }

    /// Every column name in table order: system columns first
    pub fn column_names(&self) -> Vec<&str> {
        SYSTEM_COLUMNS
            .iter()
            .copied()
            .chain(self.fields.iter().map(|f| f.name.as_str()))
            .collect()
    }

    /// Reject names that cannot be spliced into SQL as identifiers
    pub fn check_identifiers(&self) -> Result<()> {
        for name in [&self.name, &self.table] {
            if !is_identifier(name) {
                return Err(Error::Config(format!("Invalid entity identifier: {:?}", name)));
            }
        }
        for field in &self.fields {
            if !is_identifier(&field.name) {
                return Err(Error::Config(format!(
                    "Invalid field identifier {:?} in entity {}",
                    field.name, self.name
                )));
            }
            if SYSTEM_COLUMNS.contains(&field.name.as_str()) {
                return Err(Error::Config(format!(
                    "Field {} in entity {} shadows a system column",
                    field.name, self.name
                )));
            }
            if field.field_type == FieldType::Enum && field.options.is_empty() {
                return Err(Error::Config(format!(
                    "Enum field {}.{} declares no options",
                    self.name, field.name
                )));
            }
        }
        Ok(())
    }
}

/// `[a-z_][a-z0-9_]*`, at most 63 chars
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() < 64 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
