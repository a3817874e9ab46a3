//! Built-in entity specs
//!
//! Single source of truth for the entities served out of the box. An
//! `entity_spec_file` may replace any of these by name.

use super::{Action, EntitySpec, FieldSpec, FieldType, Role};

const STAFF: [Role; 3] = Role::STAFF;
const EVERYONE: [Role; 4] = Role::ALL;
const LEADS: [Role; 2] = [Role::Partner, Role::Manager];
const PARTNER: [Role; 1] = [Role::Partner];

/// Entities that own a chat thread
pub const CHAT_PARENTS: [&str; 3] = ["engagement", "review", "rfi"];

/// Entity holding one row per chat message
pub const MESSAGE_ENTITY: &str = "message";

/// All built-in specs
pub fn builtin_specs() -> Vec<EntitySpec> {
    vec![
        user_spec(),
        client_spec(),
        engagement_spec(),
        review_spec(),
        rfi_spec(),
        team_spec(),
        highlight_spec(),
        message_spec(),
    ]
}

fn user_spec() -> EntitySpec {
    EntitySpec::new("user", "users")
        .field(FieldSpec::new("name", FieldType::Text).required())
        .field(FieldSpec::new("email", FieldType::Email).required())
        .field(
            FieldSpec::new("role", FieldType::Enum)
                .required()
                .options(&["partner", "manager", "clerk", "client"]),
        )
        .field(FieldSpec::new("client_id", FieldType::Reference).references("client"))
        .field(FieldSpec::new("status", FieldType::Enum).options(&["active", "deleted"]))
        .allow(Action::List, &STAFF)
        .allow(Action::View, &STAFF)
        .allow(Action::Create, &PARTNER)
        .allow(Action::Update, &PARTNER)
        .allow(Action::Delete, &PARTNER)
}

fn client_spec() -> EntitySpec {
    EntitySpec::new("client", "clients")
        .field(FieldSpec::new("name", FieldType::Text).required())
        .field(FieldSpec::new("email", FieldType::Email))
        .field(FieldSpec::new("industry", FieldType::Text))
        .field(FieldSpec::new("team_id", FieldType::Reference).references("team"))
        .field(
            FieldSpec::new("status", FieldType::Enum).options(&["active", "inactive", "deleted"]),
        )
        .allow(Action::List, &STAFF)
        .allow(Action::View, &STAFF)
        .allow(Action::Create, &LEADS)
        .allow(Action::Update, &LEADS)
        .allow(Action::Delete, &PARTNER)
}

fn engagement_spec() -> EntitySpec {
    EntitySpec::new("engagement", "engagements")
        .field(FieldSpec::new("name", FieldType::Text).required())
        .field(
            FieldSpec::new("client_id", FieldType::Reference)
                .required()
                .references("client"),
        )
        .field(FieldSpec::new("year", FieldType::Int).required())
        .field(FieldSpec::new("stage", FieldType::Enum).options(&[
            "info_gathering",
            "commencement",
            "team_execution",
            "partner_review",
            "finalization",
            "close_out",
        ]))
        .field(
            FieldSpec::new("status", FieldType::Enum).options(&["active", "archived", "deleted"]),
        )
        .field(FieldSpec::new("fee", FieldType::Float))
        .field(FieldSpec::new("deadline", FieldType::Date))
        .field(FieldSpec::new("team_id", FieldType::Reference).references("team"))
        .field(FieldSpec::new("chat", FieldType::Json))
        .allow(Action::List, &EVERYONE)
        .allow(Action::View, &EVERYONE)
        .allow(Action::Create, &LEADS)
        .allow(Action::Update, &LEADS)
        .allow(Action::Delete, &PARTNER)
        .allow(Action::Chat, &EVERYONE)
}

fn review_spec() -> EntitySpec {
    EntitySpec::new("review", "reviews")
        .field(FieldSpec::new("name", FieldType::Text).required())
        .field(FieldSpec::new("engagement_id", FieldType::Reference).references("engagement"))
        .field(FieldSpec::new("financial_year", FieldType::Text))
        .field(FieldSpec::new("url", FieldType::Text))
        .field(FieldSpec::new("status", FieldType::Enum).options(&["open", "closed", "deleted"]))
        .field(FieldSpec::new("deadline", FieldType::Date))
        .field(FieldSpec::new("chat", FieldType::Json))
        .allow(Action::List, &STAFF)
        .allow(Action::View, &STAFF)
        .allow(Action::Create, &LEADS)
        .allow(Action::Update, &STAFF)
        .allow(Action::Delete, &PARTNER)
        .allow(Action::Chat, &STAFF)
}

fn rfi_spec() -> EntitySpec {
    EntitySpec::new("rfi", "rfis")
        .field(
            FieldSpec::new("engagement_id", FieldType::Reference)
                .required()
                .references("engagement"),
        )
        .field(FieldSpec::new("question", FieldType::Text).required())
        .field(FieldSpec::new("response", FieldType::Text))
        .field(FieldSpec::new("priority", FieldType::Int))
        .field(FieldSpec::new("status", FieldType::Enum).options(&[
            "pending",
            "sent",
            "responded",
            "completed",
            "deleted",
        ]))
        .field(FieldSpec::new("deadline", FieldType::Date))
        .field(FieldSpec::new("responded_at", FieldType::Timestamp))
        .allow(Action::List, &EVERYONE)
        .allow(Action::View, &EVERYONE)
        .allow(Action::Create, &STAFF)
        .allow(Action::Update, &EVERYONE)
        .allow(Action::Delete, &LEADS)
        .allow(Action::Chat, &EVERYONE)
}

fn team_spec() -> EntitySpec {
    EntitySpec::new("team", "teams")
        .field(FieldSpec::new("name", FieldType::Text).required())
        .field(FieldSpec::new("members", FieldType::Json))
        .field(FieldSpec::new("status", FieldType::Enum).options(&["active", "deleted"]))
        .allow(Action::List, &STAFF)
        .allow(Action::View, &STAFF)
        .allow(Action::Create, &PARTNER)
        .allow(Action::Update, &PARTNER)
        .allow(Action::Delete, &PARTNER)
}

fn highlight_spec() -> EntitySpec {
    EntitySpec::new("highlight", "highlights")
        .field(
            FieldSpec::new("review_id", FieldType::Reference)
                .required()
                .references("review"),
        )
        .field(FieldSpec::new("page", FieldType::Int).required())
        .field(FieldSpec::new("position", FieldType::Json).required())
        .field(FieldSpec::new("content", FieldType::Text))
        .field(FieldSpec::new("comment", FieldType::Text))
        .field(FieldSpec::new("color", FieldType::Text))
        .field(
            FieldSpec::new("status", FieldType::Enum).options(&["unresolved", "resolved", "deleted"]),
        )
        .field(FieldSpec::new("reactions", FieldType::Json))
        .allow(Action::List, &STAFF)
        .allow(Action::View, &STAFF)
        .allow(Action::Create, &STAFF)
        .allow(Action::Update, &STAFF)
        .allow(Action::Delete, &LEADS)
        .allow(Action::React, &STAFF)
}

fn message_spec() -> EntitySpec {
    EntitySpec::new(MESSAGE_ENTITY, "messages")
        .field(
            FieldSpec::new("entity_type", FieldType::Enum)
                .required()
                .options(&CHAT_PARENTS),
        )
        .field(FieldSpec::new("entity_id", FieldType::Reference).required())
        .field(FieldSpec::new("content", FieldType::Text).required())
        .field(FieldSpec::new("is_team_only", FieldType::Bool))
        .field(FieldSpec::new("status", FieldType::Enum).options(&["active", "deleted"]))
        .field(FieldSpec::new("reactions", FieldType::Json))
        // Created only through the chat endpoint, which checks the parent
        .allow(Action::List, &STAFF)
        .allow(Action::View, &EVERYONE)
        .allow(Action::Update, &PARTNER)
        .allow(Action::Delete, &LEADS)
        .allow(Action::React, &EVERYONE)
}
