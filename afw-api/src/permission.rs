//! Role-based access checks
//!
//! Flat model: a role may perform an action only if the entity spec lists it for
//! that action. There is no role hierarchy.

use afw_common::spec::{Action, EntitySpec, Role, MESSAGE_ENTITY};
use afw_common::SpecRegistry;
use serde_json::Value;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};

/// Whether `user` may perform `action` on `spec`
pub fn can(user: &CurrentUser, spec: &EntitySpec, action: Action) -> bool {
    spec.allows(user.role, action)
}

/// [`can`], as a `Forbidden` error
pub fn check(user: &CurrentUser, spec: &EntitySpec, action: Action) -> ApiResult<()> {
    if can(user, spec, action) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Role '{}' may not {} {}",
            user.role, action, spec.name
        )))
    }
}

/// Marks a record as internal to the firm
pub const TEAM_ONLY_FIELD: &str = "is_team_only";

/// Whether `user` may see this particular record
///
/// Client users never see records flagged team-only.
pub fn can_see(user: &CurrentUser, record: &Value) -> bool {
    user.role != Role::Client || record.get(TEAM_ONLY_FIELD).and_then(Value::as_bool) != Some(true)
}

/// Whether `user` may read `record` of `entity`
///
/// Adds to [`can_see`]: a chat message is readable only by roles that may
/// chat on its parent entity.
pub fn can_read(user: &CurrentUser, registry: &SpecRegistry, entity: &str, record: &Value) -> bool {
    if !can_see(user, record) {
        return false;
    }
    if entity != MESSAGE_ENTITY {
        return true;
    }
    record
        .get("entity_type")
        .and_then(Value::as_str)
        .and_then(|parent| registry.get(parent))
        .is_some_and(|parent| can(user, parent, Action::Chat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(role: Role) -> CurrentUser {
        CurrentUser {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            name: "U One".to_string(),
            role,
        }
    }

    fn spec() -> EntitySpec {
        EntitySpec::new("review", "reviews")
            .allow(Action::View, &[Role::Partner, Role::Clerk])
            .allow(Action::Delete, &[Role::Partner])
    }

    #[test]
    fn test_messages_follow_parent_chat_access() {
        let registry = SpecRegistry::builtin().unwrap();
        let review_note = json!({"id": "m1", "entity_type": "review", "content": "x"});
        let engagement_note = json!({"id": "m2", "entity_type": "engagement", "content": "y"});
        let orphan = json!({"id": "m3", "content": "z"});

        assert!(!can_read(&user(Role::Client), &registry, "message", &review_note));
        assert!(can_read(&user(Role::Client), &registry, "message", &engagement_note));
        assert!(can_read(&user(Role::Clerk), &registry, "message", &review_note));
        assert!(!can_read(&user(Role::Partner), &registry, "message", &orphan));

        // Other entities only apply the team-only rule
        assert!(can_read(&user(Role::Client), &registry, "rfi", &orphan));
        let hidden = json!({"id": "r1", "is_team_only": true});
        assert!(!can_read(&user(Role::Client), &registry, "rfi", &hidden));
    }

    #[test]
    fn test_role_must_be_listed() {
        let spec = spec();
        for role in Role::ALL {
            let expected = matches!(role, Role::Partner | Role::Clerk);
            assert_eq!(can(&user(role), &spec, Action::View), expected, "{}", role);
        }
    }

    #[test]
    fn test_no_inheritance_between_roles() {
        // Manager is not implied by partner
        assert!(!can(&user(Role::Manager), &spec(), Action::Delete));
    }

    #[test]
    fn test_absent_action_denies_everyone() {
        let spec = spec();
        for role in Role::ALL {
            assert!(!can(&user(role), &spec, Action::Create));
        }
    }

    #[test]
    fn test_check_returns_forbidden() {
        let err = check(&user(Role::Client), &spec(), Action::Delete).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert!(check(&user(Role::Partner), &spec(), Action::Delete).is_ok());
    }

    #[test]
    fn test_team_only_hidden_from_clients() {
        let internal = json!({"id": "m1", "is_team_only": true});
        let open = json!({"id": "m2", "is_team_only": false});
        let unflagged = json!({"id": "m3"});

        assert!(!can_see(&user(Role::Client), &internal));
        assert!(can_see(&user(Role::Client), &open));
        assert!(can_see(&user(Role::Client), &unflagged));
        assert!(can_see(&user(Role::Clerk), &internal));
    }
}
