/*
 * Responsibility
 * - 検証済み claims → granted authority 集合への写像（純関数、I/O なし）
 * - realm_access.roles と resource_access.<client_id>.roles を合算する
 */
use std::collections::HashSet;

use serde_json::Value;

/// Map verified token claims to the set of granted authorities.
///
/// Keycloak embeds roles in two places:
/// - `realm_access.roles` — realm-wide roles
/// - `resource_access.<client_id>.roles` — roles scoped to one client
///
/// Both claims are optional. Absence or an unexpected shape at any level
/// contributes nothing; this function never fails. A token with neither
/// claim yields an empty set ("authenticated but has no permissions").
pub fn extract_authorities(claims: &Value, client_id: &str) -> HashSet<String> {
    let mut authorities = HashSet::new();

    push_roles(claims.get("realm_access"), &mut authorities);

    // Only the entry for our own client id contributes; other clients' roles
    // are not ours to grant.
    let client_entry = claims
        .get("resource_access")
        .and_then(Value::as_object)
        .and_then(|access| access.get(client_id));

    push_roles(client_entry, &mut authorities);

    authorities
}

/// Collect `roles` out of an access entry (`{"roles": ["a", "b"]}`).
///
/// Shape mismatches (missing entry, non-object entry, non-array `roles`,
/// non-string elements) are skipped silently.
fn push_roles(entry: Option<&Value>, out: &mut HashSet<String>) {
    let Some(Value::Object(map)) = entry else {
        return;
    };
    let Some(Value::Array(roles)) = map.get("roles") else {
        return;
    };

    out.extend(roles.iter().filter_map(Value::as_str).map(str::to_owned));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_role_claims_yields_empty_set() {
        let claims = json!({"sub": "1234", "iss": "https://idp.example.com/realms/portal"});
        assert!(extract_authorities(&claims, "orders").is_empty());
    }

    #[test]
    fn realm_roles_are_granted() {
        let claims = json!({"realm_access": {"roles": ["admin"]}});
        assert_eq!(extract_authorities(&claims, "orders"), set(&["admin"]));
    }

    #[test]
    fn client_roles_for_configured_client_are_granted() {
        let claims = json!({
            "resource_access": {
                "orders": {"roles": ["products:read"]}
            }
        });
        assert_eq!(
            extract_authorities(&claims, "orders"),
            set(&["products:read"])
        );
    }

    #[test]
    fn other_clients_roles_are_excluded() {
        let claims = json!({
            "resource_access": {
                "billing": {"roles": ["invoices:write"]},
                "orders": {"roles": ["products:read"]}
            }
        });
        assert_eq!(
            extract_authorities(&claims, "orders"),
            set(&["products:read"])
        );
    }

    #[test]
    fn realm_and_client_roles_are_unioned() {
        let claims = json!({
            "realm_access": {"roles": ["admin", "products:read"]},
            "resource_access": {
                "orders": {"roles": ["products:read", "products:write"]}
            }
        });
        // Duplicates collapse; ordering is irrelevant.
        assert_eq!(
            extract_authorities(&claims, "orders"),
            set(&["admin", "products:read", "products:write"])
        );
    }

    #[test]
    fn malformed_realm_access_contributes_nothing() {
        for claims in [
            json!({"realm_access": "not-a-mapping"}),
            json!({"realm_access": ["roles"]}),
            json!({"realm_access": {"roles": "admin"}}),
            json!({"realm_access": {"roles": {"admin": true}}}),
            json!({"realm_access": {}}),
        ] {
            assert!(
                extract_authorities(&claims, "orders").is_empty(),
                "claims: {claims}"
            );
        }
    }

    #[test]
    fn malformed_resource_access_contributes_nothing() {
        for claims in [
            json!({"resource_access": "orders"}),
            json!({"resource_access": ["orders"]}),
            json!({"resource_access": {"orders": "roles"}}),
            json!({"resource_access": {"orders": {"roles": 42}}}),
            json!({"resource_access": {"orders": {}}}),
        ] {
            assert!(
                extract_authorities(&claims, "orders").is_empty(),
                "claims: {claims}"
            );
        }
    }

    #[test]
    fn non_string_role_entries_are_skipped() {
        let claims = json!({"realm_access": {"roles": ["admin", 42, null, {"x": 1}]}});
        assert_eq!(extract_authorities(&claims, "orders"), set(&["admin"]));
    }

    #[test]
    fn extraction_is_idempotent() {
        let claims = json!({
            "realm_access": {"roles": ["admin"]},
            "resource_access": {"orders": {"roles": ["products:read"]}}
        });
        assert_eq!(
            extract_authorities(&claims, "orders"),
            extract_authorities(&claims, "orders")
        );
    }

    #[test]
    fn non_object_claims_yield_empty_set() {
        assert!(extract_authorities(&json!("not-an-object"), "orders").is_empty());
        assert!(extract_authorities(&json!(null), "orders").is_empty());
    }
}
