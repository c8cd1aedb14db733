use std::collections::HashMap;

use super::types::{AuthUser, Permission};
use crate::config::SecurityConfig;

pub struct PermissionChecker {
    /// API key -> (name, roles)
    keys: HashMap<String, (String, Vec<String>)>,
    /// Role name -> subject patterns -> permissions
    roles: HashMap<String, Vec<(String, Vec<String>)>>,
}

impl PermissionChecker {
    pub fn new(config: &SecurityConfig) -> Self {
        let keys: HashMap<String, (String, Vec<String>)> = config
            .api_keys
            .iter()
            .map(|ak| (ak.key.clone(), (ak.name.clone(), ak.roles.clone())))
            .collect();

        let roles: HashMap<String, Vec<(String, Vec<String>)>> = config
            .roles
            .iter()
            .map(|(name, role_config)| {
                let patterns: Vec<(String, Vec<String>)> = role_config
                    .subjects
                    .iter()
                    .map(|(pat, perms)| (pat.clone(), perms.clone()))
                    .collect();
                (name.clone(), patterns)
            })
            .collect();

        Self { keys, roles }
    }

    pub fn authenticate(&self, api_key: &str) -> Option<AuthUser> {
        self.keys.get(api_key).map(|(name, roles)| {
            let prefix = if api_key.len() > 13 {
                format!("{}...", &api_key[..13])
            } else {
                api_key.to_string()
            };
            AuthUser {
                name: name.clone(),
                roles: roles.clone(),
                key_prefix: prefix,
            }
        })
    }

    pub fn check_permission(&self, user: &AuthUser, subject: &str, permission: Permission) -> bool {
        for role_name in &user.roles {
            if let Some(patterns) = self.roles.get(role_name) {
                for (pattern, perms) in patterns {
                    if glob_match(pattern, subject)
                        && perms.iter().any(|p| p == "*" || p == permission.as_str())
                    {
                        return true;
                    }
                }
            }
        }
        false
    }
}

/// Simple glob matching: only supports trailing `*` (e.g., `orders-*`, `*`)
fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        value.starts_with(prefix)
    } else {
        pattern == value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKeyConfig, RoleConfig};

    fn config() -> SecurityConfig {
        let mut roles = HashMap::new();
        let mut subjects = HashMap::new();
        subjects.insert("orders-*".to_string(), vec!["read".to_string(), "write".to_string()]);
        roles.insert(
            "producer".to_string(),
            RoleConfig { subjects },
        );
        SecurityConfig {
            enabled: true,
            api_keys: vec![ApiKeyConfig {
                key: "secret-key-value".to_string(),
                name: "svc-orders".to_string(),
                roles: vec!["producer".to_string()],
            }],
            roles,
            default_role: "admin".to_string(),
        }
    }

    #[test]
    fn authenticates_known_key() {
        let checker = PermissionChecker::new(&config());
        assert!(checker.authenticate("secret-key-value").is_some());
        assert!(checker.authenticate("unknown").is_none());
    }

    #[test]
    fn checks_subject_glob_and_permission() {
        let checker = PermissionChecker::new(&config());
        let user = checker.authenticate("secret-key-value").unwrap();
        assert!(checker.check_permission(&user, "orders-v1", Permission::Read));
        assert!(!checker.check_permission(&user, "payments-v1", Permission::Read));
        assert!(!checker.check_permission(&user, "orders-v1", Permission::Admin));
    }
}
