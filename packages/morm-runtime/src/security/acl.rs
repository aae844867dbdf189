//! Access Control List checks: `can(user, model, operation) -> bool`.

use std::collections::HashSet;

/// CRUD-shaped operation an ACL or record rule can be declared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

/// The identity an environment acts as: its group/role membership and
/// superuser flag. Carried on `Environment`, not `Record`, since ACL
/// decisions are per-call, not per-record.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub user_id: String,
    pub groups: HashSet<String>,
    pub roles: HashSet<String>,
    pub is_superuser: bool,
}

impl UserContext {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            groups: HashSet::new(),
            roles: HashSet::new(),
            is_superuser: false,
        }
    }

    #[must_use]
    pub fn superuser(user_id: impl Into<String>) -> Self {
        Self {
            is_superuser: true,
            ..Self::new(user_id)
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    fn membership_overlaps(&self, declared_groups: &HashSet<String>) -> bool {
        !declared_groups.is_disjoint(&self.groups) || !declared_groups.is_disjoint(&self.roles)
    }
}

struct AclRule {
    model: String,
    operation: Operation,
    groups: HashSet<String>,
}

/// Evaluates `(model, operation)` ACL rules against a user's group/role
/// membership. Default is deny: a `(model, operation)` pair with no
/// declared rule is inaccessible to non-superusers.
#[derive(Default)]
pub struct AclTable {
    rules: Vec<AclRule>,
}

impl AclTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&mut self, model: impl Into<String>, operation: Operation, groups: impl IntoIterator<Item = String>) -> &mut Self {
        self.rules.push(AclRule {
            model: model.into(),
            operation,
            groups: groups.into_iter().collect(),
        });
        self
    }

    #[must_use]
    pub fn can(&self, user: &UserContext, model: &str, operation: Operation) -> bool {
        if user.is_superuser {
            return true;
        }
        self.rules
            .iter()
            .filter(|rule| rule.model == model && rule.operation == operation)
            .any(|rule| user.membership_overlaps(&rule.groups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_deny_with_no_matching_rule() {
        let table = AclTable::new();
        let user = UserContext::new("u1").with_group("sales");
        assert!(!table.can(&user, "orders", Operation::Read));
    }

    #[test]
    fn membership_in_declared_group_grants_access() {
        let mut table = AclTable::new();
        table.allow("orders", Operation::Read, ["sales".to_string()]);
        let user = UserContext::new("u1").with_group("sales");
        assert!(table.can(&user, "orders", Operation::Read));
    }

    #[test]
    fn superuser_bypasses_every_rule() {
        let table = AclTable::new();
        let user = UserContext::superuser("root");
        assert!(table.can(&user, "orders", Operation::Delete));
    }

    #[test]
    fn unrelated_group_is_denied() {
        let mut table = AclTable::new();
        table.allow("orders", Operation::Read, ["sales".to_string()]);
        let user = UserContext::new("u2").with_group("support");
        assert!(!table.can(&user, "orders", Operation::Read));
    }
}
