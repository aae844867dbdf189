//! Record Rules: `domain_for(user, model, operation) -> Domain`, injected
//! into every search/read/write so a user's visible record set is narrowed
//! independently of the ACL gate (§4.10, testable property 5).

use morm_core::Domain;

use super::acl::{Operation, UserContext};

struct RecordRule {
    model: String,
    operation: Operation,
    groups: std::collections::HashSet<String>,
    priority: i32,
    domain: Domain,
}

/// Collects every active rule matching `(model, operation)` for a user's
/// groups/roles and conjoins their domains, highest `priority` first
/// (conjunction is commutative, but evaluating in priority order keeps
/// compiled filters deterministic across runs).
#[derive(Default)]
pub struct RecordRuleSet {
    rules: Vec<RecordRule>,
}

impl RecordRuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        model: impl Into<String>,
        operation: Operation,
        groups: impl IntoIterator<Item = String>,
        priority: i32,
        domain: Domain,
    ) -> &mut Self {
        self.rules.push(RecordRule {
            model: model.into(),
            operation,
            groups: groups.into_iter().collect(),
            priority,
            domain,
        });
        self
    }

    #[must_use]
    pub fn domain_for(&self, user: &UserContext, model: &str, operation: Operation) -> Domain {
        if user.is_superuser {
            return Domain::True;
        }
        let mut applicable: Vec<&RecordRule> = self
            .rules
            .iter()
            .filter(|rule| {
                rule.model == model
                    && rule.operation == operation
                    && (!rule.groups.is_disjoint(&user.groups) || !rule.groups.is_disjoint(&user.roles))
            })
            .collect();
        applicable.sort_by(|a, b| b.priority.cmp(&a.priority));
        applicable.into_iter().fold(Domain::True, |acc, rule| acc.and(rule.domain.clone()))
    }
}
