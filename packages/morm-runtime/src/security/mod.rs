//! Security: ACL checks and Record Rule domain injection (§4.10).

pub mod acl;
pub mod audit;
pub mod record_rules;

pub use acl::{AclTable, Operation, UserContext};
pub use audit::{AuditEntry, AuditLog, MemoryAuditLog, NullAuditLog};
pub use record_rules::RecordRuleSet;
