//! Auth contract (spec §6 "interface only"), implemented as a
//! `PermissionChecker` grounded on the teacher's API-key → roles →
//! subject-pattern → permission map, generalized from collections to
//! subjects.

pub mod audit;
pub mod middleware;
pub mod permissions;
pub mod types;

pub use audit::audit_middleware;
pub use middleware::auth_middleware;
pub use permissions::PermissionChecker;
pub use types::{AuthUser, Permission};
