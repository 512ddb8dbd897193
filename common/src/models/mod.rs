//! Shared data models for the admin engine.

pub mod alert;
pub mod metrics;
pub mod operation;
pub mod target;

// Re-export commonly used types
pub use alert::{Alert, AlertSeverity};
pub use metrics::{
    DatabaseOverview, GroupRoleOverview, MetricsSnapshot, RoleOverview, SlowQuery, UserPrivileges,
};
pub use operation::{
    CreateDatabaseRequest, CreateRoleRequest, CreateUserRequest, ObjectKind, OperationPayload,
    OperationResult, OperationStatus, Privilege, RoleProfile,
};
pub use target::ConnectionTarget;
