pub mod auditor;
pub mod correction;
pub mod margin;

pub use auditor::{AuditContext, RiskAuditor};
pub use correction::{correct_stop, stop_is_sane};
