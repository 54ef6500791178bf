pub mod attachments;
pub mod authz;
pub mod config;
pub mod domain;
pub mod errors;
pub mod money;
pub mod notify;
pub mod pagination;
pub mod payroll;

pub use attachments::{AttachmentError, AttachmentStore, InMemoryAttachmentStore};
pub use authz::{Actor, Role, Scope, ScopeResolver, TeamPolicy};
pub use domain::calendar::{DateKey, MonthKey};
pub use domain::coupon::{Coupon, CouponClearRecord, CouponCode, CouponDraft, CouponStatus};
pub use domain::order::{
    DecisionOutcome, OrderDecision, OrderFilter, OrderId, OrderStatus, OrderSubmission,
};
pub use domain::refund::{
    RefundDraft, RefundEdit, RefundFilter, RefundId, RefundRequest, RefundStatus,
    SettlementOutcome,
};
pub use domain::user::{TeamAssignment, UserAccount, UserId};
pub use domain::warning::{Deduction, DeductionId, Warning, WarningId, WarningTab};
pub use errors::{ApplicationError, DomainError, InterfaceError, PermissionDenied};
pub use money::Money;
pub use notify::{InMemoryNotifier, Notification, NotificationKind, Notifier, TracingNotifier};
pub use pagination::{Cursor, CursorCodec, CursorKey, Page, PageLimits, PageQuery};
pub use payroll::{SalaryEngine, SalaryReport, TeamMonthRow};
