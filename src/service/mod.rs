//! Service layer: moderation business logic

pub mod admin;
pub mod audit;
pub mod authz;
pub mod classifier;
pub mod dialog;
pub mod duration;
pub mod inspector;
pub mod punishment;

pub use admin::AdminApi;
pub use audit::{AuditRouter, AuditTopics};
pub use classifier::{Classifier, MessageClassifier, Verdict, VerdictAction};
pub use dialog::{DialogCommand, DialogOutcome, DialogState, Dialogs, PunishAction};
pub use inspector::{InspectionOutcome, InspectorConfig, MessageInspector, SYSTEM_USER_ID};
pub use punishment::{PunishmentEngine, WarnOutcome};
