//! Data models for events, rules, detections, incidents and notifications.

pub mod batch_state;
pub mod detection;
pub mod event;
pub mod incident;
pub mod notification;
pub mod rule;
pub mod severity;
pub mod user;

pub use batch_state::BatchState;
pub use detection::{Detection, DetectionAnalysis, NewDetection};
pub use event::{Event, EventStatus, NewEvent, NewNormalizedEvent, NormalizedEvent};
pub use incident::{Incident, IncidentFilter, IncidentStatus, IncidentUpdate, NewIncident};
pub use notification::{
    ChannelKind, DeliveryStatus, NewNotificationLog, NewRoutingRule, NotificationFormat,
    NotificationLog, RoutingRule,
};
pub use rule::{NewRule, Predicate, Rule, RuleConditions, RuleUpdate};
pub use severity::{Scope, Severity};
pub use user::{NewUser, User};
