//! Repository traits the rest of the application depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    models::{
        Detection, Event, EventStatus, Incident, IncidentFilter, IncidentUpdate, NewDetection,
        NewEvent, NewIncident, NewNormalizedEvent, NewNotificationLog, NewRoutingRule, NewRule,
        NewUser, NormalizedEvent, NotificationLog, RoutingRule, Rule, RuleUpdate, Severity, User,
    },
    persistence::error::PersistenceError,
};

/// Relational storage for users, events, rules, incidents and the
/// notification audit trail.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AppRepository: Send + Sync {
    // --- Users ---

    /// Creates a user.
    async fn create_user(&self, user: &NewUser) -> Result<User, PersistenceError>;

    /// Retrieves a user by id.
    async fn get_user(&self, user_id: i64) -> Result<Option<User>, PersistenceError>;

    /// Resolves the user owning the given inbound alert id.
    async fn find_user_by_alert_id(&self, alert_id: &str)
    -> Result<Option<User>, PersistenceError>;

    // --- Raw and normalized events ---

    /// Stores a raw webhook event with `pending` status.
    async fn insert_event(&self, event: &NewEvent) -> Result<Event, PersistenceError>;

    /// Updates the processing status of a raw event.
    async fn update_event_status(
        &self,
        event_id: i64,
        status: EventStatus,
    ) -> Result<(), PersistenceError>;

    /// Stores a normalized event.
    async fn insert_normalized_event(
        &self,
        event: &NewNormalizedEvent,
    ) -> Result<NormalizedEvent, PersistenceError>;

    /// Counts normalized events with the given name (and contract, if any)
    /// whose timestamp falls within `[from, to]`. Used by aggregation rules.
    async fn count_similar_events<'a>(
        &self,
        event_name: &str,
        contract_address: Option<&'a str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, PersistenceError>;

    // --- Rules ---

    /// All enabled rules owned by the user.
    async fn get_enabled_rules(&self, user_id: i64) -> Result<Vec<Rule>, PersistenceError>;

    /// Creates a rule. Names are unique per owner.
    async fn create_rule(&self, user_id: i64, rule: &NewRule) -> Result<Rule, PersistenceError>;

    /// Retrieves one rule owned by the user.
    async fn get_rule(&self, user_id: i64, rule_id: i64)
    -> Result<Option<Rule>, PersistenceError>;

    /// Pages through the user's rules. Returns the page and the total count.
    async fn list_rules(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Rule>, i64), PersistenceError>;

    /// Applies a partial update to a rule.
    async fn update_rule(
        &self,
        user_id: i64,
        rule_id: i64,
        update: &RuleUpdate,
    ) -> Result<Rule, PersistenceError>;

    /// Soft-disables a rule (rules are never hard-deleted in normal
    /// operation).
    async fn disable_rule(&self, user_id: i64, rule_id: i64) -> Result<(), PersistenceError>;

    // --- Incidents ---

    /// Creates an incident.
    async fn insert_incident(&self, incident: &NewIncident)
    -> Result<Incident, PersistenceError>;

    /// Links a normalized event to the incident it contributed to.
    async fn link_incident_event(
        &self,
        incident_id: i64,
        normalized_event_id: i64,
    ) -> Result<(), PersistenceError>;

    /// Whether an incident with this deduplication key was created at or
    /// after the cutoff.
    async fn dedup_key_seen_since(
        &self,
        key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, PersistenceError>;

    /// Retrieves one incident owned by the user.
    async fn get_incident(
        &self,
        user_id: i64,
        incident_id: i64,
    ) -> Result<Option<Incident>, PersistenceError>;

    /// Pages through the user's incidents, newest first.
    async fn list_incidents(
        &self,
        user_id: i64,
        filter: &IncidentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Incident>, i64), PersistenceError>;

    /// Applies a status/notes/assignment update to an incident.
    async fn update_incident(
        &self,
        user_id: i64,
        incident_id: i64,
        update: &IncidentUpdate,
    ) -> Result<Incident, PersistenceError>;

    // --- Detections ---

    /// Stores a detection. At most one detection may exist per normalized
    /// event; a second insert fails with `AlreadyExists`.
    async fn insert_detection(
        &self,
        detection: &NewDetection,
    ) -> Result<Detection, PersistenceError>;

    // --- Routing rules ---

    /// Creates a notification routing rule.
    async fn create_routing_rule(
        &self,
        user_id: i64,
        rule: &NewRoutingRule,
    ) -> Result<RoutingRule, PersistenceError>;

    /// Enabled routing rules matching the severity, highest priority first.
    async fn get_matching_routing_rules(
        &self,
        user_id: i64,
        severity: Severity,
    ) -> Result<Vec<RoutingRule>, PersistenceError>;

    /// Retrieves one routing rule owned by the user.
    async fn get_routing_rule(
        &self,
        user_id: i64,
        routing_rule_id: i64,
    ) -> Result<Option<RoutingRule>, PersistenceError>;

    /// Pages through the user's routing rules.
    async fn list_routing_rules(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<RoutingRule>, i64), PersistenceError>;

    /// Replaces a routing rule's configuration.
    async fn update_routing_rule(
        &self,
        user_id: i64,
        routing_rule_id: i64,
        rule: &NewRoutingRule,
    ) -> Result<RoutingRule, PersistenceError>;

    /// Deletes a routing rule.
    async fn delete_routing_rule(
        &self,
        user_id: i64,
        routing_rule_id: i64,
    ) -> Result<(), PersistenceError>;

    // --- Notification audit trail ---

    /// Appends a delivery-attempt row.
    async fn insert_notification_log(
        &self,
        log: &NewNotificationLog,
    ) -> Result<NotificationLog, PersistenceError>;

    /// Pages through the user's delivery log, newest first.
    async fn list_notification_logs(
        &self,
        user_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<NotificationLog>, i64), PersistenceError>;
}

/// Generic JSON state storage, used for batch queues.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieves a JSON-serializable state object by its key.
    async fn get_json_state<T: DeserializeOwned + Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> Result<Option<T>, PersistenceError>;

    /// Sets or updates a JSON-serializable state object by its key.
    async fn set_json_state<T: Serialize + Send + Sync + 'static>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), PersistenceError>;

    /// Retrieves all states whose key starts with the prefix.
    async fn get_all_json_states_by_prefix<T: DeserializeOwned + Send + Sync + 'static>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, T)>, PersistenceError>;

    /// Removes a state entry. Missing keys are not an error.
    async fn delete_json_state(&self, key: &str) -> Result<(), PersistenceError>;
}
