//! Typed projections returned by relational store queries.
//!
//! Rows are read-only and live only as long as the session that produced them.
//! Optional columns stay `Option` so unexpected nulls pass through as `null`.

use crate::EntityId;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// ACCOUNT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRow {
    pub id: EntityId,
    pub name: String,
    pub account_key: String,
    pub owner_id: Option<EntityId>,
    pub timezone: Option<String>,
    pub operating_hours: Option<Value>,
    pub registered_domains: Option<Vec<String>>,
    /// JSON text as stored in the column
    pub site_url: Option<String>,
    pub is_domain_restricted: bool,
    pub subscription_id: Option<EntityId>,
    pub activation_source: Option<String>,
    pub plan_id: Option<EntityId>,
    pub plan_name: Option<String>,
}

/// Minimal bot listing used when composing account payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotSummaryRow {
    pub id: EntityId,
    pub account_id: EntityId,
    pub name: String,
    pub bot_type_id: Option<EntityId>,
    pub channel_id: Option<EntityId>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub account_id: EntityId,
    pub feature_id: EntityId,
    pub key: String,
    pub config: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupMessageRow {
    pub id: EntityId,
    pub account_id: EntityId,
    pub url_regex: String,
    pub message: String,
}

/// Current outbound-message billing period of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundBalanceRow {
    pub account_id: EntityId,
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    /// Plan configuration carrying `max_outbound_messages`
    pub config: Option<Value>,
}

// ============================================================================
// BOT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotRow {
    pub id: EntityId,
    pub account_id: EntityId,
    pub name: String,
    pub channel_id: Option<EntityId>,
    pub bot_type_id: Option<EntityId>,
    pub bot_lead_id: Option<EntityId>,
    pub preview_key: Option<String>,
    pub publish_key: Option<String>,
    pub published_version_id: Option<EntityId>,
    pub draft_version_id: Option<EntityId>,
    pub settings: Option<Value>,
    pub is_deleted: bool,
    pub created_by_first_name: Option<String>,
    pub created_by_last_name: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRulesRow {
    pub bot_id: EntityId,
    pub trigger_rules: Option<Value>,
}

// ============================================================================
// AGENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRow {
    pub id: EntityId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_name: Option<String>,
    pub user_type_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRoleRow {
    pub account_id: EntityId,
    pub role: String,
}

// ============================================================================
// CONFIGURATION ENTITIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfigurationRow {
    pub id: EntityId,
    pub account_id: EntityId,
    pub channel_id: EntityId,
    pub name: Option<String>,
    pub configuration: Option<Value>,
    pub is_active: bool,
}

/// One account variable definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRow {
    pub name: String,
    /// Pattern form, e.g. `¿·$user.info.phone·?`
    pub parameter: String,
    /// Search-index form, e.g. `visitor_phone`
    pub normalized_parameter: String,
    pub format: Option<String>,
    pub status: Option<i32>,
    pub error_message: Option<String>,
    pub validation: Option<Value>,
    pub is_contact_page_qualified_variable: bool,
    #[serde(rename = "type")]
    pub variable_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRow {
    pub template_id: EntityId,
    pub template_name: String,
    pub channel_id: Option<EntityId>,
    pub channel_configuration_id: Option<EntityId>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub channel_provider_id: Option<EntityId>,
    pub template_configuration: Option<Value>,
    pub components: Option<Value>,
    pub media_id: Option<String>,
}

/// A function exposed by a connected addon version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonFunctionRow {
    pub addon_version_id: EntityId,
    pub authentication_type: Option<String>,
    pub function_name: String,
    pub script: String,
    pub script_language: Option<String>,
    pub parameter: Option<Value>,
    /// Auth parameters of the connection, shaped `{"keys": {name: {"value": ..}}}`
    pub auth_parameters: Option<Value>,
}

/// A conversation label defined on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRow {
    pub id: EntityId,
    pub label: String,
    pub created_by: Option<EntityId>,
    pub created_at: Option<NaiveDateTime>,
}

// ============================================================================
// VISITOR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorRow {
    pub id: EntityId,
    pub visitor_key: String,
    pub external_key: Option<String>,
    pub account_id: EntityId,
    pub channel_id: Option<EntityId>,
}
