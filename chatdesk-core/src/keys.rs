//! Cache key naming table.
//!
//! Every cache key is produced by filling exactly one identifier into one of
//! the templates below. `CacheKey` has no public constructor other than
//! [`KeyTemplate::key`], so a key that is not in the table cannot be built.

use std::fmt;

/// Version of the key naming table. Bump when a pattern changes shape.
pub const KEY_SCHEMA_VERSION: u32 = 1;

/// Placeholder filled by [`KeyTemplate::key`].
const PLACEHOLDER: &str = "{}";

/// Entity-type templates for cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyTemplate {
    AccountData,
    AccountKeyIdMapping,
    OutboundRemainingBalance,
    BotData,
    BotFlow,
    BotTriggerRules,
    BotPublishKeyIdMapping,
    AgentData,
    AgentRole,
    UserPreference,
    ChannelConfiguration,
    Conversation,
    AddonsKey,
    AddonFunctions,
    AccountVariables,
    AccountLabels,
    TeamData,
    OutboundTemplate,
    Visitor,
    VisitorExternalKey,
    VisitorDefaultName,
}

impl KeyTemplate {
    /// All templates, in table order.
    pub const ALL: [KeyTemplate; 21] = [
        KeyTemplate::AccountData,
        KeyTemplate::AccountKeyIdMapping,
        KeyTemplate::OutboundRemainingBalance,
        KeyTemplate::BotData,
        KeyTemplate::BotFlow,
        KeyTemplate::BotTriggerRules,
        KeyTemplate::BotPublishKeyIdMapping,
        KeyTemplate::AgentData,
        KeyTemplate::AgentRole,
        KeyTemplate::UserPreference,
        KeyTemplate::ChannelConfiguration,
        KeyTemplate::Conversation,
        KeyTemplate::AddonsKey,
        KeyTemplate::AddonFunctions,
        KeyTemplate::AccountVariables,
        KeyTemplate::AccountLabels,
        KeyTemplate::TeamData,
        KeyTemplate::OutboundTemplate,
        KeyTemplate::Visitor,
        KeyTemplate::VisitorExternalKey,
        KeyTemplate::VisitorDefaultName,
    ];

    pub const fn pattern(&self) -> &'static str {
        match self {
            KeyTemplate::AccountData => "account:{}",
            KeyTemplate::AccountKeyIdMapping => "account_key:{}",
            KeyTemplate::OutboundRemainingBalance => "outbound_remaining_balance:{}",
            KeyTemplate::BotData => "bot:{}",
            KeyTemplate::BotFlow => "bot_flow:{}",
            KeyTemplate::BotTriggerRules => "bot_trigger_rules:{}",
            KeyTemplate::BotPublishKeyIdMapping => "bot_publish_key:{}",
            KeyTemplate::AgentData => "agent:{}",
            KeyTemplate::AgentRole => "agent_role:{}",
            KeyTemplate::UserPreference => "user_preference:{}",
            KeyTemplate::ChannelConfiguration => "channel_configuration:{}",
            KeyTemplate::Conversation => "conversation:{}",
            KeyTemplate::AddonsKey => "addons:{}",
            KeyTemplate::AddonFunctions => "addon_functions:{}",
            KeyTemplate::AccountVariables => "account_variables:{}",
            KeyTemplate::AccountLabels => "account_labels:{}",
            KeyTemplate::TeamData => "team:{}",
            KeyTemplate::OutboundTemplate => "outbound_template:{}",
            KeyTemplate::Visitor => "visitor:{}",
            KeyTemplate::VisitorExternalKey => "visitor_external_key:{}",
            KeyTemplate::VisitorDefaultName => "visitor_default_name:{}",
        }
    }

    /// Build the key for one identifier.
    pub fn key(&self, id: impl fmt::Display) -> CacheKey {
        CacheKey {
            inner: self.pattern().replacen(PLACEHOLDER, &id.to_string(), 1),
            template: *self,
        }
    }
}

/// A cache key derived from the naming table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    inner: String,
    template: KeyTemplate,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Template this key was built from.
    pub fn template(&self) -> KeyTemplate {
        self.template
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_account_key() {
        assert_eq!(KeyTemplate::AccountData.key(42).as_str(), "account:42");
        assert_eq!(KeyTemplate::BotFlow.key(7).to_string(), "bot_flow:7");
    }

    #[test]
    fn test_every_template_has_one_placeholder() {
        for template in KeyTemplate::ALL {
            assert_eq!(
                template.pattern().matches(PLACEHOLDER).count(),
                1,
                "{:?}",
                template
            );
        }
    }

    #[test]
    fn test_patterns_are_distinct() {
        let patterns: HashSet<_> = KeyTemplate::ALL.iter().map(|t| t.pattern()).collect();
        assert_eq!(patterns.len(), KeyTemplate::ALL.len());
    }

    #[test]
    fn test_key_remembers_template() {
        let key = KeyTemplate::Visitor.key("abc");
        assert_eq!(key.template(), KeyTemplate::Visitor);
    }

    #[test]
    fn test_placeholder_in_identifier_is_not_expanded() {
        let key = KeyTemplate::AddonsKey.key("x{}y");
        assert_eq!(key.as_str(), "addons:x{}y");
    }

    proptest! {
        #[test]
        fn prop_key_is_deterministic(id in any::<i64>()) {
            let a = KeyTemplate::AccountData.key(id);
            let b = KeyTemplate::AccountData.key(id);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_distinct_ids_give_distinct_keys(a in any::<i64>(), b in any::<i64>()) {
            prop_assume!(a != b);
            prop_assert_ne!(KeyTemplate::AgentData.key(a), KeyTemplate::AgentData.key(b));
        }
    }
}
