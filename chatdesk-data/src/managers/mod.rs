//! Entity managers.
//!
//! Each manager pairs a cache key template with a getter and exposes typed
//! read-through operations for one entity family.

pub mod account;
pub mod addon;
pub mod agent;
pub mod bot;
pub mod channel_configuration;
pub mod conversation;
pub mod label;
pub mod team;
pub mod template;
pub mod variable;
pub mod visitor;

pub use account::{AccountManager, AccountPayload};
pub use addon::{AddonBundle, AddonFunction, AddonFunctions, AddonManager, AddonMatch};
pub use agent::{AgentManager, AgentPayload, AgentRolesPayload};
pub use bot::{BotManager, BotPayload};
pub use channel_configuration::ChannelConfigurationManager;
pub use conversation::ConversationManager;
pub use label::{LabelManager, LabelPayload};
pub use team::{TeamManager, TeamPayload};
pub use template::{TemplateManager, TemplatePayload};
pub use variable::VariableManager;
pub use visitor::{VisitorManager, VisitorPayload, VisitorVariable};
