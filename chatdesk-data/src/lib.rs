//! Chatdesk Data - Entity Managers
//!
//! Typed cache-aside access to accounts, bots, agents, conversations,
//! addons, channel configurations, variables, templates and visitors.
//! Every read goes to the cache first and falls back to a sync from the
//! relational store and search index on a miss.
//!
//! ```no_run
//! # async fn run() -> chatdesk_core::ChatdeskResult<()> {
//! use chatdesk_core::ChatdeskConfig;
//! use chatdesk_data::DataAccess;
//!
//! let config = ChatdeskConfig::from_env()?;
//! let data = DataAccess::connect(&config).await?;
//! let _account = data.account().get_account_details(42).await?;
//! # Ok(())
//! # }
//! ```

pub mod managers;
pub mod telemetry;

use chatdesk_core::{ChatdeskConfig, ChatdeskResult, SyncConfig, VisitorConfig};
use chatdesk_storage::{ConnectionHandles, SyncOrchestrator};
use once_cell::sync::OnceCell;

pub use managers::*;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};

/// Entry point holding the connection handles and one lazily built
/// manager per entity family.
#[derive(Debug)]
pub struct DataAccess {
    orchestrator: SyncOrchestrator,
    visitor_config: VisitorConfig,
    account: OnceCell<AccountManager>,
    bot: OnceCell<BotManager>,
    agent: OnceCell<AgentManager>,
    conversation: OnceCell<ConversationManager>,
    addon: OnceCell<AddonManager>,
    channel_configuration: OnceCell<ChannelConfigurationManager>,
    label: OnceCell<LabelManager>,
    team: OnceCell<TeamManager>,
    variable: OnceCell<VariableManager>,
    template: OnceCell<TemplateManager>,
    visitor: OnceCell<VisitorManager>,
}

impl DataAccess {
    pub fn new(handles: ConnectionHandles, sync: SyncConfig, visitor_config: VisitorConfig) -> Self {
        Self {
            orchestrator: SyncOrchestrator::new(handles, sync),
            visitor_config,
            account: OnceCell::new(),
            bot: OnceCell::new(),
            agent: OnceCell::new(),
            conversation: OnceCell::new(),
            addon: OnceCell::new(),
            channel_configuration: OnceCell::new(),
            label: OnceCell::new(),
            team: OnceCell::new(),
            variable: OnceCell::new(),
            template: OnceCell::new(),
            visitor: OnceCell::new(),
        }
    }

    /// Validate `config` and open every backend it names.
    pub async fn connect(config: &ChatdeskConfig) -> ChatdeskResult<Self> {
        config.validate()?;
        let handles = ConnectionHandles::connect(config).await?;
        tracing::info!(single_flight = config.sync.single_flight, "Data access ready");
        Ok(Self::new(handles, config.sync, config.visitor.clone()))
    }

    pub fn handles(&self) -> &ConnectionHandles {
        self.orchestrator.handles()
    }

    pub fn account(&self) -> &AccountManager {
        self.account
            .get_or_init(|| AccountManager::new(self.orchestrator.clone()))
    }

    pub fn bot(&self) -> &BotManager {
        self.bot.get_or_init(|| BotManager::new(self.orchestrator.clone()))
    }

    pub fn agent(&self) -> &AgentManager {
        self.agent
            .get_or_init(|| AgentManager::new(self.orchestrator.clone()))
    }

    pub fn conversation(&self) -> &ConversationManager {
        self.conversation
            .get_or_init(|| ConversationManager::new(self.orchestrator.clone()))
    }

    pub fn addon(&self) -> &AddonManager {
        self.addon
            .get_or_init(|| AddonManager::new(self.orchestrator.clone()))
    }

    pub fn channel_configuration(&self) -> &ChannelConfigurationManager {
        self.channel_configuration
            .get_or_init(|| ChannelConfigurationManager::new(self.orchestrator.clone()))
    }

    pub fn label(&self) -> &LabelManager {
        self.label
            .get_or_init(|| LabelManager::new(self.orchestrator.clone()))
    }

    pub fn team(&self) -> &TeamManager {
        self.team.get_or_init(|| TeamManager::new(self.orchestrator.clone()))
    }

    pub fn variable(&self) -> &VariableManager {
        self.variable
            .get_or_init(|| VariableManager::new(self.orchestrator.clone()))
    }

    pub fn template(&self) -> &TemplateManager {
        self.template
            .get_or_init(|| TemplateManager::new(self.orchestrator.clone()))
    }

    pub fn visitor(&self) -> &VisitorManager {
        self.visitor.get_or_init(|| {
            VisitorManager::new(self.orchestrator.clone(), self.visitor_config.clone())
        })
    }
}
