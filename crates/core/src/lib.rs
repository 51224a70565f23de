pub mod accountant;
pub mod acquisition;
pub mod alert;
pub mod announcer;
pub mod config;
pub mod item;
pub mod orchestrator;
pub mod publisher;
pub mod resolver;
pub mod retention;
pub mod testing;

pub use accountant::{AlertDecision, FailureAccountant};
pub use acquisition::{AcquisitionError, RecordingSource, ZoomClient, ZoomConfig};
pub use alert::{Alert, AlertError, AlertKind, Alerter};
pub use announcer::{AnnounceError, Announcer, DiscordConfig, DiscordWebhook};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    LoggingConfig, PipelineConfig,
};
pub use item::{
    Asset, FailureStreak, ItemRecord, SourceItem, SqliteTrackingStore, Stage, StoreError,
    TrackingStore,
};
pub use orchestrator::{PlannedAction, RunConfig, RunError, RunOrchestrator, RunReport};
pub use publisher::{PublishError, PublishRequest, Publisher, YouTubeClient, YouTubeConfig};
pub use resolver::{resolve, Action, ResolvePolicy};
pub use retention::{RetentionSweeper, SweepReport};
