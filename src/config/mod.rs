mod settings;

pub use settings::{
    DatabaseConfig, DeliveryConfig, LoggingConfig, OtelConfig, QueueConfig, ServerConfig,
    ServiceConfig, Settings,
};
