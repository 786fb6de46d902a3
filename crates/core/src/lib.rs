pub mod config;
pub mod domain;
pub mod errors;
pub mod matching;

pub use config::{
    AppConfig, AssistantConfig, ChannelConfig, ConfigError, ConfigOverrides, LoadOptions,
    LogFormat, LoggingConfig, ServerConfig, SessionConfig, StoreBackend, StoreConfig,
};
pub use domain::customer::{CustomerProfile, CustomerTier};
pub use domain::product::{Product, ProductView};
pub use domain::reply::ReplySegment;
pub use domain::reservation::{Reservation, ReservationStatus};
pub use errors::DomainError;
