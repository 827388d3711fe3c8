// src/config/mod.rs
pub mod pipeline;

pub use pipeline::{
    FeedConfig, LimitsConfig, PipelineConfig, ScheduleConfig, ScoringConfig, StoreConfig,
    DEFAULT_PIPELINE_CONFIG_PATH, ENV_PIPELINE_CONFIG_PATH,
};
