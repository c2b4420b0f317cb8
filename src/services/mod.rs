//! Collaborators at the edges of the pipeline.
//!
//! - Job boards (`JobSource`): Gupy, Greenhouse, Lever, local files
//! - Field extraction (`Enricher`): OpenAI-compatible chat completions
//! - Notification channels (`Deliverer`): Telegram, log

mod delivery;
mod enrichment;
mod sources;

pub use delivery::{
    Deliverer, DeliveryConfirmation, LogDeliverer, MessageKind, RenderedMessage,
    TelegramDeliverer, build_deliverer,
};
pub use enrichment::{ChatEnricher, Enricher, parse_partial};
pub use sources::{
    ConfiguredSource, FileSource, GreenhouseSource, GupySource, JobSource, LeverSource,
    build_sources,
};
