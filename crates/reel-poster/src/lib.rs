//! Social posting.
//!
//! Each target platform of a finished video is claimed, published and
//! recorded independently, so one platform failing never blocks another
//! and a platform that is already posted is never posted twice.

pub mod config;
pub mod error;
pub mod gateway;
pub mod poster;
pub mod publisher;

pub use config::PosterConfig;
pub use error::{FailureKind, PosterError, PosterResult};
pub use gateway::{GatewayPublisher, PublisherConfig};
pub use poster::{PostAttempt, Poster, SweepReport};
pub use publisher::{CommentResult, PlatformPublisher, PostMetadata, UploadResult};
