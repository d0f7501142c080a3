//! Confab Server — long-poll config distribution over HTTP.

pub mod delayed;
pub mod guard;
pub mod network;
pub mod service;
pub mod store;
pub mod traits;

pub use delayed::{DelayedResponses, DelayedStats};
pub use guard::{ResolutionContext, ResolutionGuard};
pub use network::{NetworkConfig, ServerModule, ShutdownController};
pub use service::{
    ActivationRunnable, ActivationSender, BackgroundWorker, ConfigRequestService, ServiceConfig,
};
pub use store::MemoryConfigStore;
pub use traits::{ActivationListener, ConfigResolver, HostRegistry, ResolvedConfig};
