// client-core/src/lib.rs

pub mod api;
pub mod deferred;
pub mod error;
pub mod guard;
pub mod messaging;
pub mod routes;
pub mod storage;
pub mod store;
pub mod token;

pub use api::{sign_in, sign_out, AuthApi, AuthResponse, CommentApi, LoginRequest};
pub use deferred::{Clock, DeferredActionMediator, ReplayOutcome, SystemClock};
pub use error::{ApiError, MessagingError, StorageError};
pub use guard::SessionGuard;
pub use messaging::{ConnectionState, MessagingClient, ReconnectPolicy};
pub use routes::{AccessDecision, RouteRequirement};
pub use storage::{InvalidationChannel, KeyValueStore, MemoryStore, StorageEvent};
pub use store::SessionStore;
pub use token::{analyze, TokenAnalysis};
