//! Token lifecycle: persistence, identity caching and the authenticated gateway.

pub mod cache;
pub mod client;
pub mod clock;
pub mod gateway;
pub mod jwt;
pub mod storage;
pub mod token;
pub mod types;

pub use cache::SessionCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use gateway::HttpGateway;
pub use storage::{AuthStorage, FileStorage, MemoryStorage};
pub use token::TokenStore;
pub use types::{Identity, Role, SaveTokens, Status, StoredAuth, TokenResponse};
