//! Collaborator interfaces the envdeck console calls into: configuration
//! values, version lookup, instance mutation, environment management, and
//! authorization. Each is an `async_trait` so hosts can back it with any
//! client. [`memory::InMemoryPlatform`] implements all of them in memory.

mod error;
pub mod memory;
mod record;
mod traits;

pub use error::ServiceError;
pub use memory::{Call, InMemoryPlatform};
pub use record::{
    ConfigValues, CreatedEnvironment, EnvironmentGroup, EnvironmentRecord, Scope, Version,
};
pub use traits::{
    AuthorizationService, ConfigValueService, EnvironmentService, InstanceQuery, InstanceService,
    VersionService,
};
