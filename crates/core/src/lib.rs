pub mod actions;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod profile;
pub mod registry;
pub mod schema;
pub mod session;

pub use actions::{OrderingViolation, ProtocolAction, TransactionProgress};
pub use envelope::{new_message_id, new_transaction_id, CityLocation, Envelope, LocationCode};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use profile::{Profile, ProfileUpdate};
pub use registry::{DomainPolicy, NetworkRegistry, RegistryError};
pub use schema::{RequestSchema, SchemaRegistry};
pub use session::{SessionState, Turn, TurnRole};
