//! meshtask-services — batch validation and response correlation.
//!
//! The validator turns operator text into a [`TaskBatch`]; the correlator
//! publishes it over a [`Transport`] and decides when the round trip is done.

pub mod correlator;
pub mod schema;
pub mod session;
pub mod transport;

pub use correlator::{CorrelationOutcome, Correlator, DispatchError, Topics};
pub use schema::{
    validate, AutoMetadataRule, SchemaRules, ValidationError, ValidationErrorKind, Validator,
};
pub use session::{is_self_acknowledging, CorrelationSession, Observation, SessionState};
pub use transport::{
    MemoryBroker, MemoryTransport, MqttTransport, Transport, TransportError, TransportEvent,
};

pub use meshtask_core::TaskBatch;
