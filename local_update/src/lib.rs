//! The client-update side of the federation: the contracts a client must
//! implement (classifier update, generator-pair update, evaluation, artifact
//! export), the opaque data-partition handle, and deterministic in-process
//! implementations used by the demo binary and the integration tests.

pub mod contract;
pub mod error;
pub mod partition;
pub mod sim;

pub use contract::{
    ArtifactExporter, ClassifierReply, ClassifierRequest, ClassifierUpdate, Evaluation,
    EvaluationGateway, GeneratorReply, GeneratorRequest, GeneratorUpdate, TrainingMode, NO_LOSS,
};
pub use error::UpdateErr;
pub use partition::Partition;
