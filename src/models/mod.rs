pub mod correction;
pub mod field;
pub mod schema;
pub mod version;

pub use correction::{ConflictSet, Correction, ReasonCode};
pub use field::{
    AttemptOutcome, AttemptRecord, FieldAlternative, FieldType, PredictedField,
    PredictionOutcome, PredictionRequest,
};
pub use schema::{DateOrderPair, DocumentContext, FieldSchema};
pub use version::{FieldVersion, VersionSource};
