pub mod outcome;
pub mod response;
pub mod router;

pub use outcome::{OperationOutcome, OperationOutcomeIssue};
pub use response::FhirResponse;
pub use router::{Interaction, Verb, classify};

pub use http::StatusCode;
