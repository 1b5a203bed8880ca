pub mod codec;
pub mod error;
pub mod id;
pub mod path;
pub mod resource;
pub mod time;
pub mod types;

pub use codec::{Codec, JsonCodec, SummaryMode};
pub use error::{CoreError, ErrorCategory, Result};
pub use id::{generate_id, validate_id};
pub use path::{CompiledPath, EvalContext};
pub use resource::{Resource, ResourceMeta};
pub use time::{FhirInstant, now_utc};
pub use types::{ResourceType, is_valid_resource_type_name};
