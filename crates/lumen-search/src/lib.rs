pub mod engine;
pub mod error;
pub mod eval;
pub mod parameters;
pub mod parser;
pub mod registry;
pub mod units;

pub use engine::{MatchOutcome, ReferenceResolver, SearchConfig, SearchPredicateEngine};
pub use error::{Result, SearchError};
pub use parameters::{SearchModifier, SearchParamDefinition, SearchParamType, SearchPrefix};
pub use parser::{ClauseKind, IncludeDirective, ParsedSearchParameter, SearchValue};
pub use registry::SearchParameterRegistry;
pub use units::UnitConversionTable;
