//! Interaction routing: a total, stateless classification of
//! (verb, path segments after the base prefix, query-presence) into the
//! interaction a request invokes, or `None`.
//!
//! HEAD is accepted only where the interaction is cacheable; an unknown
//! resource type anywhere one is expected routes to `None`.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Verb::Get | Verb::Head)
    }
}

impl FromStr for Verb {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Verb::Get),
            "HEAD" => Ok(Verb::Head),
            "POST" => Ok(Verb::Post),
            "PUT" => Ok(Verb::Put),
            "PATCH" => Ok(Verb::Patch),
            "DELETE" => Ok(Verb::Delete),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verb::Get => "GET",
            Verb::Head => "HEAD",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// The interaction a request path+verb invokes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Interaction {
    SystemSearch,
    SystemBundle,
    SystemDeleteConditional,
    SystemCapabilities,
    SystemHistory,
    SystemOperation(String),
    TypeSearch(String),
    TypeCreate(String),
    TypeCreateConditional(String),
    TypeDeleteConditional(String),
    TypeOperation(String, String),
    InstanceRead(String, String),
    InstanceUpdate(String, String),
    InstancePatch(String, String),
    InstanceDelete(String, String),
    InstanceReadHistory(String, String),
    InstanceDeleteHistory(String, String),
    InstanceReadVersion(String, String, String),
    InstanceDeleteVersion(String, String, String),
    InstanceOperation(String, String, String),
    CompartmentSearch(String, String),
    CompartmentTypeSearch(String, String, String),
}

impl Interaction {
    /// Cacheable interactions are the only ones HEAD may invoke.
    pub fn is_cacheable(&self) -> bool {
        matches!(
            self,
            Interaction::SystemCapabilities
                | Interaction::InstanceRead(..)
                | Interaction::InstanceReadVersion(..)
        )
    }
}

/// Classify a request. `segments` are the path segments after the
/// base/tenant prefix; `is_known_type` answers whether a segment names a
/// stored resource type.
pub fn classify(
    verb: Verb,
    segments: &[&str],
    query_present: bool,
    is_known_type: &dyn Fn(&str) -> bool,
) -> Option<Interaction> {
    // HEAD routes like GET but only onto cacheable interactions.
    let effective = if verb == Verb::Head { Verb::Get } else { verb };

    let interaction = match segments {
        [] => match effective {
            Verb::Get => Some(Interaction::SystemSearch),
            Verb::Post => Some(Interaction::SystemBundle),
            Verb::Delete => Some(Interaction::SystemDeleteConditional),
            _ => None,
        },
        [segment] => classify_one(effective, segment, query_present, is_known_type),
        [type_name, segment] => classify_two(effective, type_name, segment, is_known_type),
        [type_name, id, segment] => {
            classify_three(effective, type_name, id, segment, is_known_type)
        }
        [type_name, id, third, fourth] => {
            classify_four(effective, type_name, id, third, fourth, is_known_type)
        }
        _ => None,
    }?;

    if verb == Verb::Head && !interaction.is_cacheable() {
        return None;
    }
    Some(interaction)
}

fn classify_one(
    verb: Verb,
    segment: &str,
    query_present: bool,
    is_known_type: &dyn Fn(&str) -> bool,
) -> Option<Interaction> {
    if segment == "metadata" {
        return matches!(verb, Verb::Get).then_some(Interaction::SystemCapabilities);
    }
    if segment == "_history" {
        return matches!(verb, Verb::Get).then_some(Interaction::SystemHistory);
    }
    if let Some(operation) = segment.strip_prefix('$') {
        return matches!(verb, Verb::Get | Verb::Post)
            .then(|| Interaction::SystemOperation(operation.to_string()));
    }
    if !is_known_type(segment) {
        return None;
    }
    let type_name = segment.to_string();
    match verb {
        Verb::Get => Some(Interaction::TypeSearch(type_name)),
        Verb::Post if query_present => Some(Interaction::TypeCreateConditional(type_name)),
        Verb::Post => Some(Interaction::TypeCreate(type_name)),
        Verb::Delete => Some(Interaction::TypeDeleteConditional(type_name)),
        _ => None,
    }
}

fn classify_two(
    verb: Verb,
    type_name: &str,
    segment: &str,
    is_known_type: &dyn Fn(&str) -> bool,
) -> Option<Interaction> {
    if !is_known_type(type_name) {
        return None;
    }
    let type_name = type_name.to_string();

    if segment == "_search" {
        return matches!(verb, Verb::Get | Verb::Post)
            .then_some(Interaction::TypeSearch(type_name));
    }
    if let Some(operation) = segment.strip_prefix('$') {
        return matches!(verb, Verb::Get | Verb::Post)
            .then(|| Interaction::TypeOperation(type_name, operation.to_string()));
    }

    let id = segment.to_string();
    match verb {
        Verb::Get => Some(Interaction::InstanceRead(type_name, id)),
        Verb::Put => Some(Interaction::InstanceUpdate(type_name, id)),
        Verb::Patch => Some(Interaction::InstancePatch(type_name, id)),
        Verb::Delete => Some(Interaction::InstanceDelete(type_name, id)),
        _ => None,
    }
}

fn classify_three(
    verb: Verb,
    type_name: &str,
    id: &str,
    segment: &str,
    is_known_type: &dyn Fn(&str) -> bool,
) -> Option<Interaction> {
    if !is_known_type(type_name) {
        return None;
    }
    let type_name = type_name.to_string();
    let id = id.to_string();

    if segment == "_history" {
        return match verb {
            Verb::Get => Some(Interaction::InstanceReadHistory(type_name, id)),
            Verb::Delete => Some(Interaction::InstanceDeleteHistory(type_name, id)),
            _ => None,
        };
    }
    if let Some(operation) = segment.strip_prefix('$') {
        return matches!(verb, Verb::Get | Verb::Post)
            .then(|| Interaction::InstanceOperation(type_name, id, operation.to_string()));
    }
    if segment == "*" {
        return matches!(verb, Verb::Get).then_some(Interaction::CompartmentSearch(type_name, id));
    }
    if is_known_type(segment) {
        return matches!(verb, Verb::Get)
            .then(|| Interaction::CompartmentTypeSearch(type_name, id, segment.to_string()));
    }
    None
}

fn classify_four(
    verb: Verb,
    type_name: &str,
    id: &str,
    third: &str,
    fourth: &str,
    is_known_type: &dyn Fn(&str) -> bool,
) -> Option<Interaction> {
    if !is_known_type(type_name) {
        return None;
    }
    let type_name = type_name.to_string();
    let id = id.to_string();

    if third == "_history" {
        return match verb {
            Verb::Get => Some(Interaction::InstanceReadVersion(
                type_name,
                id,
                fourth.to_string(),
            )),
            Verb::Delete => Some(Interaction::InstanceDeleteVersion(
                type_name,
                id,
                fourth.to_string(),
            )),
            _ => None,
        };
    }
    if is_known_type(third) && fourth == "_search" {
        return matches!(verb, Verb::Post)
            .then(|| Interaction::CompartmentTypeSearch(type_name, id, third.to_string()));
    }
    None
}
