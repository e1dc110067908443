//! Name Resolution
//!
//! Turns component names and route locations into emitted identifiers:
//! - component names are kept when already valid identifiers, PascalCased
//!   otherwise (`User Profile` → `UserProfile`)
//! - route schemas are named `{Method}{PascalSegments}{Role}`
//!   (`GET /users/{id}` params → `GetUsersIdParams`)
//! - collisions are disambiguated with a numeric suffix (`User_2`)
//!
//! Every identifier handed out is the type name; the validator constant is
//! the same name with a `Schema` suffix.

use std::collections::{HashMap, HashSet};

/// Suffix appended to a type name to name its validator constant
pub const SCHEMA_SUFFIX: &str = "Schema";

/// Words that cannot be used as identifiers in emitted code
const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "enum", "export", "extends", "false", "finally", "for", "function", "if",
    "import", "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw",
    "true", "try", "typeof", "var", "void", "while", "with", "yield", "let", "static",
    "implements", "interface", "package", "private", "protected", "public", "await",
];

/// Type names the emitted code relies on, plus the two route tables
const RESERVED_TYPE_NAMES: &[&str] = &[
    "Array", "Record", "Date", "Object", "String", "Number", "Boolean", "Promise", "Request",
    "Response", "z",
];

// =============================================================================
// Casing helpers
// =============================================================================

/// Check that a name can be used verbatim as an identifier
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !RESERVED_WORDS.contains(&name)
}

/// Split on every non-alphanumeric character and upper-case the first letter
/// of each word, keeping the rest of its casing (`user_id` → `UserId`,
/// `fooBar` → `FooBar`).
pub fn to_pascal_case(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(upper_first)
        .collect()
}

fn upper_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// `user-groupId` → `UserGroupid`
fn route_segment(segment: &str) -> String {
    segment
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| upper_first(&word.to_ascii_lowercase()))
        .collect()
}

/// `GET` → `Get`
pub fn method_prefix(method: &str) -> String {
    let lower = method.to_ascii_lowercase();
    upper_first(&lower)
}

/// Canonical route schema name: method, path segments (braces stripped),
/// then the role (`Params`, `Query`, `Headers`, `Body`, `200Response`,
/// `404ErrorResponse`).
///
/// Each word of a segment is capitalized and the rest lower-cased, so
/// `/userGroups/{groupId}` reads `UsergroupsGroupid`. Dispatch code derives
/// the same names from the path, so the casing rule is part of the contract.
pub fn route_schema_name(path: &str, method: &str, role: &str) -> String {
    let segments: String = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| route_segment(segment.trim_start_matches('{').trim_end_matches('}')))
        .collect();
    format!("{}{}{}", method_prefix(method), segments, role)
}

/// Role suffix for a response status (`2xx` → `Response`, else `ErrorResponse`)
pub fn response_role(status: &str) -> String {
    if status.starts_with('2') {
        format!("{}Response", status)
    } else {
        format!("{}ErrorResponse", to_pascal_case(status))
    }
}

/// Name of the validator constant for a type name
pub fn schema_const(type_name: &str) -> String {
    format!("{}{}", type_name, SCHEMA_SUFFIX)
}

// =============================================================================
// Name Resolver
// =============================================================================

/// Hands out unique identifiers, one per requested source name.
///
/// Claims are first come, first served; the emission order decides who
/// gets the undecorated name.
#[derive(Debug, Clone, Default)]
pub struct NameResolver {
    /// source name -> identifier, for names claimed through `resolve`
    resolved: HashMap<String, String>,
    /// identifiers in use
    taken: HashSet<String>,
}

impl NameResolver {
    pub fn new() -> Self {
        let mut resolver = Self::default();
        for name in RESERVED_TYPE_NAMES {
            resolver.taken.insert((*name).to_string());
        }
        resolver
    }

    /// Mark identifiers owned by the caller (pre-registered validators and
    /// their type aliases) so generated names never shadow them.
    pub fn reserve(&mut self, identifier: &str) {
        self.taken.insert(identifier.to_string());
        if let Some(base) = identifier.strip_suffix(SCHEMA_SUFFIX) {
            self.taken.insert(base.to_string());
        }
    }

    /// Identifier for a component name; stable for repeated calls
    pub fn resolve(&mut self, source_name: &str) -> String {
        if let Some(existing) = self.resolved.get(source_name) {
            return existing.clone();
        }
        let identifier = self.claim(source_name);
        self.resolved.insert(source_name.to_string(), identifier.clone());
        identifier
    }

    /// Claim a fresh identifier derived from `base`
    pub fn claim(&mut self, base: &str) -> String {
        let sanitized = sanitize(base);
        let mut candidate = sanitized.clone();
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{}_{}", sanitized, n);
            n += 1;
        }
        if candidate != sanitized {
            tracing::debug!(name = base, identifier = %candidate, "name collision disambiguated");
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

fn sanitize(name: &str) -> String {
    if is_valid_identifier(name) {
        return name.to_string();
    }
    let pascal = to_pascal_case(name);
    match pascal.chars().next() {
        None => "Schema_".to_string(),
        Some(first) if first.is_ascii_digit() => format!("_{}", pascal),
        Some(_) if RESERVED_WORDS.contains(&pascal.as_str()) => format!("{}_", pascal),
        Some(_) => pascal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_schema_names() {
        assert_eq!(route_schema_name("/users/{id}", "GET", "Params"), "GetUsersIdParams");
        assert_eq!(route_schema_name("/users", "POST", "201Response"), "PostUsers201Response");
        assert_eq!(
            route_schema_name("/foo-bar/{user_id}", "GET", "Query"),
            "GetFooBarUserIdQuery"
        );
        assert_eq!(route_schema_name("/", "GET", "Headers"), "GetHeaders");
    }

    #[test]
    fn test_route_segments_lower_inner_casing() {
        assert_eq!(
            route_schema_name("/userGroups/{groupId}", "DELETE", "Params"),
            "DeleteUsergroupsGroupidParams"
        );
        assert_eq!(route_schema_name("/API/v2", "GET", "200Response"), "GetApiV2200Response");
        // Component identifiers keep their casing.
        assert_eq!(to_pascal_case("userGroups"), "UserGroups");
    }

    #[test]
    fn test_response_role() {
        assert_eq!(response_role("200"), "200Response");
        assert_eq!(response_role("404"), "404ErrorResponse");
        assert_eq!(response_role("default"), "DefaultErrorResponse");
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("User"));
        assert!(is_valid_identifier("_private$"));
        assert!(!is_valid_identifier("User Profile"));
        assert!(!is_valid_identifier("2fa"));
        assert!(!is_valid_identifier("class"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_resolver_sanitizes_and_disambiguates() {
        let mut resolver = NameResolver::new();
        assert_eq!(resolver.resolve("User Profile"), "UserProfile");
        assert_eq!(resolver.resolve("User-Profile"), "UserProfile_2");
        assert_eq!(resolver.resolve("User Profile"), "UserProfile");
        assert_eq!(resolver.resolve("2fa-settings"), "_2faSettings");
        assert_eq!(resolver.resolve("Array"), "Array_2");
    }

    #[test]
    fn test_reserved_identifiers_are_avoided() {
        let mut resolver = NameResolver::new();
        resolver.reserve("DateSchema");
        assert_eq!(resolver.claim("DateSchema"), "DateSchema_2");
        assert_eq!(resolver.claim("Date"), "Date_2");
    }
}
