//! CRI (Conduit Resource Identifier) parsing and construction.
//!
//! A CRI addresses a logical resource on the event bus using the literal
//! grammar `scheme://[scope@]resourceName[#version][/path]`. Services and
//! streams use distinct schemes so a caller's intent is visible in the
//! address itself. CRIs are immutable value types compared by structural
//! equality; `Display` round-trips to the literal form accepted by `parse`.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Scheme
// ---------------------------------------------------------------------------

/// The closed set of addressing schemes understood by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// Service destination (`srv://`): a published RPC service.
    Service,
    /// Stream destination (`stream://`): a pub/sub event stream.
    Stream,
}

impl Scheme {
    /// The literal scheme prefix as it appears in a CRI string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Service => "srv",
            Scheme::Stream => "stream",
        }
    }

    fn parse(literal: &str) -> Result<Self, CriError> {
        match literal {
            "srv" => Ok(Scheme::Service),
            "stream" => Ok(Scheme::Stream),
            other => Err(CriError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CriError
// ---------------------------------------------------------------------------

/// Errors produced when parsing or constructing a [`Cri`].
///
/// Address errors fail at parse time; a malformed CRI is never dispatched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CriError {
    /// The literal did not contain the `://` scheme separator.
    #[error("CRI is missing a scheme: {0}")]
    MissingScheme(String),
    /// The scheme is not one of the recognized destination schemes.
    #[error("unrecognized CRI scheme: {0}")]
    UnsupportedScheme(String),
    /// The resource name component was absent or blank.
    #[error("CRI resource name must not be blank")]
    MissingResource,
    /// An optional component was present but blank (e.g. `srv://@name`).
    #[error("CRI {0} must not be blank when present")]
    BlankComponent(&'static str),
}

// ---------------------------------------------------------------------------
// Cri
// ---------------------------------------------------------------------------

/// A parsed Conduit Resource Identifier.
///
/// Components:
/// - `scheme`: [`Scheme::Service`] or [`Scheme::Stream`]
/// - `scope`: optional instance selector, present when a service has multiple
///   concurrent instances
/// - `resource_name`: mandatory logical name (for services, typically a fully
///   qualified type name)
/// - `version`: optional semantic version disambiguating multiple published
///   versions of the same resource name
/// - `path`: optional sub-resource path (for services, the function name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cri {
    scheme: Scheme,
    scope: Option<String>,
    resource_name: String,
    version: Option<String>,
    path: Option<String>,
}

impl Cri {
    /// Parses a CRI literal.
    ///
    /// Splits on `://`, then `@` (scope), `#` (version), and the first
    /// remaining `/` (path). Only the resource name is required.
    ///
    /// # Errors
    ///
    /// Returns a [`CriError`] if the scheme is missing or unrecognized, the
    /// resource name is blank, or an optional component is present but blank.
    pub fn parse(literal: &str) -> Result<Self, CriError> {
        let (scheme_literal, rest) = literal
            .split_once("://")
            .ok_or_else(|| CriError::MissingScheme(literal.to_string()))?;
        let scheme = Scheme::parse(scheme_literal)?;

        // `@` only delimits a scope ahead of the resource name; inside a
        // version or path it is literal.
        let (scope, rest) = match rest.find('@') {
            Some(at) if !rest[..at].contains(['/', '#']) => {
                if at == 0 {
                    return Err(CriError::BlankComponent("scope"));
                }
                (Some(rest[..at].to_string()), &rest[at + 1..])
            }
            _ => (None, rest),
        };

        // Same for `#`: it only delimits a version ahead of the path.
        let hash = rest.find('#');
        let slash = rest.find('/');
        let (resource_name, version, path) = match (hash, slash) {
            (Some(h), s) if s.is_none_or(|s| h < s) => {
                let tail = &rest[h + 1..];
                match tail.split_once('/') {
                    Some((version, path)) => (&rest[..h], Some(version), Some(path)),
                    None => (&rest[..h], Some(tail), None),
                }
            }
            (_, Some(s)) => (&rest[..s], None, Some(&rest[s + 1..])),
            (_, None) => (rest, None, None),
        };

        if resource_name.is_empty() {
            return Err(CriError::MissingResource);
        }
        if version.is_some_and(str::is_empty) {
            return Err(CriError::BlankComponent("version"));
        }
        if path.is_some_and(str::is_empty) {
            return Err(CriError::BlankComponent("path"));
        }

        Ok(Self {
            scheme,
            scope,
            resource_name: resource_name.to_string(),
            version: version.map(str::to_string),
            path: path.map(str::to_string),
        })
    }

    /// Creates a service-destination CRI for the given resource name.
    ///
    /// # Errors
    ///
    /// Returns [`CriError::MissingResource`] if `resource_name` is blank.
    pub fn service(resource_name: impl Into<String>) -> Result<Self, CriError> {
        Self::create(Scheme::Service, resource_name)
    }

    /// Creates a stream-destination CRI for the given resource name.
    ///
    /// # Errors
    ///
    /// Returns [`CriError::MissingResource`] if `resource_name` is blank.
    pub fn stream(resource_name: impl Into<String>) -> Result<Self, CriError> {
        Self::create(Scheme::Stream, resource_name)
    }

    fn create(scheme: Scheme, resource_name: impl Into<String>) -> Result<Self, CriError> {
        let resource_name = resource_name.into();
        if resource_name.is_empty() {
            return Err(CriError::MissingResource);
        }
        Ok(Self {
            scheme,
            scope: None,
            resource_name,
            version: None,
            path: None,
        })
    }

    /// Returns a copy of this CRI with the given instance scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Returns a copy of this CRI with the given version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Returns a copy of this CRI with the given path (no leading slash).
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    #[must_use]
    pub fn has_scope(&self) -> bool {
        self.scope.is_some()
    }

    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    #[must_use]
    pub fn has_version(&self) -> bool {
        self.version.is_some()
    }

    /// The sub-resource path without its leading slash.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn has_path(&self) -> bool {
        self.path.is_some()
    }

    /// The CRI without its path component: `scheme://[scope@]name[#version]`.
    ///
    /// This is the routing key a dispatcher listens on; the path selects a
    /// function within the resource and is not part of the registration.
    #[must_use]
    pub fn base_resource(&self) -> Cri {
        Cri {
            scheme: self.scheme,
            scope: self.scope.clone(),
            resource_name: self.resource_name.clone(),
            version: self.version.clone(),
            path: None,
        }
    }
}

impl fmt::Display for Cri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(scope) = &self.scope {
            write!(f, "{scope}@")?;
        }
        f.write_str(&self.resource_name)?;
        if let Some(version) = &self.version {
            write!(f, "#{version}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "/{path}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Cri {
    type Err = CriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// ServiceIdentifier
// ---------------------------------------------------------------------------

/// Pure-data identity of a published service.
///
/// Registration and dispatch matching are keyed by this triple; it converts
/// to and from the base-resource form of a service CRI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceIdentifier {
    /// Fully qualified service name, e.g. `org.acme.FooService`.
    pub name: String,
    /// Optional published version.
    pub version: Option<String>,
    /// Optional instance scope.
    pub scope: Option<String>,
}

impl ServiceIdentifier {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            scope: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// The service-destination CRI this identifier registers under.
    ///
    /// # Errors
    ///
    /// Returns [`CriError::MissingResource`] if the name is blank.
    pub fn cri(&self) -> Result<Cri, CriError> {
        let mut cri = Cri::service(self.name.clone())?;
        if let Some(scope) = &self.scope {
            cri = cri.with_scope(scope.clone());
        }
        if let Some(version) = &self.version {
            cri = cri.with_version(version.clone());
        }
        Ok(cri)
    }

    /// Extracts the identifier from an inbound CRI, ignoring its path.
    #[must_use]
    pub fn from_cri(cri: &Cri) -> Self {
        Self {
            name: cri.resource_name().to_string(),
            version: cri.version().map(str::to_string),
            scope: cri.scope().map(str::to_string),
        }
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = &self.scope {
            write!(f, "{scope}@")?;
        }
        f.write_str(&self.name)?;
        if let Some(version) = &self.version {
            write!(f, "#{version}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parse_full_literal() {
        let cri = Cri::parse("srv://e35f51d0@org.acme.TestService#0.1.0/getFreeMemory").unwrap();
        assert_eq!(cri.scheme(), Scheme::Service);
        assert_eq!(cri.scope(), Some("e35f51d0"));
        assert_eq!(cri.resource_name(), "org.acme.TestService");
        assert_eq!(cri.version(), Some("0.1.0"));
        assert_eq!(cri.path(), Some("getFreeMemory"));
    }

    #[test]
    fn parse_minimal_literal() {
        let cri = Cri::parse("stream://updates").unwrap();
        assert_eq!(cri.scheme(), Scheme::Stream);
        assert!(!cri.has_scope());
        assert!(!cri.has_version());
        assert!(!cri.has_path());
        assert_eq!(cri.resource_name(), "updates");
    }

    #[test]
    fn parse_version_without_path() {
        let cri = Cri::parse("srv://org.acme.TestService#0.1.0").unwrap();
        assert_eq!(cri.version(), Some("0.1.0"));
        assert!(cri.path().is_none());
    }

    #[test]
    fn parse_path_without_version() {
        let cri = Cri::parse("srv://org.acme.TestService/invoke").unwrap();
        assert!(cri.version().is_none());
        assert_eq!(cri.path(), Some("invoke"));
    }

    #[test]
    fn parse_path_with_inner_slashes() {
        let cri = Cri::parse("stream://feed/a/b/c").unwrap();
        assert_eq!(cri.path(), Some("a/b/c"));
    }

    #[test]
    fn hash_and_at_inside_path_are_literal() {
        let cri = Cri::parse("stream://feed/a#b").unwrap();
        assert_eq!(cri.resource_name(), "feed");
        assert!(cri.version().is_none());
        assert_eq!(cri.path(), Some("a#b"));

        let cri = Cri::parse("srv://org.acme.Foo/mail@example").unwrap();
        assert!(!cri.has_scope());
        assert_eq!(cri.path(), Some("mail@example"));
    }

    #[test]
    fn missing_scheme_fails() {
        assert_eq!(
            Cri::parse("org.acme.TestService"),
            Err(CriError::MissingScheme("org.acme.TestService".to_string()))
        );
    }

    #[test]
    fn unsupported_scheme_fails() {
        assert_eq!(
            Cri::parse("http://org.acme.TestService"),
            Err(CriError::UnsupportedScheme("http".to_string()))
        );
    }

    #[test]
    fn blank_resource_fails() {
        assert_eq!(Cri::parse("srv://"), Err(CriError::MissingResource));
        assert_eq!(Cri::parse("srv://#1.0"), Err(CriError::MissingResource));
    }

    #[test]
    fn blank_scope_fails() {
        assert_eq!(
            Cri::parse("srv://@org.acme.TestService"),
            Err(CriError::BlankComponent("scope"))
        );
    }

    #[test]
    fn display_round_trips() {
        for literal in [
            "srv://org.acme.TestService",
            "srv://org.acme.TestService#0.1.0",
            "srv://scope1@org.acme.TestService#0.1.0/method",
            "stream://a1b2@replies",
            "stream://feed/a/b",
        ] {
            let cri = Cri::parse(literal).unwrap();
            assert_eq!(cri.to_string(), literal);
            assert_eq!(Cri::parse(&cri.to_string()).unwrap(), cri);
        }
    }

    #[test]
    fn structural_equality() {
        let built = Cri::service("org.acme.TestService")
            .unwrap()
            .with_scope("s1")
            .with_version("2.0")
            .with_path("run");
        let parsed = Cri::parse("srv://s1@org.acme.TestService#2.0/run").unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn base_resource_strips_path() {
        let cri = Cri::parse("srv://s1@org.acme.TestService#2.0/run").unwrap();
        assert_eq!(
            cri.base_resource().to_string(),
            "srv://s1@org.acme.TestService#2.0"
        );
    }

    #[test]
    fn service_identifier_round_trips_through_cri() {
        let id = ServiceIdentifier::new("org.acme.TestService")
            .with_version("1.2.3")
            .with_scope("node-7");
        let cri = id.cri().unwrap();
        assert_eq!(cri.to_string(), "srv://node-7@org.acme.TestService#1.2.3");
        assert_eq!(ServiceIdentifier::from_cri(&cri), id);
    }

    #[test]
    fn service_identifier_from_cri_ignores_path() {
        let cri = Cri::parse("srv://org.acme.TestService/run").unwrap();
        let id = ServiceIdentifier::from_cri(&cri);
        assert_eq!(id, ServiceIdentifier::new("org.acme.TestService"));
    }

    proptest! {
        #[test]
        fn parse_display_round_trip(
            scheme in prop_oneof![Just("srv"), Just("stream")],
            scope in proptest::option::of("[a-z0-9.-]{1,12}"),
            resource in "[a-zA-Z][a-zA-Z0-9.]{0,24}",
            version in proptest::option::of("[0-9]\\.[0-9]\\.[0-9]"),
            path in proptest::option::of("[a-zA-Z][a-zA-Z0-9/]{0,16}"),
        ) {
            let mut literal = format!("{scheme}://");
            if let Some(scope) = &scope {
                literal.push_str(scope);
                literal.push('@');
            }
            literal.push_str(&resource);
            if let Some(version) = &version {
                literal.push('#');
                literal.push_str(version);
            }
            if let Some(path) = &path {
                literal.push('/');
                literal.push_str(path);
            }
            let cri = Cri::parse(&literal).unwrap();
            prop_assert_eq!(cri.to_string(), literal);
        }
    }
}
