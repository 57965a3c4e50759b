//! Definition document parsing and validation.
//!
//! # Responsibilities
//! - Structural parsing (YAML list of application entries)
//! - Semantic validation: unique ids, non-empty origin lists, known TLS
//!   tokens, syntactically valid host/port
//!
//! # Design Decisions
//! - Raw serde structs keep every field optional so that a missing field is
//!   reported with its application id instead of as a serde error
//! - Returns all violations, not just the first
//! - Pure function: DefinitionDocument → Result<Topology, ValidationError>

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;

use crate::topology::document::DefinitionDocument;
use crate::topology::model::{
    ApplicationSpec, OriginSpec, TlsPolicy, TlsProtocol, TlsProvider, Topology, KNOWN_CIPHER_SUITES,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawApplication {
    id: Option<String>,
    #[serde(alias = "pathPrefix")]
    path: Option<String>,
    tls_settings: Option<RawTlsSettings>,
    origins: Option<Vec<RawOrigin>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTlsSettings {
    trust_all_certs: Option<bool>,
    #[serde(alias = "provider")]
    ssl_provider: Option<String>,
    protocols: Option<Vec<String>>,
    cipher_suites: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawOrigin {
    id: Option<String>,
    host: Option<String>,
    port: Option<i64>,
}

/// A single rule broken by a candidate document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Offending application id (or `#index` when the id itself is missing).
    /// `None` for document-level problems.
    pub application: Option<String>,
    pub field: String,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.application {
            Some(app) => write!(f, "application '{}', field '{}': {}", app, self.field, self.reason),
            None => write!(f, "field '{}': {}", self.field, self.reason),
        }
    }
}

/// Rejection of a candidate document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    fn document(reason: impl Into<String>) -> Self {
        Self {
            violations: vec![Violation {
                application: None,
                field: "document".to_string(),
                reason: reason.into(),
            }],
        }
    }

    /// Every violation found, in document order. Never empty.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// True if any violation concerns `field` of `application`.
    pub fn mentions(&self, application: &str, field: &str) -> bool {
        self.violations
            .iter()
            .any(|v| v.application.as_deref() == Some(application) && v.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid topology: ")?;
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Collects violations while walking one document.
#[derive(Default)]
struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    fn reject(&mut self, application: &str, field: impl Into<String>, reason: impl Into<String>) {
        self.violations.push(Violation {
            application: Some(application.to_string()),
            field: field.into(),
            reason: reason.into(),
        });
    }
}

/// Parse and validate a definition document.
pub fn parse(document: &DefinitionDocument) -> Result<Topology, ValidationError> {
    let text = std::str::from_utf8(document.content())
        .map_err(|e| ValidationError::document(format!("not valid UTF-8: {}", e)))?;

    // Editors truncate before writing; an empty read is never a real topology.
    if text.trim().is_empty() {
        return Err(ValidationError::document("definition is empty"));
    }

    let raw: Option<Vec<RawApplication>> =
        serde_yaml::from_str(text).map_err(|e| ValidationError::document(e.to_string()))?;
    let raw = raw.ok_or_else(|| ValidationError::document("definition is empty"))?;

    let mut checker = Checker::default();
    let mut seen_ids = HashSet::new();
    let mut seen_prefixes = HashSet::new();
    let mut applications = Vec::with_capacity(raw.len());

    for (index, entry) in raw.into_iter().enumerate() {
        let label = match entry.id.as_deref() {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => format!("#{}", index),
        };

        let id = match entry.id {
            Some(id) if !id.trim().is_empty() => {
                if !seen_ids.insert(id.clone()) {
                    checker.reject(&label, "id", "duplicate application id");
                }
                Some(id)
            }
            Some(_) => {
                checker.reject(&label, "id", "must not be empty");
                None
            }
            None => {
                checker.reject(&label, "id", "missing");
                None
            }
        };

        let path_prefix = match entry.path {
            Some(path) if path.starts_with('/') => {
                if !seen_prefixes.insert(path.clone()) {
                    checker.reject(&label, "path", format!("path prefix '{}' already routed", path));
                }
                Some(path)
            }
            Some(path) => {
                checker.reject(&label, "path", format!("'{}' must start with '/'", path));
                None
            }
            None => {
                checker.reject(&label, "path", "missing");
                None
            }
        };

        let tls = entry
            .tls_settings
            .and_then(|settings| check_tls(&mut checker, &label, settings));
        let origins = check_origins(&mut checker, &label, entry.origins);

        if let (Some(id), Some(path_prefix), Some(origins)) = (id, path_prefix, origins) {
            applications.push(ApplicationSpec {
                id,
                path_prefix,
                tls,
                origins,
            });
        }
    }

    if checker.violations.is_empty() {
        Ok(Topology::new(applications))
    } else {
        Err(ValidationError {
            violations: checker.violations,
        })
    }
}

fn check_origins(
    checker: &mut Checker,
    app: &str,
    origins: Option<Vec<RawOrigin>>,
) -> Option<Vec<OriginSpec>> {
    let origins = match origins {
        Some(origins) if !origins.is_empty() => origins,
        Some(_) => {
            checker.reject(app, "origins", "must not be empty");
            return None;
        }
        None => {
            checker.reject(app, "origins", "missing");
            return None;
        }
    };

    let before = checker.violations.len();
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(origins.len());

    for (index, origin) in origins.into_iter().enumerate() {
        let id = match origin.id {
            Some(id) if !id.trim().is_empty() => {
                if !seen.insert(id.clone()) {
                    checker.reject(app, format!("origins[{}].id", index), format!("duplicate origin id '{}'", id));
                }
                id
            }
            _ => {
                checker.reject(app, format!("origins[{}].id", index), "missing or empty");
                continue;
            }
        };

        let Some(host) = origin.host else {
            checker.reject(app, format!("origins[{}].host", index), "missing");
            continue;
        };

        match parse_address(&host, origin.port) {
            Ok((host, port)) => specs.push(OriginSpec { id, host, port }),
            Err(reason) => checker.reject(app, format!("origins[{}].host", index), reason),
        }
    }

    (checker.violations.len() == before).then_some(specs)
}

fn check_tls(checker: &mut Checker, app: &str, settings: RawTlsSettings) -> Option<TlsPolicy> {
    let before = checker.violations.len();

    let provider = match settings.ssl_provider.as_deref() {
        None => TlsProvider::Builtin,
        Some(token) => token.parse().unwrap_or_else(|reason: String| {
            checker.reject(app, "tlsSettings.sslProvider", reason);
            TlsProvider::Builtin
        }),
    };

    let protocols = match settings.protocols {
        None => TlsProtocol::defaults(),
        Some(tokens) if tokens.is_empty() => {
            checker.reject(app, "tlsSettings.protocols", "must not be empty");
            Vec::new()
        }
        Some(tokens) => {
            let mut protocols = Vec::new();
            for token in tokens {
                match token.parse::<TlsProtocol>() {
                    Ok(protocol) if !protocols.contains(&protocol) => protocols.push(protocol),
                    Ok(_) => {}
                    Err(reason) => checker.reject(app, "tlsSettings.protocols", reason),
                }
            }
            protocols
        }
    };

    let cipher_suites = settings.cipher_suites.unwrap_or_default();
    for suite in &cipher_suites {
        if !KNOWN_CIPHER_SUITES.contains(&suite.as_str()) {
            checker.reject(app, "tlsSettings.cipherSuites", format!("unknown cipher suite '{}'", suite));
        }
    }

    (checker.violations.len() == before).then(|| TlsPolicy {
        trust_all_certs: settings.trust_all_certs.unwrap_or(false),
        provider,
        protocols,
        cipher_suites,
    })
}

/// Split and check an origin address. `host` is either `name:port` or, when
/// `port` is given separately, a bare name.
fn parse_address(host: &str, port: Option<i64>) -> Result<(String, u16), String> {
    let (name, port) = match port {
        Some(port) => (host.trim_start_matches('[').trim_end_matches(']'), port),
        None => split_host_port(host)?,
    };

    if name.is_empty() {
        return Err("host must not be empty".to_string());
    }

    let literal = if name.contains(':') {
        format!("[{}]", name)
    } else {
        name.to_string()
    };
    url::Host::parse(&literal).map_err(|e| format!("invalid host '{}': {}", name, e))?;

    let port = u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| format!("port {} out of range", port))?;

    Ok((name.to_string(), port))
}

fn split_host_port(address: &str) -> Result<(&str, i64), String> {
    let (name, port) = if let Some(rest) = address.strip_prefix('[') {
        let (name, tail) = rest
            .split_once(']')
            .ok_or_else(|| format!("unterminated IPv6 literal in '{}'", address))?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| format!("expected host:port, got '{}'", address))?;
        (name, port)
    } else {
        match address.rsplit_once(':') {
            Some((name, _)) if name.contains(':') => {
                return Err(format!("IPv6 literal must be bracketed in '{}'", address))
            }
            Some(parts) => parts,
            None => return Err(format!("expected host:port, got '{}'", address)),
        }
    };

    let port = port
        .parse::<i64>()
        .map_err(|_| format!("invalid port '{}'", port))?;
    Ok((name, port))
}
