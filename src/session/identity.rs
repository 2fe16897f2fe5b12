use rand::{thread_rng, Rng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use tracing::{debug, warn};

use crate::cli::config::{IdentityProfile, SessionSettings};
use crate::session::SessionError;

/// Picks the identity a session presents to the target site
pub struct IdentityManager {
    /// Available identities to use
    identities: Vec<IdentityProfile>,
}

/// Header set resolved for one session
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub headers: HeaderMap,
}

impl IdentityManager {
    /// Create a new identity manager with the given profiles
    pub fn new(identities: Vec<IdentityProfile>) -> Self {
        Self { identities }
    }

    /// Select a random identity
    pub fn random_identity(&self) -> Result<&IdentityProfile, SessionError> {
        if self.identities.is_empty() {
            return Err(SessionError::NoIdentities);
        }

        let mut rng = thread_rng();
        Ok(&self.identities[rng.gen_range(0..self.identities.len())])
    }

    /// Get a specific identity by name
    pub fn get_identity(&self, name: &str) -> Result<&IdentityProfile, SessionError> {
        self.identities.iter()
            .find(|identity| identity.name == name)
            .ok_or_else(|| SessionError::UnknownIdentity(name.to_string()))
    }

    /// Resolve the full header set for a session.
    ///
    /// Layering, later wins: identity profile, standard browser headers,
    /// explicit user agent / language overrides, JSON extra headers.
    /// The injected cookie is not a header here; it seeds the session cookie jar.
    pub fn resolve(&self, settings: &SessionSettings) -> Result<Identity, SessionError> {
        let profile = match (&settings.identity, self.identities.is_empty()) {
            (Some(name), _) => Some(self.get_identity(name)?),
            (None, false) => Some(self.random_identity()?),
            (None, true) if settings.user_agent.is_some() => None,
            (None, true) => return Err(SessionError::NoIdentities),
        };

        let mut headers = HeaderMap::new();
        let name = profile.map_or_else(|| "custom".to_string(), |p| p.name.clone());

        if let Some(profile) = profile {
            insert_header(&mut headers, USER_AGENT.as_str(), &profile.user_agent);
            insert_header(&mut headers, ACCEPT_LANGUAGE.as_str(), &profile.accept_language);
            for (key, value) in &profile.extra_headers {
                insert_header(&mut headers, key, value);
            }
        }

        // Standard headers
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"));
        headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));

        if let Some(user_agent) = &settings.user_agent {
            insert_header(&mut headers, USER_AGENT.as_str(), user_agent);
        }
        if let Some(language) = &settings.accept_language {
            insert_header(&mut headers, ACCEPT_LANGUAGE.as_str(), language);
        }

        if let Some(raw) = &settings.extra_headers {
            for (key, value) in parse_extra_headers(raw) {
                insert_header(&mut headers, &key, &value);
            }
        }

        debug!("Resolved identity '{}' with {} headers", name, headers.len());

        Ok(Identity { name, headers })
    }
}

/// Split a raw `Cookie` header value into its `name=value` pairs
pub fn cookie_pairs(raw: &str) -> Vec<&str> {
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty() && pair.contains('='))
        .collect()
}

/// Parse a JSON object of header overrides; anything else is ignored with a warning
pub fn parse_extra_headers(raw: &str) -> Vec<(String, String)> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("Ignoring malformed extra headers JSON: {}", e);
            return Vec::new();
        }
    };

    let Some(object) = value.as_object() else {
        warn!("Ignoring extra headers: expected a JSON object");
        return Vec::new();
    };

    object.iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn insert_header(headers: &mut HeaderMap, key: &str, value: &str) {
    let name = match HeaderName::from_bytes(key.as_bytes()) {
        Ok(name) => name,
        Err(_) => {
            warn!("Skipping invalid header name: {:?}", key);
            return;
        }
    };

    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!("Skipping invalid value for header {}", name),
    }
}
