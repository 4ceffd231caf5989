use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

fn default_ttl_secs() -> u64 {
    86_400
}

/// Lifetime of issued sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Seconds from issuance until a session expires, both in the claim and
    /// on the ledger.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl SessionSettings {
    /// The session lifetime.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_max_age_secs() -> u64 {
    600
}

/// What a sign-in message must satisfy beyond its signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInSettings {
    /// The domain messages must be addressed to. Their `URI` must be on the
    /// same authority. `None` accepts any domain.
    #[serde(default)]
    pub domain: Option<String>,

    /// Oldest acceptable `Issued At`, in seconds before now. Also bounds how
    /// long used nonces are remembered.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for SignInSettings {
    fn default() -> Self {
        Self {
            domain: None,
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl SignInSettings {
    /// Accept only messages addressed to `domain`.
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Self::default()
        }
    }

    /// How long a signed message stays acceptable after it was issued.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// How the gate behaves when it cannot obtain a positive answer.
///
/// `Production` fails closed everywhere. `Development` admits requests that
/// present no claim and skips the ledger check when no ledger is configured,
/// logging a warning each time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPolicy {
    /// Fail closed.
    #[default]
    Production,
    /// Fail open where nothing can be checked.
    Development,
}

impl AccessPolicy {
    /// Returns `true` if the policy admits unverifiable requests.
    pub fn is_fail_open(&self) -> bool {
        matches!(self, AccessPolicy::Development)
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessPolicy::Production => "production",
            AccessPolicy::Development => "development",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Policy {
        mode: AccessPolicy,
    }

    #[test]
    fn it_defaults_to_a_day_and_production() {
        let session: SessionSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(session.ttl(), Duration::from_secs(86_400));
        assert_eq!(AccessPolicy::default(), AccessPolicy::Production);
        assert!(!AccessPolicy::default().is_fail_open());
    }

    #[test]
    fn it_accepts_any_domain_for_ten_minutes_by_default() {
        let sign_in: SignInSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(sign_in, SignInSettings::default());
        assert_eq!(sign_in.domain, None);
        assert_eq!(sign_in.max_age(), Duration::from_secs(600));
        assert_eq!(
            SignInSettings::for_domain("app.example.com").domain.as_deref(),
            Some("app.example.com")
        );
    }

    #[test]
    fn it_reads_lowercase_modes() {
        let policy: Policy = serde_json::from_str(r#"{"mode":"development"}"#).unwrap();
        assert_eq!(policy.mode, AccessPolicy::Development);
        assert_eq!(policy.mode.to_string(), "development");
        assert!(serde_json::from_str::<Policy>(r#"{"mode":"Production"}"#).is_err());
    }
}
