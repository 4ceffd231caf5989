//! Sign-in messages in the EIP-4361 layout.
//!
//! The requested tools travel inside the signed text in one of two
//! encodings. The primary one is the `Resources:` list, one URN per tool:
//!
//! ```text
//! Resources:
//! - urn:goat:tool:search_web:Search%20the%20web
//! ```
//!
//! Only when the message has no `Resources:` section at all is the readable
//! trailing list consulted:
//!
//! ```text
//! Tools to authorize:
//! - search_web: Search the web
//! ```
//!
//! A request to end a session carries [`REVOKE_RESOURCE`] instead of tools.

use std::{fmt, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use warden_ledger::Address;

use crate::{Capability, MessageError};

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const TOOL_URN_PREFIX: &str = "urn:goat:tool:";
const TOOLS_HEADING: &str = "Tools to authorize:";
const RESOURCES_HEADING: &str = "Resources:";

/// The resource that marks a message as a request to revoke the signer's
/// session.
pub const REVOKE_RESOURCE: &str = "urn:warden:revoke";

/// Characters left unescaped in a tool description, matching
/// `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// The resource URN that declares `capability`.
pub fn tool_resource(capability: &Capability) -> String {
    format!(
        "{TOOL_URN_PREFIX}{}:{}",
        capability.name,
        utf8_percent_encode(&capability.description, URI_COMPONENT)
    )
}

/// A parsed sign-in message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInMessage {
    /// The requesting domain, scheme included if present.
    pub domain: String,
    /// The account asked to sign.
    pub address: Address,
    /// Optional human-readable statement.
    pub statement: Option<String>,
    /// The resource the sign-in is for.
    pub uri: String,
    /// Message version. Always `1`.
    pub version: String,
    /// Chain the session is bound to.
    pub chain_id: u64,
    /// Replay nonce.
    pub nonce: String,
    /// When the message was issued.
    pub issued_at: DateTime<Utc>,
    /// When the message stops being acceptable.
    pub expiration_time: Option<DateTime<Utc>>,
    /// When the message becomes acceptable.
    pub not_before: Option<DateTime<Utc>>,
    /// Caller-chosen request id.
    pub request_id: Option<String>,
    /// The `Resources:` list. `None` when the section is absent.
    pub resources: Option<Vec<String>>,
    /// The trailing `Tools to authorize:` list. `None` when absent.
    pub tool_list: Option<Vec<Capability>>,
}

impl SignInMessage {
    /// A minimal version-1 message.
    pub fn new(
        domain: impl Into<String>,
        address: Address,
        uri: impl Into<String>,
        chain_id: u64,
        nonce: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            domain: domain.into(),
            address,
            statement: None,
            uri: uri.into(),
            version: "1".into(),
            chain_id,
            nonce: nonce.into(),
            issued_at,
            expiration_time: None,
            not_before: None,
            request_id: None,
            resources: None,
            tool_list: None,
        }
    }

    /// Set the statement.
    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    /// Set the expiration time.
    pub fn with_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.expiration_time = Some(at);
        self
    }

    /// Declare `tools` as resource URNs.
    pub fn with_tools(mut self, tools: &[Capability]) -> Self {
        self.resources
            .get_or_insert_with(Vec::new)
            .extend(tools.iter().map(tool_resource));
        self
    }

    /// Mark the message as a revocation request.
    pub fn with_revocation(mut self) -> Self {
        self.resources
            .get_or_insert_with(Vec::new)
            .push(REVOKE_RESOURCE.to_string());
        self
    }

    /// Returns `true` if the message asks to revoke the signer's session.
    pub fn is_revocation(&self) -> bool {
        self.resources
            .iter()
            .flatten()
            .any(|resource| resource == REVOKE_RESOURCE)
    }

    /// Declare `tools` in the readable trailing list.
    pub fn with_tool_list(mut self, tools: &[Capability]) -> Self {
        self.tool_list = Some(tools.to_vec());
        self
    }

    /// The tools this message declares, in the order they appear.
    ///
    /// Resources that are not tool URNs are ignored. The readable list is
    /// used only when there is no `Resources:` section.
    pub fn declared_tools(&self) -> Result<Vec<Capability>, MessageError> {
        let Some(resources) = &self.resources else {
            return Ok(self.tool_list.clone().unwrap_or_default());
        };

        resources
            .iter()
            .filter_map(|resource| {
                resource
                    .strip_prefix(TOOL_URN_PREFIX)
                    .map(|rest| (resource, rest))
            })
            .map(|(resource, rest)| {
                let invalid = || MessageError::InvalidResource(resource.clone());
                let (name, encoded) = rest.split_once(':').ok_or_else(invalid)?;
                if name.is_empty() || encoded.is_empty() {
                    return Err(invalid());
                }
                let description = percent_decode_str(encoded)
                    .decode_utf8()
                    .map_err(|_| invalid())?;
                Ok(Capability::new(name, description))
            })
            .collect()
    }

    /// Names of [`SignInMessage::declared_tools`].
    pub fn declared_names(&self) -> Result<Vec<String>, MessageError> {
        Ok(self
            .declared_tools()?
            .into_iter()
            .map(|capability| capability.name)
            .collect())
    }
}

fn timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, MessageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| MessageError::InvalidField {
            field,
            value: value.to_string(),
        })
}

fn assign<T>(slot: &mut Option<T>, field: &'static str, value: T) -> Result<(), MessageError> {
    if slot.is_some() {
        return Err(MessageError::UnexpectedLine(format!("{field}: repeated")));
    }
    *slot = Some(value);
    Ok(())
}

fn tool_line(line: &str) -> Result<Capability, MessageError> {
    let invalid = || MessageError::UnexpectedLine(line.to_string());
    let rest = line.strip_prefix('-').ok_or_else(invalid)?.trim_start();
    let (name, description) = rest.split_once(':').ok_or_else(invalid)?;
    let (name, description) = (name.trim(), description.trim());
    if name.is_empty() || description.is_empty() {
        return Err(invalid());
    }
    Ok(Capability::new(name, description))
}

impl FromStr for SignInMessage {
    type Err = MessageError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut lines = text.lines().peekable();

        let domain = lines
            .next()
            .and_then(|header| header.strip_suffix(HEADER_SUFFIX))
            .filter(|domain| !domain.is_empty())
            .ok_or(MessageError::MissingHeader)?;
        let address: Address = lines
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .ok_or(MessageError::MissingAddress)?
            .parse()?;

        let mut statement = Vec::new();
        while let Some(line) = lines.next_if(|line| !line.starts_with("URI: ")) {
            if !line.is_empty() {
                statement.push(line);
            }
        }

        let mut uri = None;
        let mut version = None;
        let mut chain_id = None;
        let mut nonce = None;
        let mut issued_at = None;
        let mut expiration_time = None;
        let mut not_before = None;
        let mut request_id = None;
        let mut resources = None;

        while let Some(line) = lines.next() {
            if line.is_empty() {
                break;
            }
            if line == RESOURCES_HEADING {
                let mut list = Vec::new();
                while let Some(item) = lines.next_if(|line| line.starts_with("- ")) {
                    list.push(item[2..].trim().to_string());
                }
                assign(&mut resources, "Resources", list)?;
                continue;
            }

            let (key, value) = line
                .split_once(": ")
                .ok_or_else(|| MessageError::UnexpectedLine(line.to_string()))?;
            match key {
                "URI" => assign(&mut uri, "URI", value.to_string())?,
                "Version" => assign(&mut version, "Version", value.to_string())?,
                "Chain ID" => {
                    let id = value.parse().map_err(|_| MessageError::InvalidField {
                        field: "Chain ID",
                        value: value.to_string(),
                    })?;
                    assign(&mut chain_id, "Chain ID", id)?
                }
                "Nonce" => assign(&mut nonce, "Nonce", value.to_string())?,
                "Issued At" => assign(&mut issued_at, "Issued At", timestamp("Issued At", value)?)?,
                "Expiration Time" => assign(
                    &mut expiration_time,
                    "Expiration Time",
                    timestamp("Expiration Time", value)?,
                )?,
                "Not Before" => assign(
                    &mut not_before,
                    "Not Before",
                    timestamp("Not Before", value)?,
                )?,
                "Request ID" => assign(&mut request_id, "Request ID", value.to_string())?,
                _ => return Err(MessageError::UnexpectedLine(line.to_string())),
            }
        }

        let mut tool_list = None;
        while let Some(line) = lines.next() {
            if line.trim() == TOOLS_HEADING {
                let mut list = Vec::new();
                while let Some(item) = lines.next_if(|line| !line.trim().is_empty()) {
                    list.push(tool_line(item.trim())?);
                }
                tool_list = Some(list);
            }
        }

        let version = version.ok_or(MessageError::MissingField("Version"))?;
        if version != "1" {
            return Err(MessageError::InvalidField {
                field: "Version",
                value: version,
            });
        }
        let nonce: String = nonce.ok_or(MessageError::MissingField("Nonce"))?;
        if nonce.len() < 8 || !nonce.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MessageError::InvalidField {
                field: "Nonce",
                value: nonce,
            });
        }

        Ok(SignInMessage {
            domain: domain.to_string(),
            address,
            statement: (!statement.is_empty()).then(|| statement.join("\n")),
            uri: uri.ok_or(MessageError::MissingField("URI"))?,
            version,
            chain_id: chain_id.ok_or(MessageError::MissingField("Chain ID"))?,
            nonce,
            issued_at: issued_at.ok_or(MessageError::MissingField("Issued At"))?,
            expiration_time,
            not_before,
            request_id,
            resources,
            tool_list,
        })
    }
}

fn rfc3339(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl fmt::Display for SignInMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{HEADER_SUFFIX}", self.domain)?;
        writeln!(f, "{}", self.address.to_checksum())?;
        writeln!(f)?;
        if let Some(statement) = &self.statement {
            writeln!(f, "{statement}")?;
        }
        writeln!(f)?;
        writeln!(f, "URI: {}", self.uri)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Chain ID: {}", self.chain_id)?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        write!(f, "Issued At: {}", rfc3339(&self.issued_at))?;
        if let Some(at) = &self.expiration_time {
            write!(f, "\nExpiration Time: {}", rfc3339(at))?;
        }
        if let Some(at) = &self.not_before {
            write!(f, "\nNot Before: {}", rfc3339(at))?;
        }
        if let Some(id) = &self.request_id {
            write!(f, "\nRequest ID: {id}")?;
        }
        if let Some(resources) = &self.resources {
            write!(f, "\n{RESOURCES_HEADING}")?;
            for resource in resources {
                write!(f, "\n- {resource}")?;
            }
        }
        if let Some(tools) = &self.tool_list {
            write!(f, "\n\n{TOOLS_HEADING}")?;
            for tool in tools {
                write!(f, "\n- {}: {}", tool.name, tool.description)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    const ACCOUNT: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn issued_at() -> DateTime<Utc> {
        timestamp("Issued At", "2025-03-01T12:00:00Z").unwrap()
    }

    fn sample() -> String {
        [
            "app.example.com wants you to sign in with your Ethereum account:",
            ACCOUNT,
            "",
            "Authorize tools for this session.",
            "",
            "URI: https://app.example.com",
            "Version: 1",
            "Chain ID: 1946",
            "Nonce: 32891756abcd",
            "Issued At: 2025-03-01T12:00:00Z",
            "Expiration Time: 2025-03-02T12:00:00Z",
            "Resources:",
            "- urn:goat:tool:search_web:Search%20the%20web%20for%20anything.",
            "- https://app.example.com/terms",
            "- urn:goat:tool:query_graph:Query%20a%20graph%3A%20Cypher",
        ]
        .join("\n")
    }

    #[test]
    fn it_parses_the_standard_fields() -> TestResult {
        let message: SignInMessage = sample().parse()?;
        assert_eq!(message.domain, "app.example.com");
        assert_eq!(message.address, ACCOUNT.parse::<Address>()?);
        assert_eq!(
            message.statement.as_deref(),
            Some("Authorize tools for this session.")
        );
        assert_eq!(message.chain_id, 1946);
        assert_eq!(message.nonce, "32891756abcd");
        assert_eq!(message.issued_at, issued_at());
        assert!(message.expiration_time.is_some());
        assert_eq!(message.resources.as_ref().map(Vec::len), Some(3));
        Ok(())
    }

    #[test]
    fn it_reads_tools_from_resources_in_order() -> TestResult {
        let message: SignInMessage = sample().parse()?;
        assert_eq!(
            message.declared_tools()?,
            vec![
                Capability::new("search_web", "Search the web for anything."),
                Capability::new("query_graph", "Query a graph: Cypher"),
            ]
        );
        Ok(())
    }

    #[test]
    fn it_falls_back_to_the_readable_list_only_without_resources() -> TestResult {
        let readable = [
            "app.example.com wants you to sign in with your Ethereum account:",
            ACCOUNT,
            "",
            "",
            "URI: https://app.example.com",
            "Version: 1",
            "Chain ID: 1946",
            "Nonce: 32891756abcd",
            "Issued At: 2025-03-01T12:00:00Z",
            "",
            "Tools to authorize:",
            "- search_web: Search the web",
            "- query_graph: Query a graph",
        ]
        .join("\n");
        let message: SignInMessage = readable.parse()?;
        assert_eq!(message.statement, None);
        assert_eq!(message.declared_names()?, vec!["search_web", "query_graph"]);

        let both = format!("{}\n\nTools to authorize:\n- delete_all: Remove everything", sample());
        let message: SignInMessage = both.parse()?;
        assert_eq!(message.declared_names()?, vec!["search_web", "query_graph"]);
        Ok(())
    }

    #[test]
    fn it_rejects_unreadable_tool_lines() {
        let readable = |line: &str| {
            [
                "app.example.com wants you to sign in with your Ethereum account:",
                ACCOUNT,
                "",
                "",
                "URI: https://app.example.com",
                "Version: 1",
                "Chain ID: 1946",
                "Nonce: 32891756abcd",
                "Issued At: 2025-03-01T12:00:00Z",
                "",
                "Tools to authorize:",
                "- search_web: Search the web",
                line,
            ]
            .join("\n")
        };

        for line in ["- query_graph", "query_graph: no dash", "- : nameless", "- query_graph:"] {
            match readable(line).parse::<SignInMessage>() {
                Err(MessageError::UnexpectedLine(rejected)) => assert_eq!(rejected, line.trim()),
                other => panic!("expected {line:?} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn it_marks_revocation_requests() -> TestResult {
        let message = SignInMessage::new(
            "app.example.com",
            ACCOUNT.parse()?,
            "https://app.example.com",
            1946,
            "32891756abcd",
            issued_at(),
        );
        assert!(!message.is_revocation());

        let parsed: SignInMessage = message.with_revocation().to_string().parse()?;
        assert!(parsed.is_revocation());
        assert_eq!(parsed.resources, Some(vec![REVOKE_RESOURCE.to_string()]));
        assert!(parsed.declared_tools()?.is_empty());
        assert!(!sample().parse::<SignInMessage>()?.is_revocation());
        Ok(())
    }

    #[test]
    fn it_declares_nothing_without_either_section() -> TestResult {
        let message = SignInMessage::new(
            "app.example.com",
            ACCOUNT.parse()?,
            "https://app.example.com",
            1946,
            "32891756abcd",
            issued_at(),
        );
        let parsed: SignInMessage = message.to_string().parse()?;
        assert!(parsed.declared_tools()?.is_empty());
        Ok(())
    }

    #[test]
    fn it_renders_messages_it_can_parse() -> TestResult {
        let tools = [
            Capability::new("search_web", "Search: the web & more"),
            Capability::new("query_graph", "Query"),
        ];
        let message = SignInMessage::new(
            "app.example.com",
            ACCOUNT.parse()?,
            "https://app.example.com",
            1946,
            "32891756abcd",
            issued_at(),
        )
        .with_statement("Authorize tools.")
        .with_tools(&tools);

        let text = message.to_string();
        assert!(text.contains(&format!("\n{ACCOUNT}\n")));
        assert!(text.contains("urn:goat:tool:search_web:Search%3A%20the%20web%20%26%20more"));

        let parsed: SignInMessage = text.parse()?;
        assert_eq!(parsed, message);
        assert_eq!(parsed.declared_tools()?, tools.to_vec());
        Ok(())
    }

    #[test]
    fn it_rejects_malformed_messages() {
        assert!(matches!(
            "hello".parse::<SignInMessage>(),
            Err(MessageError::MissingHeader)
        ));
        assert!(matches!(
            sample().replace(ACCOUNT, "0x1234").parse::<SignInMessage>(),
            Err(MessageError::InvalidAddress(_))
        ));
        assert!(matches!(
            sample().replace("Chain ID: 1946", "Chain ID: soneium").parse::<SignInMessage>(),
            Err(MessageError::InvalidField { field: "Chain ID", .. })
        ));
        assert!(matches!(
            sample().replace("Nonce: 32891756abcd\n", "").parse::<SignInMessage>(),
            Err(MessageError::MissingField("Nonce"))
        ));
        assert!(matches!(
            sample().replace("Version: 1", "Version: 2").parse::<SignInMessage>(),
            Err(MessageError::InvalidField { field: "Version", .. })
        ));
        assert!(matches!(
            sample().replace("URI: ", "Uri: ").parse::<SignInMessage>(),
            Err(MessageError::UnexpectedLine(_))
        ));
    }

    #[test]
    fn it_rejects_broken_tool_urns() -> TestResult {
        let message: SignInMessage = sample()
            .replace("query_graph:Query", "query_graph")
            .replace("%3A%20Cypher", "")
            .parse()?;
        assert!(matches!(
            message.declared_tools(),
            Err(MessageError::InvalidResource(_))
        ));

        let message: SignInMessage = sample().replace("%20the%20web", "%FF").parse()?;
        assert!(matches!(
            message.declared_tools(),
            Err(MessageError::InvalidResource(_))
        ));
        Ok(())
    }
}
