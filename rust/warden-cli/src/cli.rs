//! Command-line surface over [`Services`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use warden_auth::ServiceError;
use warden_ledger::{Address, commit};

use crate::Services;

/// Operator tooling for ledger-anchored tool sessions.
#[derive(Debug, Parser)]
#[command(name = "warden")]
#[command(bin_name = "warden")]
#[command(about = "Wallet sign-in and ledger-anchored tool authorization", long_about = None)]
pub struct WardenCli {
    /// Path to the TOML configuration.
    #[arg(short, long, default_value = "warden.toml")]
    pub config: PathBuf,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve or deploy the session contract.
    Provision,

    /// Print the commitment for an ordered tool list.
    Commit {
        /// Tool names, in order.
        #[arg(required = true)]
        tools: Vec<String>,
    },

    /// Show the stored session for an owner.
    Status {
        /// The owner's address.
        owner: Address,
    },

    /// Check whether the ledger attests an ordered tool list for an owner.
    Verify {
        /// The owner's address.
        owner: Address,
        /// Tool names, in order.
        #[arg(required = true)]
        tools: Vec<String>,
    },

    /// Revoke the session of whoever signed a sign-in message.
    Revoke {
        /// File holding the exact signed message text.
        #[arg(short, long)]
        message: PathBuf,
        /// The 65-byte hex signature.
        #[arg(short, long)]
        signature: String,
    },

    /// Exchange a signed sign-in message for a bearer claim.
    Issue {
        /// File holding the exact signed message text.
        #[arg(short, long)]
        message: PathBuf,
        /// The 65-byte hex signature.
        #[arg(short, long)]
        signature: String,
    },

    /// Decide whether a claim may invoke a tool.
    Authorize {
        /// The encoded bearer claim, without the `Bearer ` prefix.
        #[arg(short, long)]
        token: Option<String>,
        /// The tool to invoke.
        tool: String,
    },

    /// List the configured tools.
    Tools,
}

fn read_message(path: &Path) -> Result<String> {
    // Signed bytes must be preserved exactly; no trimming.
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read message file {}", path.display()))
}

/// Run `command` and render its outcome as JSON.
///
/// Refusals and issuance failures are returned as [`ServiceError`]s so the
/// caller can report the code.
pub async fn execute(command: &Command, services: &Services) -> Result<Value> {
    match command {
        Command::Provision => {
            let gateway = services.ledger.gateway().map_err(ServiceError::from)?;
            let contract = gateway
                .ensure_provisioned()
                .await
                .map_err(ServiceError::from)?;
            Ok(json!({
                "contractAddress": contract,
                "network": gateway.settings().network,
                "chainId": gateway.settings().chain_id,
            }))
        }
        Command::Commit { tools } => Ok(json!({
            "tools": tools,
            "commitment": commit(tools),
        })),
        Command::Status { owner } => Ok(serde_json::to_value(
            services.registry.status(*owner).await,
        )?),
        Command::Verify { owner, tools } => Ok(serde_json::to_value(
            services.registry.verify(*owner, tools).await,
        )?),
        Command::Revoke { message, signature } => {
            let message = read_message(message)?;
            let response = services
                .registry
                .revoke_signed(&message, signature)
                .await
                .map_err(ServiceError::from)?;
            Ok(serde_json::to_value(response)?)
        }
        Command::Issue { message, signature } => {
            let message = read_message(message)?;
            let issued = services
                .issuer
                .issue(&message, signature)
                .await
                .map_err(ServiceError::from)?;
            Ok(json!({
                "token": issued.token(),
                "commitment": issued.commitment,
                "claim": issued.claim,
            }))
        }
        Command::Authorize { token, tool } => {
            let header = token.as_ref().map(|token| format!("Bearer {token}"));
            services
                .gate
                .authorize_header(header.as_deref(), tool)
                .await
                .into_result()
                .map_err(ServiceError::from)?;
            Ok(json!({ "tool": tool, "allowed": true }))
        }
        Command::Tools => Ok(json!({
            "tools": services.issuer.catalog().iter().collect::<Vec<_>>(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use clap::CommandFactory;
    use warden_auth::{AccessPolicy, Capability, ErrorCode};

    fn services(policy: AccessPolicy, enabled: bool) -> Services {
        let mut config = Config::default();
        config.policy.mode = policy;
        config.ledger.enabled = enabled;
        config.ledger.contract_address = Some(
            "0x8626f6940e2eb28930efb4cef49b2d1f2c9c1199".parse().unwrap(),
        );
        config.tools = vec![
            Capability::new("search_web", "Search the web"),
            Capability::new("query_graph", "Run a graph query"),
        ];
        Services::build(&config, true).unwrap()
    }

    fn code(error: &anyhow::Error) -> Option<ErrorCode> {
        error.downcast_ref::<ServiceError>().map(|error| error.code)
    }

    #[test]
    fn it_has_a_consistent_command_definition() {
        WardenCli::command().debug_assert();
    }

    #[test]
    fn it_parses_subcommands() {
        let cli = WardenCli::try_parse_from([
            "warden",
            "--config",
            "custom.toml",
            "verify",
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "search_web",
            "query_graph",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        let Command::Verify { tools, .. } = cli.command else {
            panic!("expected verify");
        };
        assert_eq!(tools, ["search_web", "query_graph"]);

        assert!(WardenCli::try_parse_from(["warden", "status", "0x1234"]).is_err());
    }

    #[tokio::test]
    async fn it_prints_commitments_in_hex() {
        let services = services(AccessPolicy::Production, true);
        let out = execute(
            &Command::Commit {
                tools: vec!["search_web".into()],
            },
            &services,
        )
        .await
        .unwrap();
        assert_eq!(
            out["commitment"],
            json!(commit(&["search_web"]).to_string())
        );
    }

    #[tokio::test]
    async fn it_reports_no_session_for_a_fresh_owner() {
        let services = services(AccessPolicy::Production, true);
        let out = execute(&Command::Status { owner: Address::ZERO }, &services)
            .await
            .unwrap();
        assert_eq!(out["onChain"], json!(true));
        assert!(out.get("session").is_none());
        assert!(out["contractAddress"].is_string());
    }

    #[tokio::test]
    async fn it_refuses_missing_claims_in_production() {
        let services = services(AccessPolicy::Production, true);
        let error = execute(
            &Command::Authorize {
                token: None,
                tool: "search_web".into(),
            },
            &services,
        )
        .await
        .unwrap_err();
        assert_eq!(code(&error), Some(ErrorCode::MissingClaim));

        let error = execute(
            &Command::Authorize {
                token: Some("not base64!".into()),
                tool: "search_web".into(),
            },
            &services,
        )
        .await
        .unwrap_err();
        assert_eq!(code(&error), Some(ErrorCode::MalformedClaim));
    }

    #[tokio::test]
    async fn it_admits_missing_claims_in_development() {
        let services = services(AccessPolicy::Development, false);
        let out = execute(
            &Command::Authorize {
                token: None,
                tool: "search_web".into(),
            },
            &services,
        )
        .await
        .unwrap();
        assert_eq!(out["allowed"], json!(true));
    }

    #[tokio::test]
    async fn it_fails_provisioning_without_a_ledger() {
        let services = services(AccessPolicy::Development, false);
        let error = execute(&Command::Provision, &services).await.unwrap_err();
        assert_eq!(code(&error), Some(ErrorCode::LedgerUnavailable));
    }

    #[tokio::test]
    async fn it_lists_tools_in_catalog_order() {
        let services = services(AccessPolicy::Production, true);
        let out = execute(&Command::Tools, &services).await.unwrap();
        assert_eq!(out["tools"][0]["name"], json!("search_web"));
        assert_eq!(out["tools"][1]["name"], json!("query_graph"));
    }
}
