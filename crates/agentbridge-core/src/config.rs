//! Agent runtime configuration.
//!
//! Agents are deployed into containers and serverless functions, so every
//! setting comes from an environment variable. [`AgentConfig::from_lookup`]
//! takes the lookup as a closure so tests never touch the process environment.

use crate::agent::LoopConfig;
use crate::error::{AgentError, AgentResult};
use agentbridge_auth::{AwsCredentials, CredentialSettings, OAuthClientConfig};
use agentbridge_provider::bedrock::{BedrockConfig, DEFAULT_MODEL_ID};

/// Upper bound on model calls in one agent run.
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

/// Tool server used when running everything on one machine.
pub const LOCAL_MCP_URL: &str = "http://localhost:8002/mcp/";

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// How the tool client reaches the remote engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolTransport {
    /// Direct MCP endpoint, JSON or SSE responses.
    Streamable,
    /// Serverless function URL answering with an invocation envelope.
    Invocation,
}

/// Settings for one agent process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Remote MCP endpoint or function URL (`MCP_ENDPOINT_URL`).
    pub endpoint_url: Option<String>,
    /// Remote agent runtime ARN (`AGENT_RUNTIME_ARN`).
    pub runtime_arn: Option<String>,
    pub region: String,
    /// SigV4 service override (`SIGNING_SERVICE`).
    pub signing_service: Option<String>,
    pub oauth: Option<OAuthClientConfig>,
    pub aws: Option<AwsCredentials>,
    /// Talk to a local tool server without credentials.
    pub local_mode: bool,
    pub model_id: String,
    pub system_prompt: Option<String>,
    pub max_iterations: usize,
    /// Timeout for each outbound tool request.
    pub request_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            runtime_arn: None,
            region: DEFAULT_REGION.to_string(),
            signing_service: None,
            oauth: None,
            aws: None,
            local_mode: false,
            model_id: DEFAULT_MODEL_ID.to_string(),
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl AgentConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> AgentResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> AgentResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_iterations = match get("AGENT_MAX_ITERATIONS") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) | Err(_) => {
                    return Err(AgentError::config(format!(
                        "AGENT_MAX_ITERATIONS must be a positive integer, got {raw:?}"
                    )))
                }
                Ok(n) => n,
            },
            None => defaults.max_iterations,
        };

        let aws = match (get("AWS_ACCESS_KEY_ID"), get("AWS_SECRET_ACCESS_KEY")) {
            (Some(key), Some(secret)) => {
                let creds = AwsCredentials::new(key, secret);
                Some(match get("AWS_SESSION_TOKEN") {
                    Some(token) => creds.with_session_token(token),
                    None => creds,
                })
            }
            _ => None,
        };

        let oauth = OAuthClientConfig::from_parts(
            get("OAUTH_CLIENT_ID"),
            get("OAUTH_CLIENT_SECRET"),
            get("OAUTH_ENDPOINT"),
        )
        .map(|config| match get("OAUTH_SCOPE") {
            Some(scope) => config.with_scope(scope),
            None => config,
        });

        Ok(Self {
            endpoint_url: get("MCP_ENDPOINT_URL"),
            runtime_arn: get("AGENT_RUNTIME_ARN"),
            region: get("AWS_REGION").unwrap_or(defaults.region),
            signing_service: get("SIGNING_SERVICE"),
            oauth,
            aws,
            local_mode: get("AGENT_LOCAL_MODE").is_some_and(|v| parse_flag(&v)),
            model_id: get("MODEL_ID").unwrap_or(defaults.model_id),
            system_prompt: get("AGENT_SYSTEM_PROMPT"),
            max_iterations,
            request_timeout_secs: defaults.request_timeout_secs,
        })
    }

    /// Resolve the tool endpoint URL and the transport that reaches it.
    pub fn tool_endpoint(&self) -> AgentResult<(String, ToolTransport)> {
        if self.local_mode {
            let url = self
                .endpoint_url
                .clone()
                .unwrap_or_else(|| LOCAL_MCP_URL.to_string());
            return Ok((url, ToolTransport::Streamable));
        }

        if let Some(ref arn) = self.runtime_arn {
            return Ok((agentcore_url(&self.region, arn), ToolTransport::Streamable));
        }

        match self.endpoint_url {
            Some(ref url) if self.oauth.is_some() => Ok((url.clone(), ToolTransport::Streamable)),
            Some(ref url) => Ok((url.clone(), ToolTransport::Invocation)),
            None => Err(AgentError::config(
                "one of MCP_ENDPOINT_URL, AGENT_RUNTIME_ARN or AGENT_LOCAL_MODE must be set",
            )),
        }
    }

    /// Inputs for picking the outbound credential strategy.
    pub fn credential_settings(&self) -> CredentialSettings {
        let service = self.signing_service.clone().unwrap_or_else(|| {
            if self.runtime_arn.is_some() {
                "bedrock-agentcore".to_string()
            } else {
                "lambda".to_string()
            }
        });

        CredentialSettings {
            local_mode: self.local_mode,
            oauth: self.oauth.clone(),
            aws: self.aws.clone(),
            region: self.region.clone(),
            service,
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            system: self.system_prompt.clone(),
            max_iterations: self.max_iterations,
            ..LoopConfig::default()
        }
    }

    /// Bedrock settings for the agent's own model.
    pub fn bedrock_config(&self) -> BedrockConfig {
        let config = BedrockConfig::new(self.region.clone(), self.model_id.clone());
        match self.aws {
            Some(ref creds) => config.with_credentials(creds.clone()),
            None => config,
        }
    }
}

/// Invocation URL of a hosted agent runtime.
pub fn agentcore_url(region: &str, runtime_arn: &str) -> String {
    format!(
        "https://bedrock-agentcore.{region}.amazonaws.com/runtimes/{}/invocations?qualifier=DEFAULT",
        urlencoding::encode(runtime_arn)
    )
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> AgentResult<AgentConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.model_id, "amazon.nova-micro-v1:0");
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert!(config.oauth.is_none());
        assert!(!config.local_mode);
        assert!(config.tool_endpoint().is_err());
    }

    #[test]
    fn test_agentcore_url_escapes_arn() {
        let url = agentcore_url(
            "us-west-2",
            "arn:aws:bedrock-agentcore:us-west-2:123456789012:runtime/hr_agent-abc",
        );
        assert_eq!(
            url,
            "https://bedrock-agentcore.us-west-2.amazonaws.com/runtimes/\
             arn%3Aaws%3Abedrock-agentcore%3Aus-west-2%3A123456789012%3Aruntime%2Fhr_agent-abc\
             /invocations?qualifier=DEFAULT"
        );
    }

    #[test]
    fn test_oauth_requires_all_three() {
        let config = config_from(&[("OAUTH_CLIENT_ID", "id"), ("OAUTH_ENDPOINT", "https://x")])
            .unwrap();
        assert!(config.oauth.is_none());

        let config = config_from(&[
            ("OAUTH_CLIENT_ID", "id"),
            ("OAUTH_CLIENT_SECRET", "secret"),
            ("OAUTH_ENDPOINT", "https://auth.example.com/oauth2/token"),
            ("OAUTH_SCOPE", "hr/read"),
        ])
        .unwrap();
        let oauth = config.oauth.unwrap();
        assert_eq!(oauth.client_id, "id");
        assert_eq!(oauth.scope.as_deref(), Some("hr/read"));
    }

    #[test]
    fn test_endpoint_resolution() {
        let local = config_from(&[("AGENT_LOCAL_MODE", "true")]).unwrap();
        assert_eq!(
            local.tool_endpoint().unwrap(),
            (LOCAL_MCP_URL.to_string(), ToolTransport::Streamable)
        );

        let lambda = config_from(&[("MCP_ENDPOINT_URL", "https://fn.lambda-url.aws/")]).unwrap();
        assert_eq!(lambda.tool_endpoint().unwrap().1, ToolTransport::Invocation);
        assert_eq!(lambda.credential_settings().service, "lambda");

        let runtime = config_from(&[("AGENT_RUNTIME_ARN", "arn:aws:x:us-east-1:1:runtime/r")])
            .unwrap();
        let (url, transport) = runtime.tool_endpoint().unwrap();
        assert!(url.starts_with("https://bedrock-agentcore.us-east-1.amazonaws.com/runtimes/"));
        assert_eq!(transport, ToolTransport::Streamable);
        assert_eq!(runtime.credential_settings().service, "bedrock-agentcore");
    }

    #[test]
    fn test_max_iterations() {
        let config = config_from(&[("AGENT_MAX_ITERATIONS", "3")]).unwrap();
        assert_eq!(config.loop_config().max_iterations, 3);

        assert!(matches!(
            config_from(&[("AGENT_MAX_ITERATIONS", "0")]),
            Err(AgentError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("AGENT_MAX_ITERATIONS", "many")]),
            Err(AgentError::Config(_))
        ));
    }

    #[test]
    fn test_aws_credentials_and_empty_values() {
        let config = config_from(&[
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_SESSION_TOKEN", ""),
            ("MODEL_ID", "  "),
        ])
        .unwrap();
        let aws = config.aws.unwrap();
        assert_eq!(aws.access_key_id, "AKID");
        assert!(aws.session_token.is_none());
        assert_eq!(config.model_id, DEFAULT_MODEL_ID);
    }
}
