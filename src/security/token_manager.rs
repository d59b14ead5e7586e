//! Secure token manager with memory-safe handling and masking capabilities
//!
//! This module resolves one registry token per enabled target from the
//! environment snapshot, using the `secrecy` crate to prevent accidental
//! token exposure in logs or memory dumps.

use crate::core::env::EnvSnapshot;
use crate::core::error::PublishError;
use crate::core::model::ReleaseConfig;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::collections::HashMap;

/// Whether a target's token variable is set, for plan output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub target: String,
    pub variable: String,
    pub present: bool,
}

/// Resolved registry tokens, keyed by target name
///
/// # Examples
///
/// ```
/// use publish_orchestrator::security::SecureTokenManager;
///
/// let manager = SecureTokenManager::default();
/// assert_eq!(manager.mask_token("abcdef123456"), "abc...456");
/// assert_eq!(manager.mask_token("short"), "****");
/// ```
#[derive(Default)]
pub struct SecureTokenManager {
    tokens: HashMap<String, SecretString>,
}

impl SecureTokenManager {
    /// Resolve the token of every enabled target
    ///
    /// Every missing variable is reported on the console; the first one is
    /// returned as `MissingCredential`. Nothing else happens on failure.
    pub fn resolve(config: &ReleaseConfig, env: &EnvSnapshot) -> Result<Self, PublishError> {
        let mut tokens = HashMap::new();
        let mut first_missing = None;

        for target in config.enabled_targets() {
            match env.get(&target.token_env) {
                Some(value) => {
                    tokens.insert(
                        target.name.clone(),
                        SecretString::new(value.to_string().into()),
                    );
                }
                None => {
                    eprintln!(
                        "❌ [{}] missing credential: {} is not set",
                        target.name, target.token_env
                    );
                    tracing::error!(target_name = %target.name, variable = %target.token_env, "missing credential");
                    first_missing.get_or_insert_with(|| PublishError::MissingCredential {
                        target: target.name.clone(),
                        variable: target.token_env.clone(),
                    });
                }
            }
        }

        match first_missing {
            Some(err) => Err(err),
            None => Ok(Self { tokens }),
        }
    }

    /// Report which enabled targets have their token set, without resolving
    pub fn status(config: &ReleaseConfig, env: &EnvSnapshot) -> Vec<CredentialStatus> {
        config
            .enabled_targets()
            .map(|target| CredentialStatus {
                target: target.name.clone(),
                variable: target.token_env.clone(),
                present: env.contains(&target.token_env),
            })
            .collect()
    }

    /// Token of a target
    pub fn token_for(&self, target: &str) -> Option<&SecretString> {
        self.tokens.get(target)
    }

    /// Masks a token for safe logging
    ///
    /// Shows only the first 3 and last 3 characters for identification purposes.
    /// Tokens shorter than 10 characters are fully masked as "****".
    pub fn mask_token(&self, token: &str) -> String {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() < 10 {
            return "****".to_string();
        }

        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 3..].iter().collect();
        format!("{}...{}", prefix, suffix)
    }

    /// Masks all resolved tokens in a string
    pub fn mask_tokens_in_string(&self, text: &str) -> String {
        let mut masked = text.to_string();

        for token in self.tokens.values() {
            let token_str = token.expose_secret();
            if token_str.is_empty() {
                continue;
            }
            if let Ok(regex) = Regex::new(&regex::escape(token_str)) {
                let masked_token = self.mask_token(token_str);
                masked = regex
                    .replace_all(&masked, masked_token.as_str())
                    .into_owned();
            }
        }

        masked
    }

    /// Number of resolved tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
