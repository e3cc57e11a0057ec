//! Shared-secret authorization for privileged actions.
//!
//! A single admin token comes from the `[auth]` config section. Without a
//! configured token every privileged action is refused.

use crate::domain::error::PicklabError;
use crate::ports::auth_port::AuthPort;
use crate::ports::config_port::ConfigPort;

#[derive(Clone)]
pub struct SharedSecretAuth {
    admin_token: Option<String>,
}

impl SharedSecretAuth {
    pub fn new(admin_token: Option<String>) -> Self {
        Self {
            admin_token: admin_token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn from_config(config: &dyn ConfigPort) -> Self {
        Self::new(config.get_string("auth", "admin_token"))
    }
}

/// Compares every byte so the time taken does not depend on where the
/// first mismatch is.
fn tokens_match(expected: &str, given: &str) -> bool {
    expected.len() == given.len()
        && expected
            .bytes()
            .zip(given.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

impl AuthPort for SharedSecretAuth {
    fn authorize(&self, action: &str, credential: Option<&str>) -> Result<(), PicklabError> {
        match (&self.admin_token, credential) {
            (Some(expected), Some(given)) if tokens_match(expected, given) => Ok(()),
            _ => Err(PicklabError::Unauthorized {
                action: action.to_string(),
            }),
        }
    }
}
