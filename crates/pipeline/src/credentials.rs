use std::env;

use gatebell_core::PipelineQueryError;
use secrecy::SecretString;
use thiserror::Error;

pub const ACCESS_KEY_ID_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("`{0}` is not set")]
    Missing(&'static str),
}

impl From<CredentialsError> for PipelineQueryError {
    fn from(value: CredentialsError) -> Self {
        Self::Credentials(value.to_string())
    }
}

/// Static credentials as provided to a Lambda execution environment.
#[derive(Clone, Debug)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub session_token: Option<SecretString>,
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
            session_token: session_token.map(SecretString::from),
        }
    }

    pub fn from_env() -> Result<Self, CredentialsError> {
        let access_key_id =
            read_env(ACCESS_KEY_ID_ENV).ok_or(CredentialsError::Missing(ACCESS_KEY_ID_ENV))?;
        let secret_access_key = read_env(SECRET_ACCESS_KEY_ENV)
            .ok_or(CredentialsError::Missing(SECRET_ACCESS_KEY_ENV))?;

        Ok(Self::new(access_key_id, secret_access_key, read_env(SESSION_TOKEN_ENV)))
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;

    use super::{AwsCredentials, CredentialsError};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const VARS: [&str; 3] = ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "AWS_SESSION_TOKEN"];

    fn clear_vars() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn reads_lambda_style_credentials() {
        let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env lock");
        clear_vars();
        env::set_var("AWS_ACCESS_KEY_ID", "ASIAEXAMPLE");
        env::set_var("AWS_SECRET_ACCESS_KEY", "secret");
        env::set_var("AWS_SESSION_TOKEN", "session");

        let credentials = AwsCredentials::from_env();
        clear_vars();

        let credentials = credentials.expect("credentials should load");
        assert_eq!(credentials.access_key_id, "ASIAEXAMPLE");
        assert_eq!(credentials.secret_access_key.expose_secret(), "secret");
        assert_eq!(
            credentials.session_token.as_ref().map(|token| token.expose_secret().to_owned()),
            Some("session".to_owned())
        );
        assert!(!format!("{credentials:?}").contains("secret\""));
    }

    #[test]
    fn missing_secret_is_reported_by_name() {
        let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env lock");
        clear_vars();
        env::set_var("AWS_ACCESS_KEY_ID", "ASIAEXAMPLE");

        let result = AwsCredentials::from_env();
        clear_vars();

        assert_eq!(result.err(), Some(CredentialsError::Missing("AWS_SECRET_ACCESS_KEY")));
    }
}
