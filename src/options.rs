//! Connection and subscription options.

use crate::error::{RelayLinkError, Result};
use crate::frame::ConnectInfo;
use crate::payload::PayloadMode;

/// Default maximum payload size (1 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 1_048_576;

/// Configuration consumed when establishing a connection.
///
/// Auth fields are optional and mutually exclusive: user/pass, a bare token,
/// or a signed JWT. Setting more than one scheme fails validation with
/// [`RelayLinkError::BadAuthentication`] before any I/O happens.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Display name reported to the broker.
    pub name: Option<String>,
    /// Ask the broker to acknowledge every command with `+OK`.
    pub verbose: bool,
    /// Ask the broker for stricter protocol checking.
    pub pedantic: bool,
    /// Suppress delivery of the client's own publishes back to itself.
    pub no_echo: bool,
    /// Maximum outbound payload size in bytes.
    pub max_payload: usize,
    /// Username for user/pass authentication.
    pub user: Option<String>,
    /// Password for user/pass authentication.
    pub pass: Option<String>,
    /// Bare authentication token.
    pub token: Option<String>,
    /// Signed JWT credential.
    pub jwt: Option<String>,
    /// Payload-encoding discipline applied by the facade.
    pub payload_mode: PayloadMode,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            name: None,
            verbose: false,
            pedantic: false,
            no_echo: false,
            max_payload: DEFAULT_MAX_PAYLOAD,
            user: None,
            pass: None,
            token: None,
            jwt: None,
            payload_mode: PayloadMode::default(),
        }
    }
}

impl ConnectOptions {
    /// Validate the auth fields and collapse them into a single credential.
    pub fn resolve_auth(&self) -> Result<AuthCredential> {
        let has_user_pass = self.user.is_some() || self.pass.is_some();
        let has_token = self.token.is_some();
        let has_jwt = self.jwt.is_some();

        let schemes = usize::from(has_user_pass) + usize::from(has_token) + usize::from(has_jwt);
        if schemes > 1 {
            return Err(RelayLinkError::BadAuthentication(
                "user/pass, token, and jwt are mutually exclusive".to_string(),
            ));
        }

        if has_user_pass {
            return match (&self.user, &self.pass) {
                (Some(user), Some(pass)) => Ok(AuthCredential::UserPass {
                    user: user.clone(),
                    pass: pass.clone(),
                }),
                _ => Err(RelayLinkError::BadAuthentication(
                    "user and pass must be provided together".to_string(),
                )),
            };
        }
        if let Some(token) = &self.token {
            return Ok(AuthCredential::Token(token.clone()));
        }
        if let Some(jwt) = &self.jwt {
            return Ok(AuthCredential::Jwt(jwt.clone()));
        }
        Ok(AuthCredential::None)
    }

    /// Build the CONNECT handshake frame contents from these options.
    pub(crate) fn connect_info(&self) -> Result<ConnectInfo> {
        let auth = self.resolve_auth()?;
        let (user, pass, auth_token, jwt) = match auth {
            AuthCredential::UserPass { user, pass } => (Some(user), Some(pass), None, None),
            AuthCredential::Token(token) => (None, None, Some(token), None),
            AuthCredential::Jwt(jwt) => (None, None, None, Some(jwt)),
            AuthCredential::None => (None, None, None, None),
        };
        Ok(ConnectInfo {
            verbose: self.verbose,
            pedantic: self.pedantic,
            echo: !self.no_echo,
            lang: "rust".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol: 1,
            name: self.name.clone(),
            user,
            pass,
            auth_token,
            jwt,
        })
    }
}

/// A validated authentication credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCredential {
    /// No authentication.
    None,
    /// Username and password.
    UserPass { user: String, pass: String },
    /// Bare token.
    Token(String),
    /// Signed JWT.
    Jwt(String),
}

/// Per-subscription options.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Queue group for load-balanced delivery across members.
    pub queue_group: Option<String>,
    /// Automatically unsubscribe after this many deliveries.
    pub max_deliveries: Option<u64>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a queue group.
    pub fn queue_group(mut self, group: impl Into<String>) -> Self {
        self.queue_group = Some(group.into());
        self
    }

    /// Unsubscribe automatically after `max` deliveries.
    pub fn max_deliveries(mut self, max: u64) -> Self {
        self.max_deliveries = Some(max);
        self
    }
}
