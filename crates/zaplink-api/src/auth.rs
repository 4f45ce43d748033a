use secrecy::SecretString;

/// Account credentials for the Zaptec cloud.
///
/// The cloud uses an OAuth2 password grant (`grant_type=password`), so
/// a plain username/password pair is the only strategy. Tokens are
/// valid for roughly a day; the client re-authenticates on demand when
/// a request comes back 401.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}
