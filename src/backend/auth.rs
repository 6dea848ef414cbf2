use super::{RemoteError, RestClient};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

const TOKEN_PATH: &str = "auth/v1/token";

/// A signed-in user.
///
/// The access token is only exposed to the transport; `Debug` never prints it.
pub struct Session {
    access_token: SecretString,
    user_id: String,
    email: Option<String>,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub(super) fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl RestClient {
    /// Sign in with email and password (password grant).
    ///
    /// # Errors
    ///
    /// Rejected credentials (any 4xx) map to [`RemoteError::Auth`] carrying the
    /// backend's message; transport failures keep their own variants.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, RemoteError> {
        let mut url = self.url(TOKEN_PATH)?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let body = serde_json::json!({
            "email": email.trim(),
            "password": password.expose_secret(),
        });

        let bytes = self
            .execute(|| {
                self.http
                    .post(url.clone())
                    .header("apikey", self.anon_key.expose_secret())
                    .json(&body)
            })
            .await
            .map_err(|e| match e {
                RemoteError::Status { status, message } if (400..500).contains(&status) => {
                    RemoteError::Auth(message)
                }
                other => other,
            })?;

        let token: TokenResponse =
            serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))?;

        tracing::info!(user_id = %token.user.id, "Signed in");
        Ok(Session {
            access_token: SecretString::from(token.access_token),
            user_id: token.user.id,
            email: token.user.email,
        })
    }
}
