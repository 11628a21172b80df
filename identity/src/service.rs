//! Account registration, login and refresh-token rotation.

use crate::password::{PasswordError, PasswordHasher};
use agora_core::environment::{Clock, IdGenerator};
use agora_core::model::{RefreshToken, User, UserSummary};
use agora_core::store::{RefreshTokenStore, StoreError, UserStore};
use agora_core::token::{TokenError, TokenSigner};
use chrono::Duration;
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

pub use agora_core::peers::MAX_LOOKUP_IDS;

/// Errors returned by [`IdentityService`].
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Input rejected before touching the store
    #[error("{0}")]
    Validation(String),

    /// Username or email already taken
    #[error("User already exists")]
    Conflict,

    /// Unknown email or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Refresh token unknown, already used or expired
    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Access token could not be signed
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Password hashing failed
    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Result type for identity operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Registration input.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct Registration {
    /// Display handle, 3 to 50 characters
    pub username: String,
    /// Email address, stored lowercased
    pub email: String,
    /// Plain password, at least 6 characters
    pub password: String,
}

/// Credentials for login.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// Email address
    pub email: String,
    /// Plain password
    pub password: String,
}

/// An issued token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Subject
    pub user_id: String,
    /// Short-lived JWT
    pub access_token: String,
    /// Single-use opaque refresh token
    pub refresh_token: String,
}

/// Identity operations over injected stores.
#[derive(Clone)]
pub struct IdentityService {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    hasher: Arc<dyn PasswordHasher>,
    signer: TokenSigner,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    refresh_ttl: Duration,
}

impl IdentityService {
    /// Build the service.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        hasher: Arc<dyn PasswordHasher>,
        signer: TokenSigner,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            hasher,
            signer,
            clock,
            ids,
            refresh_ttl: Duration::days(7),
        }
    }

    /// Override the refresh token lifetime (default 7 days).
    #[must_use]
    pub const fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// Refresh token lifetime.
    #[must_use]
    pub const fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Create an account and open a session for it.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] for bad input, [`ServiceError::Conflict`]
    /// when the username or email is taken.
    pub async fn register(&self, registration: Registration) -> Result<Session> {
        let username = registration.username.trim().to_string();
        let email = registration.email.trim().to_lowercase();
        validate_registration(&username, &email, &registration.password)?;

        let password_hash = self.hash_password(registration.password).await?;
        let user = User {
            id: self.ids.next_id(),
            username,
            email,
            password_hash,
            created_at: self.clock.now(),
        };

        match self.users.insert(&user).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(field)) => {
                tracing::warn!(field = %field, "Registration rejected, user already exists");
                return Err(ServiceError::Conflict);
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        self.open_session(&user).await
    }

    /// Check credentials and open a session.
    ///
    /// # Errors
    ///
    /// [`ServiceError::InvalidCredentials`] for an unknown email or wrong
    /// password; the two are indistinguishable to the caller.
    pub async fn login(&self, credentials: Credentials) -> Result<Session> {
        let email = credentials.email.trim().to_lowercase();
        if email.is_empty() || credentials.password.is_empty() {
            return Err(ServiceError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let Some(user) = self.users.find_by_email(&email).await? else {
            tracing::warn!("Login failed, no user with this email");
            return Err(ServiceError::InvalidCredentials);
        };

        if !self.verify_password(credentials.password, user.password_hash.clone()).await {
            tracing::warn!(user_id = %user.id, "Login failed, wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        tracing::info!(user_id = %user.id, "User logged in");
        self.open_session(&user).await
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// consumed whether or not the exchange succeeds.
    ///
    /// # Errors
    ///
    /// [`ServiceError::InvalidRefreshToken`] if the token is unknown, already
    /// used, expired or belongs to a deleted user.
    pub async fn refresh(&self, token: &str) -> Result<Session> {
        let Some(stored) = self.refresh_tokens.consume(token).await? else {
            tracing::warn!("Refresh rejected, token unknown or already used");
            return Err(ServiceError::InvalidRefreshToken);
        };

        if stored.is_expired(self.clock.now()) {
            tracing::warn!(user_id = %stored.user_id, "Refresh rejected, token expired");
            return Err(ServiceError::InvalidRefreshToken);
        }

        let Some(user) = self.users.find_by_id(&stored.user_id).await? else {
            tracing::warn!(user_id = %stored.user_id, "Refresh rejected, user no longer exists");
            return Err(ServiceError::InvalidRefreshToken);
        };

        tracing::info!(user_id = %user.id, "Refresh token rotated");
        self.open_session(&user).await
    }

    /// Revoke a refresh token. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub async fn logout(&self, token: &str) -> Result<bool> {
        let revoked = self.refresh_tokens.consume(token).await?.is_some();
        tracing::info!(revoked, "Logout");
        Ok(revoked)
    }

    /// Batched public lookup. Unknown ids are omitted; duplicates and blanks
    /// are ignored.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] for more than [`MAX_LOOKUP_IDS`] ids.
    pub async fn users_by_ids(&self, ids: &[String]) -> Result<Vec<UserSummary>> {
        let unique: BTreeSet<&str> = ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }
        if unique.len() > MAX_LOOKUP_IDS {
            return Err(ServiceError::Validation(format!(
                "At most {MAX_LOOKUP_IDS} ids per lookup"
            )));
        }

        let ids: Vec<String> = unique.into_iter().map(ToString::to_string).collect();
        let users = self.users.find_many(&ids).await?;
        Ok(users.iter().map(UserSummary::from).collect())
    }

    /// Drop expired refresh tokens.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub async fn purge_expired_tokens(&self) -> Result<u64> {
        let purged = self.refresh_tokens.purge_expired(self.clock.now()).await?;
        if purged > 0 {
            tracing::info!(purged, "Expired refresh tokens purged");
        }
        Ok(purged)
    }

    async fn open_session(&self, user: &User) -> Result<Session> {
        let now = self.clock.now();
        let access_token = self.signer.issue(&user.id, &user.username, now)?;

        let refresh = RefreshToken {
            token: generate_refresh_token(),
            user_id: user.id.clone(),
            expires_at: now + self.refresh_ttl,
        };
        self.refresh_tokens.insert(&refresh).await?;

        Ok(Session {
            user_id: user.id.clone(),
            access_token,
            refresh_token: refresh.token,
        })
    }

    async fn hash_password(&self, password: String) -> Result<String> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordError(e.to_string()))?
            .map_err(ServiceError::from)
    }

    async fn verify_password(&self, password: String, hash: String) -> bool {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .unwrap_or(false)
    }
}

/// 40 random bytes, hex encoded.
fn generate_refresh_token() -> String {
    let mut bytes = [0_u8; 40];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn validate_registration(username: &str, email: &str, password: &str) -> Result<()> {
    let length = username.chars().count();
    if !(3..=50).contains(&length) {
        return Err(ServiceError::Validation(
            "Username must be between 3 and 50 characters".to_string(),
        ));
    }
    if !is_valid_email(email) {
        return Err(ServiceError::Validation("Email must be valid".to_string()));
    }
    if password.chars().count() < 6 {
        return Err(ServiceError::Validation(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use agora_testing::{
        InMemoryRefreshTokenStore, InMemoryUserStore, SequentialIdGenerator, test_clock,
    };

    /// Fast stand-in so tests don't pay for Argon2.
    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, password: &str) -> std::result::Result<String, PasswordError> {
            Ok(format!("plain:{password}"))
        }

        fn verify(&self, password: &str, hash: &str) -> bool {
            hash == format!("plain:{password}")
        }
    }

    fn service() -> (IdentityService, InMemoryUserStore, InMemoryRefreshTokenStore) {
        let users = InMemoryUserStore::new();
        let tokens = InMemoryRefreshTokenStore::new();
        let service = IdentityService::new(
            Arc::new(users.clone()),
            Arc::new(tokens.clone()),
            Arc::new(PlainHasher),
            TokenSigner::new("test-secret"),
            Arc::new(test_clock()),
            Arc::new(SequentialIdGenerator::new("user")),
        );
        (service, users, tokens)
    }

    fn alice() -> Registration {
        Registration {
            username: "alice".to_string(),
            email: "Alice@Example.com".to_string(),
            password: "secret1".to_string(),
        }
    }

    #[tokio::test]
    async fn register_opens_session_and_lowercases_email() {
        let (service, users, tokens) = service();
        let session = service.register(alice()).await.unwrap();

        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.refresh_token.len(), 80);
        assert!(tokens.contains(&session.refresh_token));

        let stored = users.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "plain:secret1");
    }

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts() {
        let (service, _, _) = service();
        service.register(alice()).await.unwrap();

        let same_email = Registration {
            username: "alice2".to_string(),
            ..alice()
        };
        assert!(matches!(service.register(same_email).await, Err(ServiceError::Conflict)));

        let same_name = Registration {
            email: "other@example.com".to_string(),
            ..alice()
        };
        assert!(matches!(service.register(same_name).await, Err(ServiceError::Conflict)));
    }

    #[tokio::test]
    async fn registration_is_validated_before_any_write() {
        let (service, users, _) = service();
        let cases = [
            Registration { username: "al".to_string(), ..alice() },
            Registration { email: "not-an-email".to_string(), ..alice() },
            Registration { password: "12345".to_string(), ..alice() },
        ];
        for case in cases {
            assert!(matches!(service.register(case).await, Err(ServiceError::Validation(_))));
        }
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn login_rejects_unknown_email_and_wrong_password_alike() {
        let (service, _, _) = service();
        service.register(alice()).await.unwrap();

        let wrong_password = Credentials {
            email: "alice@example.com".to_string(),
            password: "nope123".to_string(),
        };
        let unknown = Credentials {
            email: "bob@example.com".to_string(),
            password: "secret1".to_string(),
        };
        assert!(matches!(service.login(wrong_password).await, Err(ServiceError::InvalidCredentials)));
        assert!(matches!(service.login(unknown).await, Err(ServiceError::InvalidCredentials)));

        let ok = Credentials {
            email: "ALICE@example.com".to_string(),
            password: "secret1".to_string(),
        };
        assert_eq!(service.login(ok).await.unwrap().user_id, "user-1");
    }

    #[tokio::test]
    async fn refresh_token_is_single_use() {
        let (service, _, tokens) = service();
        let session = service.register(alice()).await.unwrap();

        let rotated = service.refresh(&session.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, session.refresh_token);
        assert!(!tokens.contains(&session.refresh_token));
        assert!(tokens.contains(&rotated.refresh_token));

        assert!(matches!(
            service.refresh(&session.refresh_token).await,
            Err(ServiceError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn expired_refresh_token_is_rejected() {
        let (service, _, _) = service();
        let service = service.with_refresh_ttl(Duration::zero());
        let session = service.register(alice()).await.unwrap();

        assert!(matches!(
            service.refresh(&session.refresh_token).await,
            Err(ServiceError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn logout_revokes_token() {
        let (service, _, tokens) = service();
        let session = service.register(alice()).await.unwrap();

        assert!(service.logout(&session.refresh_token).await.unwrap());
        assert!(!service.logout(&session.refresh_token).await.unwrap());
        assert!(tokens.is_empty());
    }

    #[tokio::test]
    async fn users_by_ids_skips_unknown_and_duplicates() {
        let (service, _, _) = service();
        service.register(alice()).await.unwrap();

        let ids = vec!["user-1".to_string(), "user-1".to_string(), "ghost".to_string(), " ".to_string()];
        let users = service.users_by_ids(&ids).await.unwrap();
        assert_eq!(users, vec![UserSummary { id: "user-1".to_string(), username: "alice".to_string() }]);
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a b@c.io"));
        assert!(!is_valid_email("a@b@c.io"));
    }
}
