//! HTTP clients for the batched peer lookups.

use agora_core::model::{Media, UserSummary};
use agora_core::peers::{MediaLookup, PeerError, UserLookup};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<UserSummary>,
}

#[derive(Deserialize)]
struct MediaResponse {
    #[serde(default)]
    results: Vec<Media>,
}

/// `GET {base}{path}?ids=a,b,c`, decoded as `T`.
async fn fetch<T: DeserializeOwned>(
    client: &Client,
    peer: &str,
    url: String,
    ids: &[String],
) -> Result<T, PeerError> {
    let response = client
        .get(url)
        .query(&[("ids", ids.join(","))])
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                PeerError::Timeout {
                    peer: peer.to_string(),
                }
            } else {
                PeerError::Unavailable {
                    peer: peer.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(PeerError::Unavailable {
            peer: peer.to_string(),
            reason: format!("status {status}"),
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| PeerError::InvalidResponse {
            peer: peer.to_string(),
            reason: e.to_string(),
        })
}

fn client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

/// [`UserLookup`] against identity-service's `get-many-users`.
#[derive(Clone)]
pub struct HttpUserLookup {
    client: Client,
    base_url: String,
}

impl HttpUserLookup {
    /// Client for the identity service at `base_url`.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (TLS backend unavailable).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl UserLookup for HttpUserLookup {
    fn users_by_ids<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, UserSummary>, PeerError>> {
        Box::pin(async move {
            let url = format!("{}/api/auth/get-many-users", self.base_url);
            let body: UsersResponse = fetch(&self.client, "identity-service", url, ids).await?;
            Ok(body
                .users
                .into_iter()
                .map(|user| (user.id.clone(), user))
                .collect())
        })
    }
}

/// [`MediaLookup`] against media-service's `get-media`.
#[derive(Clone)]
pub struct HttpMediaLookup {
    client: Client,
    base_url: String,
}

impl HttpMediaLookup {
    /// Client for the media service at `base_url`.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (TLS backend unavailable).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl MediaLookup for HttpMediaLookup {
    fn media_by_ids<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, Media>, PeerError>> {
        Box::pin(async move {
            let url = format!("{}/api/media/get-media", self.base_url);
            let body: MediaResponse = fetch(&self.client, "media-service", url, ids).await?;
            Ok(body
                .results
                .into_iter()
                .map(|media| (media.id.clone(), media))
                .collect())
        })
    }
}
