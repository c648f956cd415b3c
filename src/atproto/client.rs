//! Remote social-graph boundary
//!
//! `SocialGraph` is everything the engine needs from the remote service.
//! `XrpcClient` implements it against a Bluesky PDS over XRPC.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use url::Url;

use crate::config::RemoteConfig;
use crate::data::{AccountRecord, RelationshipKind};
use crate::error::AppError;

const FOLLOW_COLLECTION: &str = "app.bsky.graph.follow";

/// One page of a relationship listing
#[derive(Debug, Clone, Default)]
pub struct RelationshipPage {
    pub accounts: Vec<AccountRecord>,
    /// Opaque cursor for the next page; `None` when the listing is complete
    pub cursor: Option<String>,
}

/// Operations the engine performs against the remote service
///
/// Timeout-class failures must surface as errors for which
/// [`AppError::is_timeout`] returns true.
#[allow(async_fn_in_trait)]
pub trait SocialGraph {
    /// List one page of an actor's followers or follows
    async fn list_relationships(
        &self,
        actor: &str,
        kind: RelationshipKind,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<RelationshipPage, AppError>;

    /// Follow `did`, returning the URI of the created follow record
    async fn follow(&self, did: &str) -> Result<String, AppError>;

    /// Find the URI of the operator's follow record for `did`, if any
    async fn resolve_follow_record(&self, did: &str) -> Result<Option<String>, AppError>;

    /// Delete a follow record
    async fn unfollow(&self, record_uri: &str) -> Result<(), AppError>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    did: String,
    handle: String,
    access_jwt: String,
    refresh_jwt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileView {
    did: String,
    handle: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl From<ProfileView> for AccountRecord {
    fn from(profile: ProfileView) -> Self {
        AccountRecord::new(profile.handle, profile.display_name.unwrap_or_default(), profile.did)
    }
}

#[derive(Debug, Deserialize)]
struct FollowersResponse {
    followers: Vec<ProfileView>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FollowsResponse {
    follows: Vec<ProfileView>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct ViewerState {
    #[serde(default)]
    following: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileDetailed {
    #[serde(default)]
    viewer: Option<ViewerState>,
}

#[derive(Debug, Deserialize, Default)]
struct XrpcErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// =============================================================================
// Record references
// =============================================================================

/// Parsed `at://<repo>/<collection>/<rkey>` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub repo: String,
    pub collection: String,
    pub rkey: String,
}

impl RecordRef {
    pub fn parse(uri: &str) -> Result<Self, AppError> {
        let rest = uri
            .strip_prefix("at://")
            .ok_or_else(|| AppError::Mutation(format!("not an at:// URI: {uri}")))?;
        let mut parts = rest.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(repo), Some(collection), Some(rkey))
                if !repo.is_empty() && !collection.is_empty() && !rkey.is_empty() =>
            {
                Ok(Self {
                    repo: repo.to_string(),
                    collection: collection.to_string(),
                    rkey: rkey.to_string(),
                })
            }
            _ => Err(AppError::Mutation(format!("malformed record URI: {uri}"))),
        }
    }
}

// =============================================================================
// XRPC client
// =============================================================================

/// Authenticated session state
#[derive(Debug, Clone)]
pub struct Session {
    pub did: String,
    pub handle: String,
    access_jwt: String,
    refresh_jwt: String,
}

impl From<SessionResponse> for Session {
    fn from(response: SessionResponse) -> Self {
        Self {
            did: response.did,
            handle: response.handle,
            access_jwt: response.access_jwt,
            refresh_jwt: response.refresh_jwt,
        }
    }
}

/// XRPC client bound to one logged-in account
pub struct XrpcClient {
    http_client: reqwest::Client,
    service_url: Url,
    session: RwLock<Session>,
}

fn map_send_error(nsid: &str, error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        AppError::Timeout(format!("{nsid}: {error}"))
    } else {
        AppError::HttpClient(error)
    }
}

fn endpoint(service_url: &Url, nsid: &str) -> Result<Url, AppError> {
    service_url
        .join(&format!("xrpc/{nsid}"))
        .map_err(|e| AppError::Config(format!("invalid XRPC endpoint for {nsid}: {e}")))
}

/// Turn an XRPC response into a value or a classified error
async fn decode_response<T: DeserializeOwned>(
    nsid: &str,
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();
    let body = response.bytes().await.map_err(|e| map_send_error(nsid, e))?;

    if status.is_success() {
        let body: &[u8] = if body.is_empty() { b"null" } else { &body };
        return serde_json::from_slice(body).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("{nsid}: unexpected response body: {e}"))
        });
    }

    if status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::GATEWAY_TIMEOUT
    {
        return Err(AppError::Timeout(format!("{nsid}: HTTP {status}")));
    }

    let error_body: XrpcErrorBody = serde_json::from_slice(&body).unwrap_or_default();
    let message = match (error_body.error, error_body.message) {
        (Some(error), Some(message)) => format!("{error}: {message}"),
        (Some(error), None) => error,
        (None, Some(message)) => message,
        (None, None) => format!("{nsid} returned HTTP {status}"),
    };

    Err(AppError::Remote {
        status: status.as_u16(),
        message,
    })
}

fn is_expired_token(error: &AppError) -> bool {
    matches!(error, AppError::Remote { message, .. } if message.starts_with("ExpiredToken"))
}

impl XrpcClient {
    /// Log in with an identifier and app password
    ///
    /// # Errors
    /// Returns `AppError::Auth` if the service rejects the credentials
    pub async fn login(config: &RemoteConfig) -> Result<Self, AppError> {
        let service_url = Url::parse(&config.service_url)
            .map_err(|e| AppError::Config(format!("invalid remote.service_url: {e}")))?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("followtide/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        let nsid = "com.atproto.server.createSession";
        let response = http_client
            .post(endpoint(&service_url, nsid)?)
            .json(&serde_json::json!({
                "identifier": config.username,
                "password": config.password,
            }))
            .send()
            .await
            .map_err(|e| map_send_error(nsid, e))?;

        let session: SessionResponse = decode_response(nsid, response)
            .await
            .map_err(|error| match error {
                AppError::Remote { status, message } => {
                    AppError::Auth(format!("HTTP {status}: {message}"))
                }
                other => other,
            })?;

        tracing::info!(handle = %session.handle, did = %session.did, "Authenticated");

        Ok(Self {
            http_client,
            service_url,
            session: RwLock::new(session.into()),
        })
    }

    /// Current session identity
    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    async fn refresh_session(&self) -> Result<(), AppError> {
        let nsid = "com.atproto.server.refreshSession";
        let refresh_jwt = self.session.read().await.refresh_jwt.clone();
        let response = self
            .http_client
            .post(endpoint(&self.service_url, nsid)?)
            .bearer_auth(refresh_jwt)
            .send()
            .await
            .map_err(|e| map_send_error(nsid, e))?;
        let refreshed: SessionResponse = decode_response(nsid, response)
            .await
            .map_err(|error| AppError::Auth(format!("session refresh failed: {error}")))?;

        *self.session.write().await = refreshed.into();
        tracing::info!("Refreshed access token");
        Ok(())
    }

    /// Send an authorized request, refreshing the session once on token expiry
    async fn execute<T, F>(&self, nsid: &str, build: F) -> Result<T, AppError>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client, Url, &str) -> reqwest::RequestBuilder,
    {
        let url = endpoint(&self.service_url, nsid)?;
        let mut refreshed = false;

        loop {
            let token = self.session.read().await.access_jwt.clone();
            let response = build(&self.http_client, url.clone(), &token)
                .send()
                .await
                .map_err(|e| map_send_error(nsid, e))?;

            match decode_response(nsid, response).await {
                Err(error) if !refreshed && is_expired_token(&error) => {
                    self.refresh_session().await?;
                    refreshed = true;
                }
                result => return result,
            }
        }
    }
}

impl SocialGraph for XrpcClient {
    async fn list_relationships(
        &self,
        actor: &str,
        kind: RelationshipKind,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<RelationshipPage, AppError> {
        let mut query = vec![
            ("actor", actor.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let build = |client: &reqwest::Client, url: Url, token: &str| {
            client.get(url).query(&query).bearer_auth(token)
        };

        let (profiles, cursor) = match kind {
            RelationshipKind::Followers => {
                let page: FollowersResponse =
                    self.execute("app.bsky.graph.getFollowers", build).await?;
                (page.followers, page.cursor)
            }
            RelationshipKind::Follows => {
                let page: FollowsResponse = self.execute("app.bsky.graph.getFollows", build).await?;
                (page.follows, page.cursor)
            }
        };

        Ok(RelationshipPage {
            accounts: profiles.into_iter().map(AccountRecord::from).collect(),
            cursor: cursor.filter(|value| !value.is_empty()),
        })
    }

    async fn follow(&self, did: &str) -> Result<String, AppError> {
        let repo = self.session.read().await.did.clone();
        let body = serde_json::json!({
            "repo": repo,
            "collection": FOLLOW_COLLECTION,
            "record": {
                "$type": FOLLOW_COLLECTION,
                "subject": did,
                "createdAt": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            },
        });

        let created: CreateRecordResponse = self
            .execute("com.atproto.repo.createRecord", |client, url, token| {
                client.post(url).json(&body).bearer_auth(token)
            })
            .await?;

        Ok(created.uri)
    }

    async fn resolve_follow_record(&self, did: &str) -> Result<Option<String>, AppError> {
        let query = [("actor", did.to_string())];
        let profile: ProfileDetailed = self
            .execute("app.bsky.actor.getProfile", |client, url, token| {
                client.get(url).query(&query).bearer_auth(token)
            })
            .await?;

        Ok(profile.viewer.and_then(|viewer| viewer.following))
    }

    async fn unfollow(&self, record_uri: &str) -> Result<(), AppError> {
        let record = RecordRef::parse(record_uri)?;
        if record.collection != FOLLOW_COLLECTION {
            return Err(AppError::Mutation(format!(
                "refusing to delete non-follow record {record_uri}"
            )));
        }

        let body = serde_json::json!({
            "repo": record.repo,
            "collection": record.collection,
            "rkey": record.rkey,
        });
        let _: serde_json::Value = self
            .execute("com.atproto.repo.deleteRecord", |client, url, token| {
                client.post(url).json(&body).bearer_auth(token)
            })
            .await?;

        Ok(())
    }
}
