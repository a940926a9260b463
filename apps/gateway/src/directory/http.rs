//! HTTP/JSON adapters for remote directory services.

use std::time::Duration;

use async_trait::async_trait;
use parley_common::{GroupId, IdentityId};
use reqwest::Response;
use serde::de::DeserializeOwned;

use super::wire::{
    CreateGroupRequest, CreateGroupResponse, ListGroupsResponse, ListUsersResponse,
    RegisterUserRequest, RegisterUserResponse, SetStatusRequest, SetStatusResponse,
};
use super::{DirectoryError, GroupDirectory, GroupRecord, IdentityDirectory, UserRecord};

fn build_http(timeout: Duration) -> Result<reqwest::Client, DirectoryError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DirectoryError::Transport {
            operation: "build_client",
            message: e.to_string(),
        })
}

fn transport(operation: &'static str) -> impl FnOnce(reqwest::Error) -> DirectoryError {
    move |e| {
        tracing::error!(?e, operation, "directory request failed");
        DirectoryError::Transport {
            operation,
            message: e.to_string(),
        }
    }
}

/// `base_url` with `segments` appended as percent-encoded path segments.
fn endpoint(
    operation: &'static str,
    base_url: &str,
    segments: &[&str],
) -> Result<reqwest::Url, DirectoryError> {
    let invalid = |message: String| DirectoryError::Transport { operation, message };
    let mut url = reqwest::Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid(format!("{base_url} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn parse_json<T: DeserializeOwned>(
    operation: &'static str,
    resp: Response,
) -> Result<T, DirectoryError> {
    if !resp.status().is_success() {
        return Err(DirectoryError::Status {
            operation,
            status: resp.status().as_u16(),
        });
    }
    resp.json::<T>().await.map_err(|e| {
        tracing::error!(?e, operation, "directory response parse failed");
        DirectoryError::Decode { operation }
    })
}

/// Identity directory reached at `base_url`.
#[derive(Clone)]
pub struct HttpIdentityDirectory {
    base_url: String,
    http: reqwest::Client,
}

impl HttpIdentityDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: build_http(timeout)?,
        })
    }
}

#[async_trait]
impl IdentityDirectory for HttpIdentityDirectory {
    async fn register_user(&self, display_name: &str) -> Result<IdentityId, DirectoryError> {
        let resp = self
            .http
            .post(format!("{}/users", self.base_url))
            .json(&RegisterUserRequest {
                display_name: display_name.to_string(),
            })
            .send()
            .await
            .map_err(transport("register_user"))?;
        let body: RegisterUserResponse = parse_json("register_user", resp).await?;
        Ok(body.id)
    }

    async fn set_status(&self, id: &IdentityId, online: bool) -> Result<bool, DirectoryError> {
        let url = endpoint("set_status", &self.base_url, &["users", id.as_str(), "status"])?;
        let resp = self
            .http
            .put(url)
            .json(&SetStatusRequest { online })
            .send()
            .await
            .map_err(transport("set_status"))?;
        let body: SetStatusResponse = parse_json("set_status", resp).await?;
        Ok(body.success)
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        let resp = self
            .http
            .get(format!("{}/users", self.base_url))
            .send()
            .await
            .map_err(transport("list_users"))?;
        let body: ListUsersResponse = parse_json("list_users", resp).await?;
        Ok(body.users)
    }
}

/// Group directory reached at `base_url`.
#[derive(Clone)]
pub struct HttpGroupDirectory {
    base_url: String,
    http: reqwest::Client,
}

impl HttpGroupDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: build_http(timeout)?,
        })
    }
}

#[async_trait]
impl GroupDirectory for HttpGroupDirectory {
    async fn create_group(
        &self,
        name: &str,
        member_ids: &[IdentityId],
    ) -> Result<GroupId, DirectoryError> {
        let resp = self
            .http
            .post(format!("{}/groups", self.base_url))
            .json(&CreateGroupRequest {
                name: name.to_string(),
                member_ids: member_ids.to_vec(),
            })
            .send()
            .await
            .map_err(transport("create_group"))?;
        let body: CreateGroupResponse = parse_json("create_group", resp).await?;
        Ok(body.group_id)
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, DirectoryError> {
        let resp = self
            .http
            .get(format!("{}/groups", self.base_url))
            .send()
            .await
            .map_err(transport("list_groups"))?;
        let body: ListGroupsResponse = parse_json("list_groups", resp).await?;
        Ok(body.groups)
    }
}
