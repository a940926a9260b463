//! JSON bodies of the HTTP directory binding, shared by the HTTP clients and
//! the stub server.

use parley_common::{GroupId, IdentityId};
use serde::{Deserialize, Serialize};

use super::{GroupRecord, UserRecord};

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub display_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterUserResponse {
    pub id: IdentityId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetStatusRequest {
    pub online: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetStatusResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListUsersResponse {
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub member_ids: Vec<IdentityId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGroupResponse {
    pub group_id: GroupId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListGroupsResponse {
    pub groups: Vec<GroupRecord>,
}
