use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::users::repo_types::{Role, User};

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: Role,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            photo: u.photo,
            role: u.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserData {
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub status: &'static str,
    pub data: UserData,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            status: "success",
            data: UserData { user: u.into() },
        }
    }
}

/// `PATCH /users/update-me`. Password fields are only captured to be rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<Value>,
    pub password_confirm: Option<Value>,
}

/// `PATCH /users/:id` (admin).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
    pub role: Option<Role>,
}
