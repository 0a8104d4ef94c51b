//! In-memory `UserStore` for tests.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    users::{
        repo::UserStore,
        repo_types::{NewUser, ProfilePatch, User},
    },
};

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    /// Raw record regardless of `active`, for assertions.
    pub fn snapshot(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    pub fn put(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, new: NewUser) -> AppResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == new.email) {
            return Err(AppError::Conflict("email".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            photo: "default.jpg".into(),
            role: new.role,
            password_hash: new.password_hash,
            password_changed_at: None,
            password_reset_token_hash: None,
            password_reset_expires_at: None,
            login_attempts: 0,
            blocked: false,
            block_expires_at: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).filter(|u| u.active).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.active && u.email == email)
            .cloned())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| {
                u.active
                    && u.password_reset_token_hash.as_deref() == Some(token_hash)
                    && u.password_reset_expires_at.is_some_and(|exp| exp > now)
            })
            .cloned())
    }

    async fn save_credentials(&self, user: &User) -> AppResult<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(stored) = users.get_mut(&user.id) {
            stored.password_hash = user.password_hash.clone();
            stored.password_changed_at = user.password_changed_at;
            stored.password_reset_token_hash = user.password_reset_token_hash.clone();
            stored.password_reset_expires_at = user.password_reset_expires_at;
            stored.login_attempts = user.login_attempts;
            stored.blocked = user.blocked;
            stored.block_expires_at = user.block_expires_at;
        }
        Ok(())
    }

    async fn update_profile(&self, id: Uuid, patch: &ProfilePatch) -> AppResult<Option<User>> {
        let mut users = self.users.lock().unwrap();
        if let Some(email) = &patch.email {
            if users.values().any(|u| u.id != id && &u.email == email) {
                return Err(AppError::Conflict("email".into()));
            }
        }
        let Some(user) = users.get_mut(&id).filter(|u| u.active) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            user.name = name.clone();
        }
        if let Some(email) = &patch.email {
            user.email = email.clone();
        }
        if let Some(photo) = &patch.photo {
            user.photo = photo.clone();
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        Ok(Some(user.clone()))
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<bool> {
        let mut users = self.users.lock().unwrap();
        match users.get_mut(&id).filter(|u| u.active) {
            Some(user) => {
                user.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.users.lock().unwrap().remove(&id).is_some())
    }
}
