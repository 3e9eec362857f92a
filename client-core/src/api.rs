// client-core/src/api.rs
use async_trait::async_trait;
use common::models::{Comment, NewComment, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::store::SessionStore;

/// Credentials submitted to the authentication exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Successful authentication exchange response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
}

/// Authentication endpoints. The REST wrappers themselves live outside this
/// crate; the core only depends on this seam.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, ApiError>;
    async fn logout(&self) -> Result<(), ApiError>;
    async fn current_user(&self) -> Result<User, ApiError>;
}

/// Comment-creation endpoint for a target post
#[async_trait]
pub trait CommentApi: Send + Sync {
    async fn create_comment(
        &self,
        post_id: &Uuid,
        comment: &NewComment,
    ) -> Result<Comment, ApiError>;
}

/// Exchange credentials and commit the result to the session store in one
/// atomic `login` transition. Failures surface on the store's `last_error`
/// and are returned to the caller.
pub async fn sign_in(
    store: &SessionStore,
    api: &dyn AuthApi,
    credentials: &LoginRequest,
) -> Result<User, ApiError> {
    store.set_loading(true);
    let result = api.login(credentials).await;
    store.set_loading(false);

    match result {
        Ok(response) => {
            store.login(response.user.clone(), response.access_token);
            Ok(response.user)
        }
        Err(e) => {
            tracing::warn!("Login failed: {}", e);
            store.set_error(Some(e.to_string()));
            Err(e)
        }
    }
}

/// Invalidate the server-side session and clear the local one. The local
/// logout happens regardless of the server call's outcome.
pub async fn sign_out(store: &SessionStore, api: &dyn AuthApi) {
    if let Err(e) = api.logout().await {
        tracing::warn!("Server-side logout failed: {}", e);
    }
    store.logout();
}
