//! Authentication helpers used by HTTP handlers.
//!
//! Keep the HTTP modules focused on request/response mapping by
//! concentrating session-subject resolution and role checks here.

use crate::domain::{Error, User};

use super::ApiResult;
use super::session::SessionContext;
use super::state::HttpState;

/// Resolve the session subject to an account, if any.
///
/// A subject that no longer resolves (account removed from the store the
/// session was minted against) counts as unauthenticated rather than an
/// error.
pub async fn current_user(
    session: &SessionContext,
    state: &HttpState,
) -> ApiResult<Option<User>> {
    let Some(subject) = session.subject()? else {
        return Ok(None);
    };
    state.accounts.user_by_email(&subject).await
}

/// Require an authenticated account or fail with `401 Unauthorized`.
pub async fn require_user(session: &SessionContext, state: &HttpState) -> ApiResult<User> {
    current_user(session, state)
        .await?
        .ok_or_else(|| Error::unauthorized("login required"))
}

/// Require an authenticated administrator or fail with `401`/`403`.
pub async fn require_admin(session: &SessionContext, state: &HttpState) -> ApiResult<User> {
    let user = require_user(session, state).await?;
    if !user.is_admin {
        return Err(Error::forbidden("administrator access required"));
    }
    Ok(user)
}
