//! The remote session service the controller talks to.
//!
//! Warden doesn't implement token issuance or verification; the backend
//! (Supabase, Auth0, a custom API) does. [`SessionService`] is the small
//! surface the controller needs from it. Implement it over your auth
//! client and hand it to [`SessionController::builder`](crate::SessionController::builder).

use std::future::Future;

use warden_protocol::{ServiceSession, UserId, UserProfile};

use crate::ServiceError;

/// Operations consumed from the external session service.
///
/// Every call is made through the request coordinator, which drops the
/// returned future when the call is superseded or the session is torn
/// down. Implementations should therefore not rely on running to
/// completion.
///
/// # Error classification
///
/// Return [`ServiceError::Network`] for transport failures,
/// [`ServiceError::Auth`] when the credential was rejected and
/// [`ServiceError::Unexpected`] for everything else. The controller's
/// retry and termination policies depend on that split.
///
/// # Example
///
/// ```rust
/// use warden_protocol::{ServiceSession, UserId, UserProfile};
/// use warden_session::{ServiceError, SessionService};
///
/// /// Accepts any non-empty token. Only useful in development.
/// struct DevService;
///
/// impl SessionService for DevService {
///     async fn get_current_session(
///         &self,
///         token: &str,
///     ) -> Result<Option<ServiceSession>, ServiceError> {
///         if token.is_empty() {
///             return Ok(None);
///         }
///         Ok(Some(ServiceSession {
///             user: UserId::new("dev"),
///             access_token: token.to_string(),
///             expires_at: None,
///         }))
///     }
///
///     async fn refresh_session(&self, _token: &str) -> Result<(), ServiceError> {
///         Ok(())
///     }
///
///     async fn sign_out(&self) -> Result<(), ServiceError> {
///         Ok(())
///     }
///
///     async fn fetch_profile(
///         &self,
///         user: &UserId,
///         _token: &str,
///     ) -> Result<Option<UserProfile>, ServiceError> {
///         Ok(Some(UserProfile {
///             id: user.clone(),
///             full_name: None,
///             email: None,
///         }))
///     }
/// }
/// ```
pub trait SessionService: Send + Sync + 'static {
    /// Asks the service whether `token` still belongs to a live session.
    ///
    /// - `Ok(Some(_))`: the session is live; `expires_at` drives refresh
    /// - `Ok(None)`: the service has no session for this token
    fn get_current_session(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<ServiceSession>, ServiceError>> + Send;

    /// Extends the lifetime of the session behind `token`.
    fn refresh_session(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Ends the session on the service side.
    fn sign_out(&self) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Loads the profile of `user`. `Ok(None)` means the user has no
    /// profile row yet, which is not an error.
    fn fetch_profile(
        &self,
        user: &UserId,
        token: &str,
    ) -> impl Future<Output = Result<Option<UserProfile>, ServiceError>> + Send;
}
