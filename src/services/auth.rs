//! Sign-in, sign-out and the current session.

use validator::Validate;

use super::Context;
use crate::domain::session::{Credentials, Profile, Session};
use crate::store::Action;
use crate::Result;

#[derive(Clone)]
pub struct AuthService {
    ctx: Context,
}

impl AuthService {
    pub fn new(ctx: Context) -> Self { Self { ctx } }

    pub async fn sign_in(&self, credentials: Credentials) -> Result<(Session, Option<Profile>)> {
        let credentials = Credentials { email: credentials.email.trim().to_string(), ..credentials };
        if let Err(e) = credentials.validate() { return self.ctx.fail(e); }
        let _loading = self.ctx.loading("auth");
        let session = self.ctx.track(self.ctx.backend.sign_in(&credentials).await)?;
        let profile = match self.ctx.backend.profile(session.user.id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(user_id = %session.user.id, error = %e, "Profile unavailable");
                None
            }
        };
        self.ctx.store.dispatch(Action::SessionStarted { session: session.clone(), profile: profile.clone() })?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        self.ctx.succeed("Signed in");
        Ok((session, profile))
    }

    /// Ends the session locally even when the remote logout fails.
    pub async fn sign_out(&self) -> Result<()> {
        if let Err(e) = self.ctx.backend.sign_out().await {
            tracing::warn!(error = %e, "Remote sign-out failed");
        }
        self.ctx.store.dispatch(Action::SessionEnded)?;
        tracing::info!("Signed out");
        Ok(())
    }

    pub fn current(&self) -> Option<(Session, Option<Profile>)> {
        self.ctx.store.select(|s| s.session.clone().map(|session| (session, s.profile.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::Role;
    use crate::services::testing::{context, last_notification, EMAIL, PASSWORD};
    use crate::store::NotificationLevel;
    use crate::PosError;

    #[tokio::test]
    async fn test_sign_in_loads_profile() {
        let (_, ctx) = context();
        let auth = AuthService::new(ctx.clone());
        let (_, profile) = auth.sign_in(Credentials { email: format!(" {EMAIL} "), password: PASSWORD.into() }).await.unwrap();
        assert_eq!(profile.map(|p| p.role), Some(Role::Admin));
        assert!(auth.current().is_some());
        auth.sign_out().await.unwrap();
        assert!(auth.current().is_none());
    }

    #[tokio::test]
    async fn test_invalid_credentials_skip_the_backend() {
        let (backend, ctx) = context();
        let auth = AuthService::new(ctx.clone());
        let err = auth.sign_in(Credentials { email: "not-an-email".into(), password: "x".into() }).await.unwrap_err();
        assert!(matches!(err, PosError::Validation(_)));
        assert!(backend.calls().is_empty());
        let err = auth.sign_in(Credentials { email: EMAIL.into(), password: "wrong-one".into() }).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert_eq!(last_notification(&ctx).map(|n| n.0), Some(NotificationLevel::Error));
        assert!(!ctx.store.select(|s| s.is_loading("auth")));
    }
}
