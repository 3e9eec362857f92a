// client-core/src/routes.rs
use common::models::SessionRecord;

/// Declared access requirements for a routed view
#[derive(Debug, Clone, Default)]
pub struct RouteRequirement {
    /// View requires an authenticated session
    pub require_auth: bool,
    /// View is only for unauthenticated visitors (login, register)
    pub guest_only: bool,
    /// Roles the user must all hold, checked only when `require_auth`
    pub required_roles: Vec<String>,
    /// Where to send a visitor who fails the requirement
    pub redirect_to: String,
}

/// Result of evaluating a requirement against the session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Grant,
    Redirect {
        target: String,
        /// Hint for bouncing back after login
        return_to: Option<String>,
    },
}

impl RouteRequirement {
    pub fn protected(redirect_to: impl Into<String>) -> Self {
        Self {
            require_auth: true,
            redirect_to: redirect_to.into(),
            ..Default::default()
        }
    }

    pub fn guest(redirect_to: impl Into<String>) -> Self {
        Self {
            guest_only: true,
            redirect_to: redirect_to.into(),
            ..Default::default()
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.required_roles = roles;
        self
    }

    /// Gate rendering of the view at `current_path`
    pub fn evaluate(&self, session: &SessionRecord, current_path: &str) -> AccessDecision {
        if self.require_auth {
            let user = match (&session.user, session.is_authenticated) {
                (Some(user), true) => user,
                _ => {
                    return AccessDecision::Redirect {
                        target: self.redirect_to.clone(),
                        return_to: Some(current_path.to_string()),
                    };
                }
            };

            let missing_role = self
                .required_roles
                .iter()
                .any(|role| !user.has_role(role));
            if missing_role {
                tracing::warn!("Access denied to {}: missing required role", current_path);
                return AccessDecision::Redirect {
                    target: self.redirect_to.clone(),
                    return_to: None,
                };
            }
        }

        if self.guest_only && session.is_authenticated {
            return AccessDecision::Redirect {
                target: self.redirect_to.clone(),
                return_to: None,
            };
        }

        AccessDecision::Grant
    }
}
