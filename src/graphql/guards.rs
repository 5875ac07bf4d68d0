use async_graphql::{Context, ErrorExtensions, Guard, Result};

use crate::error::ApiError;
use crate::models::user::{Action, Role};

/// The role of the authenticated caller, when an upstream layer knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerRole(pub Role);

/// Requires the caller to hold `role` to perform `action`.
///
/// Without a [CallerRole] in the request data the check is only logged.
/// Admins pass every check.
pub struct HasRole {
    role: Role,
    action: Action,
}

impl HasRole {
    pub const fn new(role: Role, action: Action) -> Self {
        Self { role, action }
    }

    pub fn permits(&self, caller: Role) -> bool {
        caller == Role::Admin || caller == self.role
    }
}

impl Guard for HasRole {
    async fn check(&self, ctx: &Context<'_>) -> Result<()> {
        match ctx.data_opt::<CallerRole>() {
            Some(CallerRole(caller)) => {
                tracing::debug!(required = ?self.role, action = ?self.action, caller = ?caller, "checking role");
                if self.permits(*caller) {
                    Ok(())
                } else {
                    tracing::warn!(required = ?self.role, action = ?self.action, caller = ?caller, "role check failed");
                    Err(ApiError::AccessDenied.extend())
                }
            }
            None => {
                tracing::debug!(required = ?self.role, action = ?self.action, "no caller role, allowing");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_pass_every_check() {
        let guard = HasRole::new(Role::User, Action::CreateUser);
        assert!(guard.permits(Role::Admin));
        assert!(guard.permits(Role::User));
    }

    #[test]
    fn users_cannot_do_admin_actions() {
        let guard = HasRole::new(Role::Admin, Action::DeleteUser);
        assert!(!guard.permits(Role::User));
    }
}
