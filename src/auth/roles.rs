/// Role-based authorization
///
/// Layered after authentication: an allow-list predicate over the
/// authenticated user's role, no hierarchy.

use crate::auth::gate::Identity;
use crate::error::AuthError;
use crate::model::Role;

/// A set of roles allowed to perform an operation
#[derive(Debug, Clone, Copy)]
pub struct Permission(&'static [Role]);

impl Permission {
    pub const fn any_of(roles: &'static [Role]) -> Self {
        Self(roles)
    }

    pub fn allows(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn check(&self, identity: &Identity) -> Result<(), AuthError> {
        if self.allows(identity.user.role) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %identity.user_id,
                role = %identity.user.role,
                "Role not permitted"
            );
            Err(AuthError::Forbidden)
        }
    }
}

pub const ADMIN_ONLY: Permission = Permission::any_of(&[Role::Admin]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        assert!(ADMIN_ONLY.allows(Role::Admin));
        assert!(!ADMIN_ONLY.allows(Role::Doctor));

        let clinicians = Permission::any_of(&[Role::Doctor, Role::Admin]);
        assert!(clinicians.allows(Role::Doctor));
        assert!(!clinicians.allows(Role::Patient));
    }

    #[test]
    fn test_no_hierarchy() {
        let patients_only = Permission::any_of(&[Role::Patient]);
        assert!(!patients_only.allows(Role::Admin));
    }
}
