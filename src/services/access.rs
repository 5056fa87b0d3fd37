//! Role-based access decisions. Every handler that reads or writes another
//! user's data goes through these checks instead of branching on roles
//! itself.

use sqlx::PgPool;
use crate::errors::AppError;
use crate::models::assessment::ScoreField;
use crate::models::principal::Principal;
use crate::models::user::{Role, UserScope};

/// Loads the fields of `user_id` that access decisions look at.
pub async fn load_target(pool: &PgPool, user_id: i64) -> Result<UserScope, AppError> {
    sqlx::query_as::<_, UserScope>("SELECT id, role, department_id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

fn same_department(principal: &Principal, target: &UserScope) -> bool {
    matches!(
        (principal.department_id, target.department_id),
        (Some(mine), Some(theirs)) if mine == theirs
    )
}

pub fn can_view(principal: &Principal, target: &UserScope) -> Result<(), AppError> {
    let allowed = match principal.role {
        Role::Admin | Role::Hr => true,
        Role::Manager => same_department(principal, target),
        Role::Employee => principal.user_id == target.id,
    };
    if allowed { Ok(()) } else { Err(AppError::forbidden()) }
}

pub fn can_write(principal: &Principal, target: &UserScope) -> Result<(), AppError> {
    // Same shape as `can_view` today; the field restriction for employees
    // lives in `can_write_field`.
    can_view(principal, target)
}

/// Field-level rule that needs no target: employees never set manager scores.
pub fn can_write_field(principal: &Principal, field: ScoreField) -> Result<(), AppError> {
    match (principal.role, field) {
        (Role::Employee, ScoreField::ManagerScore) => Err(AppError::Permission(
            "Only managers, HR and administrators can set manager scores".to_string(),
        )),
        _ => Ok(()),
    }
}

pub fn can_write_score(
    principal: &Principal,
    target: &UserScope,
    field: ScoreField,
) -> Result<(), AppError> {
    can_write_field(principal, field)?;
    can_write(principal, target)
}

pub fn require_role(principal: &Principal, roles: &[Role]) -> Result<(), AppError> {
    if roles.contains(&principal.role) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

pub fn require_hr(principal: &Principal) -> Result<(), AppError> {
    require_role(principal, &[Role::Hr, Role::Admin])
}

/// HR and administrators may create any account; a manager may only add
/// employees to their own department.
pub fn can_register(
    principal: &Principal,
    department_id: Option<i64>,
    role: Role,
) -> Result<(), AppError> {
    match principal.role {
        Role::Admin | Role::Hr => Ok(()),
        Role::Manager => {
            if role != Role::Employee {
                return Err(AppError::Permission(
                    "Managers can only add employees".to_string(),
                ));
            }
            match (principal.department_id, department_id) {
                (Some(mine), Some(theirs)) if mine == theirs => Ok(()),
                _ => Err(AppError::Permission(
                    "Managers can only add users to their own department".to_string(),
                )),
            }
        }
        Role::Employee => Err(AppError::forbidden()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(user_id: i64, role: Role, department_id: Option<i64>) -> Principal {
        Principal { user_id, role, department_id }
    }

    fn target(id: i64, department_id: Option<i64>) -> UserScope {
        UserScope { id, role: Role::Employee, department_id }
    }

    #[test]
    fn hr_and_admin_reach_everyone() {
        for role in [Role::Hr, Role::Admin] {
            let p = principal(1, role, None);
            for t in [target(2, Some(10)), target(3, None), target(1, None)] {
                assert!(can_view(&p, &t).is_ok());
                assert!(can_write_score(&p, &t, ScoreField::ManagerScore).is_ok());
                assert!(can_write_score(&p, &t, ScoreField::SelfScore).is_ok());
            }
        }
    }

    #[test]
    fn manager_is_limited_to_own_department() {
        let manager = principal(1, Role::Manager, Some(10));
        assert!(can_view(&manager, &target(2, Some(10))).is_ok());
        assert!(can_write_score(&manager, &target(2, Some(10)), ScoreField::ManagerScore).is_ok());

        let other_department = target(3, Some(20));
        assert!(matches!(can_view(&manager, &other_department), Err(AppError::Permission(_))));
        assert!(matches!(
            can_write_score(&manager, &other_department, ScoreField::ManagerScore),
            Err(AppError::Permission(_))
        ));
        assert!(can_write(&manager, &target(4, None)).is_err());
    }

    #[test]
    fn manager_without_department_matches_nobody() {
        let manager = principal(1, Role::Manager, None);
        assert!(can_view(&manager, &target(2, None)).is_err());
    }

    #[test]
    fn employee_sees_and_writes_only_own_self_score() {
        let employee = principal(5, Role::Employee, Some(10));
        let me = target(5, Some(10));
        let colleague = target(6, Some(10));

        assert!(can_view(&employee, &me).is_ok());
        assert!(can_view(&employee, &colleague).is_err());
        assert!(can_write_score(&employee, &me, ScoreField::SelfScore).is_ok());
        assert!(can_write_score(&employee, &me, ScoreField::ManagerScore).is_err());
        assert!(can_write_score(&employee, &colleague, ScoreField::SelfScore).is_err());
    }

    #[test]
    fn admin_surfaces_require_hr_or_admin() {
        assert!(require_hr(&principal(1, Role::Hr, None)).is_ok());
        assert!(require_hr(&principal(1, Role::Admin, None)).is_ok());
        assert!(require_hr(&principal(1, Role::Manager, Some(1))).is_err());
        assert!(require_hr(&principal(1, Role::Employee, Some(1))).is_err());
    }

    #[test]
    fn registration_rules() {
        let manager = principal(1, Role::Manager, Some(10));
        assert!(can_register(&manager, Some(10), Role::Employee).is_ok());
        assert!(can_register(&manager, Some(20), Role::Employee).is_err());
        assert!(can_register(&manager, None, Role::Employee).is_err());
        assert!(can_register(&manager, Some(10), Role::Hr).is_err());
        assert!(can_register(&principal(2, Role::Hr, None), None, Role::Admin).is_ok());
        assert!(can_register(&principal(3, Role::Employee, Some(10)), Some(10), Role::Employee).is_err());
    }
}
