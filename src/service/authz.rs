//! Role lattice and capability checks
//!
//! Pure functions over integer role levels. Every mutating operation in the
//! admin surface consults these first; a failed check is silent at the
//! platform layer.

/// Regular user
pub const ROLE_USER: i64 = 0;
/// Moderator
pub const ROLE_MODERATOR: i64 = 5;
/// Senior moderator
pub const ROLE_SENIOR_MODERATOR: i64 = 7;
/// Administrator
pub const ROLE_ADMIN: i64 = 8;
/// Owner
pub const ROLE_OWNER: i64 = 9;

pub fn can_moderate(role: i64) -> bool {
    role >= ROLE_MODERATOR
}

pub fn can_admin(role: i64) -> bool {
    role >= ROLE_ADMIN
}

pub fn is_owner(role: i64) -> bool {
    role >= ROLE_OWNER
}

/// Human-readable role name for the UI.
pub fn role_name(role: i64) -> &'static str {
    match role {
        r if r >= ROLE_OWNER => "Владелец",
        r if r >= ROLE_ADMIN => "Администратор",
        r if r >= ROLE_SENIOR_MODERATOR => "Старший модератор",
        r if r >= ROLE_MODERATOR => "Модератор",
        _ => "Пользователь",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderate_threshold_is_five() {
        assert!(!can_moderate(4));
        assert!(can_moderate(5));
        assert!(can_moderate(9));
    }

    #[test]
    fn admin_threshold_is_eight() {
        assert!(!can_admin(7));
        assert!(can_admin(8));
    }

    #[test]
    fn owner_threshold_is_nine() {
        assert!(!is_owner(8));
        assert!(is_owner(9));
    }

    #[test]
    fn every_named_level_maps_to_a_name() {
        assert_eq!(role_name(0), "Пользователь");
        assert_eq!(role_name(5), "Модератор");
        assert_eq!(role_name(7), "Старший модератор");
        assert_eq!(role_name(8), "Администратор");
        assert_eq!(role_name(9), "Владелец");
    }
}
