use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

/// Caller role as issued by the upstream identity system. Crew and admin are
/// both privileged for request access; admin additionally exists so future
/// operational tooling can be separated without a schema change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Passenger,
    Crew,
    Admin,
}

impl Role {
    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Crew | Self::Admin)
    }
}

impl std::str::FromStr for Role {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "passenger" => Ok(Self::Passenger),
            "crew" => Ok(Self::Crew),
            "admin" => Ok(Self::Admin),
            other => Err(ServiceError::validation(format!(
                "unsupported role `{other}` (expected passenger|crew|admin)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: ActorId(id.into()), role }
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Crew".parse::<Role>().expect("crew"), Role::Crew);
        assert_eq!(" passenger ".parse::<Role>().expect("passenger"), Role::Passenger);
        assert!("pilot".parse::<Role>().is_err());
    }

    #[test]
    fn crew_and_admin_are_privileged() {
        assert!(!Role::Passenger.is_privileged());
        assert!(Role::Crew.is_privileged());
        assert!(Role::Admin.is_privileged());
    }
}
