//! The credentials object and the parties it describes.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{AccessToken, PartyId, Role};

/// Public business information about a party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDetails {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<serde_json::Value>,
}

impl BusinessDetails {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            website: None,
            logo: None,
        }
    }
}

/// One role a party plays, as advertised in a credentials object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsRole {
    pub role: Role,
    pub business_details: BusinessDetails,
    pub party_id: String,
    pub country_code: String,
}

impl CredentialsRole {
    pub fn new(party: &PartyId, role: Role, business_details: BusinessDetails) -> Self {
        Self {
            role,
            business_details,
            party_id: party.party_id.clone(),
            country_code: party.country_code.clone(),
        }
    }

    /// The validated identity this role belongs to.
    pub fn party(&self) -> Result<PartyId, ValidationError> {
        PartyId::new(&self.country_code, &self.party_id)
    }
}

/// The object exchanged on the credentials endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The token the receiver must use when calling the sender.
    pub token: AccessToken,
    /// The sender's versions endpoint.
    pub url: String,
    pub roles: Vec<CredentialsRole>,
}

impl Credentials {
    /// Structural checks applied before any remote call is made.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.token.is_empty() {
            return Err(ValidationError::MissingField("token"));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ValidationError::InvalidUrl(self.url.clone()));
        }
        if self.roles.is_empty() {
            return Err(ValidationError::MissingField("roles"));
        }
        for role in &self.roles {
            role.party()?;
        }
        Ok(())
    }

    /// The `(party, role)` pairs, sorted. Duplicates are kept, so two lists
    /// compare equal only when they hold the same pairs the same number of
    /// times.
    pub fn role_set(&self) -> Result<Vec<(PartyId, Role)>, ValidationError> {
        let mut set = self
            .roles
            .iter()
            .map(|r| Ok((r.party()?, r.role)))
            .collect::<Result<Vec<_>, ValidationError>>()?;
        set.sort();
        Ok(set)
    }
}

/// A role this node itself plays. Owns Locations, Tariffs, Sessions,
/// TokenStatuses and CDRs in the resource store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalParty {
    pub id: PartyId,
    pub role: Role,
    pub business_details: BusinessDetails,
    /// Party-level downgrade policy; falls back to the node default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_downgrades: Option<bool>,
}

impl LocalParty {
    pub fn new(id: PartyId, role: Role, business_details: BusinessDetails) -> Self {
        Self {
            id,
            role,
            business_details,
            allow_downgrades: None,
        }
    }

    pub fn with_allow_downgrades(mut self, allow: bool) -> Self {
        self.allow_downgrades = Some(allow);
        self
    }

    pub fn credentials_role(&self) -> CredentialsRole {
        CredentialsRole::new(&self.id, self.role, self.business_details.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(cc: &str, pid: &str, role: Role) -> CredentialsRole {
        CredentialsRole {
            role,
            business_details: BusinessDetails::named("Test"),
            party_id: pid.into(),
            country_code: cc.into(),
        }
    }

    #[test]
    fn test_validate_rejects_missing_parts() {
        let good = Credentials {
            token: AccessToken::new("abc"),
            url: "https://peer.example.com/ocpi/versions".into(),
            roles: vec![role("DE", "ABC", Role::Cpo)],
        };
        assert!(good.validate().is_ok());

        let mut no_token = good.clone();
        no_token.token = AccessToken::new("  ");
        assert!(matches!(no_token.validate(), Err(ValidationError::MissingField("token"))));

        let mut bad_url = good.clone();
        bad_url.url = "peer.example.com".into();
        assert!(matches!(bad_url.validate(), Err(ValidationError::InvalidUrl(_))));

        let mut no_roles = good;
        no_roles.roles.clear();
        assert!(matches!(no_roles.validate(), Err(ValidationError::MissingField("roles"))));
    }

    #[test]
    fn test_role_set_ignores_order_and_case() {
        let a = Credentials {
            token: AccessToken::new("t"),
            url: "https://a".into(),
            roles: vec![role("de", "abc", Role::Cpo), role("DE", "XYZ", Role::Emsp)],
        };
        let b = Credentials {
            token: AccessToken::new("t"),
            url: "https://a".into(),
            roles: vec![role("DE", "XYZ", Role::Emsp), role("DE", "ABC", Role::Cpo)],
        };
        assert_eq!(a.role_set().unwrap(), b.role_set().unwrap());
    }

    #[test]
    fn test_role_set_keeps_duplicates() {
        let once = Credentials {
            token: AccessToken::new("t"),
            url: "https://a".into(),
            roles: vec![role("NL", "XYZ", Role::Emsp)],
        };
        let twice = Credentials {
            roles: vec![role("NL", "XYZ", Role::Emsp), role("NL", "XYZ", Role::Emsp)],
            ..once.clone()
        };
        assert_ne!(once.role_set().unwrap(), twice.role_set().unwrap());
    }
}
