//! Remote parties and the access information held for them.
//!
//! A [`RemoteParty`] is an immutable record: every change produces a new
//! value which then replaces the stored one as a whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialsRole;
use crate::types::{AccessStatus, AccessToken, PartyStatus, RemoteAccessStatus, RemotePartyId, Role};
use crate::version::VersionId;

/// A token this node issued to a peer, used by the peer to call us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccessInfo {
    pub access_token: AccessToken,
    pub status: AccessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<DateTime<Utc>>,
    /// The peer's versions URL, known once the handshake completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions_url: Option<String>,
}

impl LocalAccessInfo {
    /// A fresh out-of-band token (CREDENTIALS_TOKEN_A).
    pub fn provisioned(access_token: AccessToken) -> Self {
        Self {
            access_token,
            status: AccessStatus::Allowed,
            not_before: None,
            not_after: None,
            versions_url: None,
        }
    }

    /// A token handed out at the end of a handshake (CREDENTIALS_TOKEN_C).
    pub fn registered(access_token: AccessToken, versions_url: impl Into<String>) -> Self {
        Self {
            versions_url: Some(versions_url.into()),
            ..Self::provisioned(access_token)
        }
    }

    pub fn is_registered(&self) -> bool {
        self.versions_url.is_some()
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        if self.status != AccessStatus::Allowed {
            return false;
        }
        if matches!(self.not_before, Some(nb) if now < nb) {
            return false;
        }
        if matches!(self.not_after, Some(na) if now > na) {
            return false;
        }
        true
    }
}

/// A token a peer issued to us, used when we call the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccessInfo {
    pub access_token: AccessToken,
    pub versions_url: String,
    #[serde(default)]
    pub supported_version_ids: Vec<VersionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_version_id: Option<VersionId>,
    pub status: RemoteAccessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<DateTime<Utc>>,
}

/// A peer this node has a trust relationship with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteParty {
    pub id: RemotePartyId,
    pub roles: Vec<CredentialsRole>,
    pub local_access_infos: Vec<LocalAccessInfo>,
    pub remote_access_infos: Vec<RemoteAccessInfo>,
    pub status: PartyStatus,
}

impl RemoteParty {
    /// A party provisioned out of band with a single token A. It stays
    /// disabled until the credential handshake completes.
    pub fn provisioned(id: RemotePartyId, roles: Vec<CredentialsRole>, token: AccessToken) -> Self {
        Self {
            id,
            roles,
            local_access_infos: vec![LocalAccessInfo::provisioned(token)],
            remote_access_infos: Vec::new(),
            status: PartyStatus::Disabled,
        }
    }

    pub fn local_access_info(&self, token: &AccessToken) -> Option<&LocalAccessInfo> {
        self.local_access_infos
            .iter()
            .find(|info| &info.access_token == token)
    }

    pub fn local_tokens(&self) -> impl Iterator<Item = &AccessToken> {
        self.local_access_infos.iter().map(|info| &info.access_token)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r.role == role)
    }

    pub fn is_enabled(&self) -> bool {
        self.status == PartyStatus::Enabled
    }

    pub fn with_status(mut self, status: PartyStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_roles(mut self, roles: Vec<CredentialsRole>) -> Self {
        self.roles = roles;
        self
    }

    /// Replace every remote access info with `info`.
    pub fn with_remote_access(mut self, info: RemoteAccessInfo) -> Self {
        self.remote_access_infos = vec![info];
        self
    }

    pub fn with_local_access(mut self, info: LocalAccessInfo) -> Self {
        self.local_access_infos.push(info);
        self
    }

    /// Swap `old` for a freshly registered `new` token in one step.
    ///
    /// Returns `None` if `old` is not held by this party.
    pub fn rotate_local_token(
        &self,
        old: &AccessToken,
        new: AccessToken,
        versions_url: &str,
    ) -> Option<Self> {
        let position = self
            .local_access_infos
            .iter()
            .position(|info| &info.access_token == old)?;

        let mut next = self.clone();
        next.local_access_infos[position] = LocalAccessInfo::registered(new, versions_url);
        Some(next)
    }

    /// Drop one local token. Returns `None` when no token would remain, in
    /// which case the party itself must be removed.
    pub fn without_local_token(&self, token: &AccessToken) -> Option<Self> {
        let mut next = self.clone();
        next.local_access_infos.retain(|info| &info.access_token != token);
        if next.local_access_infos.is_empty() {
            None
        } else {
            Some(next)
        }
    }

    /// Change the status of one local token. Returns `None` if the token is unknown.
    pub fn with_access_status(&self, token: &AccessToken, status: AccessStatus) -> Option<Self> {
        let mut next = self.clone();
        let info = next
            .local_access_infos
            .iter_mut()
            .find(|info| &info.access_token == token)?;
        info.status = status;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn party() -> RemoteParty {
        RemoteParty::provisioned(
            RemotePartyId::new("p1"),
            Vec::new(),
            AccessToken::new("token-a"),
        )
    }

    #[test]
    fn test_provisioned_party_is_disabled_and_unregistered() {
        let p = party();
        assert!(!p.is_enabled());
        let info = p.local_access_info(&AccessToken::new("token-a")).unwrap();
        assert!(!info.is_registered());
        assert_eq!(info.status, AccessStatus::Allowed);
    }

    #[test]
    fn test_rotate_replaces_token_in_place() {
        let p = party();
        let rotated = p
            .rotate_local_token(
                &AccessToken::new("token-a"),
                AccessToken::new("token-c"),
                "https://peer/versions",
            )
            .unwrap();

        assert!(rotated.local_access_info(&AccessToken::new("token-a")).is_none());
        let info = rotated.local_access_info(&AccessToken::new("token-c")).unwrap();
        assert!(info.is_registered());
        assert_eq!(rotated.local_access_infos.len(), 1);

        // The original record is untouched.
        assert!(p.local_access_info(&AccessToken::new("token-a")).is_some());
    }

    #[test]
    fn test_rotate_unknown_token_is_none() {
        assert!(party()
            .rotate_local_token(&AccessToken::new("nope"), AccessToken::new("c"), "u")
            .is_none());
    }

    #[test]
    fn test_without_last_token_signals_removal() {
        let p = party();
        assert!(p.without_local_token(&AccessToken::new("token-a")).is_none());

        let two = p.with_local_access(LocalAccessInfo::provisioned(AccessToken::new("token-b")));
        let pruned = two.without_local_token(&AccessToken::new("token-a")).unwrap();
        assert_eq!(pruned.local_access_infos.len(), 1);
    }

    #[test]
    fn test_usable_window() {
        let now = Utc::now();
        let mut info = LocalAccessInfo::provisioned(AccessToken::new("t"));
        assert!(info.is_usable_at(now));

        info.not_before = Some(now + Duration::minutes(5));
        assert!(!info.is_usable_at(now));

        info.not_before = None;
        info.not_after = Some(now - Duration::minutes(5));
        assert!(!info.is_usable_at(now));

        info.not_after = None;
        info.status = AccessStatus::Blocked;
        assert!(!info.is_usable_at(now));
    }
}
