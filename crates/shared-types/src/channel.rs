//! # Channel Namespace
//!
//! Derives canonical broadcast-channel identifiers and enforces tenant
//! ownership of them.
//!
//! ## Format
//!
//! ```text
//! tenant:<tenantId>:<kind>:<scopeId>    scoped kinds (board, presence, analytics)
//! tenant:<tenantId>:<kind>              org-wide kinds (boards, activity)
//! ```
//!
//! ## Security Properties
//!
//! - A tenant id containing the delimiter is rejected, so no tenant can forge
//!   another tenant's segmentation.
//! - [`assert_ownership`] is the single enforcement point; it must run before
//!   every subscribe and publish. Everything downstream trusts it has run.

use crate::entities::{BoardId, TenantId};
use crate::errors::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// Namespace prefix of every channel.
pub const NAMESPACE_PREFIX: &str = "tenant";

/// Segment delimiter.
pub const DELIMITER: char = ':';

/// Kind of broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Mutations of one board's lists and cards.
    Board,
    /// Who is looking at one board.
    Presence,
    /// Per-board analytics stream.
    Analytics,
    /// Org-wide board list changes.
    Boards,
    /// Org-wide activity feed.
    Activity,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 5] = [
        ChannelKind::Board,
        ChannelKind::Presence,
        ChannelKind::Analytics,
        ChannelKind::Boards,
        ChannelKind::Activity,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Board => "board",
            Self::Presence => "presence",
            Self::Analytics => "analytics",
            Self::Boards => "boards",
            Self::Activity => "activity",
        }
    }

    #[must_use]
    pub fn parse(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == segment)
    }

    /// Scoped kinds require a board id; org-wide kinds forbid one.
    #[must_use]
    pub fn is_scoped(self) -> bool {
        matches!(self, Self::Board | Self::Presence | Self::Analytics)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant-scoped broadcast address. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Wrap a raw channel string received from outside (e.g. a transport
    /// frame). Nothing is validated; run [`assert_ownership`] before use.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reject tenant ids that would corrupt channel segmentation.
///
/// # Errors
///
/// `SyncError::InvalidTenantId` for empty ids or ids containing the delimiter.
pub fn validate_tenant_id(tenant_id: &TenantId) -> Result<(), SyncError> {
    let raw = tenant_id.as_str();
    let reason = if raw.is_empty() {
        "tenant id is empty"
    } else if raw.contains(DELIMITER) {
        "tenant id contains the namespace delimiter"
    } else {
        return Ok(());
    };

    error!(tenant_id = %raw, reason, "Rejected malformed tenant id");
    Err(SyncError::InvalidTenantId {
        tenant_id: raw.to_string(),
        reason,
    })
}

/// Build the canonical channel id for `(tenant, kind, scope)`.
///
/// # Errors
///
/// - `SyncError::InvalidTenantId` - tenant id empty or containing `:`
/// - `SyncError::InvalidChannel` - scope missing for a scoped kind, present
///   for an org-wide kind, or itself containing `:`
pub fn channel_for(
    tenant_id: &TenantId,
    kind: ChannelKind,
    scope_id: Option<&str>,
) -> Result<ChannelId, SyncError> {
    validate_tenant_id(tenant_id)?;

    match (kind.is_scoped(), scope_id) {
        (true, Some(scope)) => {
            if scope.is_empty() || scope.contains(DELIMITER) {
                return Err(SyncError::InvalidChannel(format!(
                    "scope id {scope:?} is empty or contains the delimiter"
                )));
            }
            Ok(ChannelId(format!(
                "{NAMESPACE_PREFIX}{DELIMITER}{tenant_id}{DELIMITER}{kind}{DELIMITER}{scope}"
            )))
        }
        (false, None) => Ok(ChannelId(format!(
            "{NAMESPACE_PREFIX}{DELIMITER}{tenant_id}{DELIMITER}{kind}"
        ))),
        (true, None) => Err(SyncError::InvalidChannel(format!(
            "{kind} channels require a scope id"
        ))),
        (false, Some(_)) => Err(SyncError::InvalidChannel(format!(
            "{kind} channels are org-wide and take no scope id"
        ))),
    }
}

/// The board mutation channel for `board_id`.
pub fn board_channel(tenant_id: &TenantId, board_id: &BoardId) -> Result<ChannelId, SyncError> {
    channel_for(tenant_id, ChannelKind::Board, Some(board_id.as_str()))
}

/// Parse the tenant out of a canonical channel string.
///
/// Returns `None` for anything that does not match the canonical pattern;
/// never panics on malformed input.
#[must_use]
pub fn extract_tenant_id(channel: &str) -> Option<TenantId> {
    let mut segments = channel.split(DELIMITER);

    if segments.next()? != NAMESPACE_PREFIX {
        return None;
    }
    let tenant = segments.next().filter(|t| !t.is_empty())?;
    let kind = ChannelKind::parse(segments.next()?)?;
    let scope = segments.next();
    if segments.next().is_some() {
        return None;
    }

    match (kind.is_scoped(), scope) {
        (true, Some(scope)) if !scope.is_empty() => Some(TenantId::new(tenant)),
        (false, None) => Some(TenantId::new(tenant)),
        _ => None,
    }
}

/// Fail loudly unless `channel` belongs to `caller_tenant`.
///
/// Malformed channels can never prove ownership and fail the same way.
///
/// # Errors
///
/// `SyncError::TenantIsolationViolation`, logged as a security event.
pub fn assert_ownership(channel: &ChannelId, caller_tenant: &TenantId) -> Result<(), SyncError> {
    match extract_tenant_id(channel.as_str()) {
        Some(owner) if owner == *caller_tenant => Ok(()),
        owner => {
            error!(
                channel = %channel,
                caller_tenant = %caller_tenant,
                owner = ?owner.as_ref().map(TenantId::as_str),
                "SECURITY: tenant isolation violation"
            );
            Err(SyncError::TenantIsolationViolation {
                channel: channel.as_str().to_string(),
                caller_tenant: caller_tenant.as_str().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tenant(raw: &str) -> TenantId {
        TenantId::new(raw)
    }

    #[test]
    fn test_board_channel_format() {
        let ch = channel_for(&tenant("org_1"), ChannelKind::Board, Some("b1")).unwrap();
        assert_eq!(ch.as_str(), "tenant:org_1:board:b1");
    }

    #[test]
    fn test_org_wide_channel_format() {
        let ch = channel_for(&tenant("org_1"), ChannelKind::Activity, None).unwrap();
        assert_eq!(ch.as_str(), "tenant:org_1:activity");
    }

    #[test]
    fn test_delimiter_in_tenant_rejected() {
        let result = channel_for(&tenant("org_1:board:b9"), ChannelKind::Board, Some("b1"));
        assert!(matches!(result, Err(SyncError::InvalidTenantId { .. })));

        let result = channel_for(&tenant(""), ChannelKind::Boards, None);
        assert!(matches!(result, Err(SyncError::InvalidTenantId { .. })));
    }

    #[test]
    fn test_scope_rules() {
        assert!(matches!(
            channel_for(&tenant("t"), ChannelKind::Board, None),
            Err(SyncError::InvalidChannel(_))
        ));
        assert!(matches!(
            channel_for(&tenant("t"), ChannelKind::Boards, Some("b1")),
            Err(SyncError::InvalidChannel(_))
        ));
        assert!(matches!(
            channel_for(&tenant("t"), ChannelKind::Presence, Some("b:1")),
            Err(SyncError::InvalidChannel(_))
        ));
    }

    #[test]
    fn test_extract_rejects_malformed() {
        for raw in [
            "",
            "tenant",
            "tenant:",
            "tenant::board:b1",
            "tenant:org_1",
            "tenant:org_1:unknown:b1",
            "tenant:org_1:board",
            "tenant:org_1:board:",
            "tenant:org_1:activity:x",
            "tenant:org_1:board:b1:extra",
            "room:org_1:board:b1",
        ] {
            assert_eq!(extract_tenant_id(raw), None, "{raw:?} should not parse");
        }
    }

    #[test]
    fn test_ownership_example() {
        let ch = ChannelId::from_raw("tenant:org_1:board:b1");
        assert!(matches!(
            assert_ownership(&ch, &tenant("org_2")),
            Err(SyncError::TenantIsolationViolation { .. })
        ));
        assert!(assert_ownership(&ch, &tenant("org_1")).is_ok());
    }

    #[test]
    fn test_malformed_channel_fails_ownership() {
        let ch = ChannelId::from_raw("tenant:org_1");
        assert!(assert_ownership(&ch, &tenant("org_1")).is_err());
    }

    fn kind_strategy() -> impl Strategy<Value = ChannelKind> {
        prop::sample::select(ChannelKind::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_channel_round_trip(t in "[a-zA-Z0-9_-]{1,24}", kind in kind_strategy(), scope in "[a-z0-9]{1,12}") {
            let tenant_id = tenant(&t);
            let scope = kind.is_scoped().then_some(scope.as_str());
            let ch = channel_for(&tenant_id, kind, scope).unwrap();
            prop_assert_eq!(extract_tenant_id(ch.as_str()), Some(tenant_id));
        }

        #[test]
        fn prop_foreign_tenant_always_rejected(
            t in "[a-z0-9_]{1,16}",
            other in "[a-z0-9_]{1,16}",
            kind in kind_strategy(),
        ) {
            prop_assume!(t != other);
            let scope = kind.is_scoped().then_some("b1");
            let ch = channel_for(&tenant(&t), kind, scope).unwrap();
            let is_violation = matches!(
                assert_ownership(&ch, &tenant(&other)),
                Err(SyncError::TenantIsolationViolation { .. })
            );
            prop_assert!(is_violation);
        }
    }
}
