//! Data models
//!
//! Account records returned by the remote service, ledger rows, and the
//! small enums naming ledgers, relationship kinds and mutation directions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Timestamp layout used in the `Add Date` ledger column.
///
/// Example: "2024-12-01 10:00:00.123456+00:00"
pub const LEDGER_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

// =============================================================================
// Account Record
// =============================================================================

/// An account as seen through the remote listing endpoints
///
/// `did` is the stable identity. `handle` can be renamed and is only used
/// for ledger lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub handle: String,
    /// Display name (may be empty)
    pub display_name: String,
    pub did: String,
    /// Whether this account is in the operator's follower set
    pub follows_me: bool,
}

impl AccountRecord {
    pub fn new(handle: impl Into<String>, display_name: impl Into<String>, did: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            display_name: display_name.into(),
            did: did.into(),
            follows_me: false,
        }
    }
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// A single ledger row
///
/// Handle-only ledgers (do-not-remove, followback sources) leave every
/// other column empty, so all fields except the handle default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "Handle")]
    pub handle: String,
    #[serde(rename = "Display Name", default)]
    pub display_name: String,
    #[serde(rename = "DID", default)]
    pub did: String,
    #[serde(rename = "Follows Me", default, deserialize_with = "deserialize_flag")]
    pub follows_me: bool,
    /// When the follow/unfollow was performed
    #[serde(rename = "Add Date", default, deserialize_with = "deserialize_timestamp")]
    pub added_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// Build a ledger row from an account record
    pub fn from_account(account: &AccountRecord, added_at: Option<DateTime<Utc>>) -> Self {
        Self {
            handle: account.handle.clone(),
            display_name: account.display_name.clone(),
            did: account.did.clone(),
            follows_me: account.follows_me,
            added_at,
        }
    }

    /// Row holding only a handle
    pub fn handle_only(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            display_name: String::new(),
            did: String::new(),
            follows_me: false,
            added_at: None,
        }
    }

    pub fn to_account(&self) -> AccountRecord {
        AccountRecord {
            handle: self.handle.clone(),
            display_name: self.display_name.clone(),
            did: self.did.clone(),
            follows_me: self.follows_me,
        }
    }
}

/// Format a timestamp for the `Add Date` column
pub fn format_ledger_timestamp(at: &DateTime<Utc>) -> String {
    at.format(LEDGER_TIMESTAMP_FORMAT).to_string()
}

/// Parse an `Add Date` value
///
/// Accepts the ledger layout with or without fractional seconds and with
/// either `+00:00` or `+0000` offsets, plus RFC 3339.
pub fn parse_ledger_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"]
        .iter()
        .find_map(|format| DateTime::parse_from_str(raw, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Encode a follows-me flag the way the ledger files spell booleans
pub fn format_flag(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(parse_flag).unwrap_or(false))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };

    let parsed = parse_ledger_timestamp(&raw);
    if parsed.is_none() {
        tracing::warn!(value = %raw, "Ignoring unparsable ledger timestamp");
    }
    Ok(parsed)
}

// =============================================================================
// Ledgers
// =============================================================================

/// The tables held by a ledger store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ledger {
    /// Snapshot of who follows the operator
    MyFollowers,
    /// Snapshot of who the operator follows
    AccountsIFollow,
    /// Follows performed by the engine, timestamped
    AddedByEngine,
    /// Unfollows performed by the engine, timestamped
    Removed,
    /// Handles never to unfollow
    DoNotRemove,
    /// Operator-requested removals
    ManualRemove,
    /// Derived: followers not added by the engine
    FollowedManually,
    /// Seed handles whose followers become follow candidates
    FollowbackSources,
}

impl Ledger {
    pub const ALL: [Ledger; 8] = [
        Ledger::MyFollowers,
        Ledger::AccountsIFollow,
        Ledger::AddedByEngine,
        Ledger::Removed,
        Ledger::DoNotRemove,
        Ledger::ManualRemove,
        Ledger::FollowedManually,
        Ledger::FollowbackSources,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MyFollowers => "my_followers",
            Self::AccountsIFollow => "accounts_i_follow",
            Self::AddedByEngine => "added_by_engine",
            Self::Removed => "removed",
            Self::DoNotRemove => "do_not_remove",
            Self::ManualRemove => "manual_remove",
            Self::FollowedManually => "followed_manually",
            Self::FollowbackSources => "followback_sources",
        }
    }

    /// File name used by the CSV backend
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::MyFollowers => "my_followers.csv",
            Self::AccountsIFollow => "accounts_i_follow.csv",
            Self::AddedByEngine => "added_by_API.csv",
            Self::Removed => "removed_users.csv",
            Self::DoNotRemove => "do_not_remove.csv",
            Self::ManualRemove => "manual_remove.csv",
            Self::FollowedManually => "followed_manually.csv",
            Self::FollowbackSources => "followback_accounts.csv",
        }
    }

    /// Whether rows carry an `Add Date` column
    pub fn has_timestamp(&self) -> bool {
        matches!(self, Self::AddedByEngine | Self::Removed)
    }
}

impl std::fmt::Display for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Relationships and mutations
// =============================================================================

/// Which side of an account's graph to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// Accounts following the actor
    Followers,
    /// Accounts the actor follows
    Follows,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Followers => "followers",
            Self::Follows => "follows",
        }
    }
}

/// Direction of a graph mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Follow,
    Unfollow,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
        }
    }
}
