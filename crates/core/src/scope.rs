//! Read and write scopes.
//!
//! A [`ReadScope`] decides whether objects met while reading are interned into
//! the shared world or kept private to one read. A [`WriteScope`] decides how
//! much of an object a given recipient is allowed to see.

use crate::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while building or parsing scopes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// A client scope was requested without naming the player it is for.
    #[error("client write scope requires a player")]
    MissingPlayer,
    /// A server or save scope was given a player.
    #[error("{kind} write scope must not carry a player (got {player})")]
    UnexpectedPlayer {
        /// The scope kind that was requested.
        kind: WriteScopeKind,
        /// The player that was supplied.
        player: ObjectId,
    },
    /// Unknown scope name.
    #[error("unknown scope name {0:?}")]
    UnknownName(String),
}

/// Interning policy for one read operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadScope {
    /// Authoritative read on the server; interns and may build server variants.
    Server,
    /// Ordinary interning read.
    #[default]
    Normal,
    /// Non-interning read; new objects stay private to the read.
    NoIntern,
}

impl ReadScope {
    /// Whether newly met ids are registered in the shared world.
    pub fn should_intern(self) -> bool {
        !matches!(self, ReadScope::NoIntern)
    }

    /// Whether server-only object variants may be constructed.
    pub fn allows_server_variant(self) -> bool {
        matches!(self, ReadScope::Server)
    }

    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ReadScope::Server => "server",
            ReadScope::Normal => "normal",
            ReadScope::NoIntern => "nointern",
        }
    }
}

impl fmt::Display for ReadScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadScope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(ReadScope::Server),
            "normal" => Ok(ReadScope::Normal),
            "nointern" => Ok(ReadScope::NoIntern),
            other => Err(ScopeError::UnknownName(other.to_string())),
        }
    }
}

/// The recipient class of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteScopeKind {
    /// A specific player's client; output is redacted for that player.
    Client,
    /// Full state for the server.
    Server,
    /// Full state, complete enough to rebuild the world from nothing.
    Save,
}

impl WriteScopeKind {
    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            WriteScopeKind::Client => "client",
            WriteScopeKind::Server => "server",
            WriteScopeKind::Save => "save",
        }
    }
}

impl fmt::Display for WriteScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteScopeKind {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(WriteScopeKind::Client),
            "server" => Ok(WriteScopeKind::Server),
            "save" => Ok(WriteScopeKind::Save),
            other => Err(ScopeError::UnknownName(other.to_string())),
        }
    }
}

/// Objects whose visibility can be restricted per player.
///
/// The default answer is "visible"; entity types with private state override
/// it. Only a client write scope ever asks.
pub trait Visible {
    /// Whether `player` may observe this object.
    fn visible_to(&self, _player: &ObjectId) -> bool {
        true
    }
}

/// Redaction policy for one write operation.
///
/// Fields are private so a scope can only be obtained through a validating
/// constructor: a client scope always names its player, the others never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WriteScope {
    kind: WriteScopeKind,
    player: Option<ObjectId>,
}

impl WriteScope {
    /// Scope for a write destined to `player`'s client.
    pub fn client(player: ObjectId) -> Self {
        Self {
            kind: WriteScopeKind::Client,
            player: Some(player),
        }
    }

    /// Full-fidelity scope for the server.
    pub fn server() -> Self {
        Self {
            kind: WriteScopeKind::Server,
            player: None,
        }
    }

    /// Full-fidelity scope for save files.
    pub fn save() -> Self {
        Self {
            kind: WriteScopeKind::Save,
            player: None,
        }
    }

    /// Build a scope from loose parts, rejecting inconsistent combinations.
    pub fn new(kind: WriteScopeKind, player: Option<ObjectId>) -> Result<Self, ScopeError> {
        let scope = Self { kind, player };
        scope.check_valid()?;
        Ok(scope)
    }

    /// The recipient class.
    pub fn kind(&self) -> WriteScopeKind {
        self.kind
    }

    /// The player this write is being prepared for, if any.
    pub fn player(&self) -> Option<&ObjectId> {
        self.player.as_ref()
    }

    /// Whether this is a client scope.
    pub fn is_client(&self) -> bool {
        self.kind == WriteScopeKind::Client
    }

    /// Whether the output must be complete enough to rebuild the world.
    pub fn is_save_complete(&self) -> bool {
        self.kind == WriteScopeKind::Save
    }

    /// Whether the scope is internally consistent.
    pub fn is_valid(&self) -> bool {
        self.check_valid().is_ok()
    }

    /// Explain why the scope is inconsistent, if it is.
    pub fn check_valid(&self) -> Result<(), ScopeError> {
        match (self.kind, &self.player) {
            (WriteScopeKind::Client, None) => Err(ScopeError::MissingPlayer),
            (WriteScopeKind::Client, Some(_)) => Ok(()),
            (kind, Some(player)) => Err(ScopeError::UnexpectedPlayer {
                kind,
                player: player.clone(),
            }),
            (_, None) => Ok(()),
        }
    }

    /// Whether this is a client scope for exactly `player`.
    pub fn is_valid_for(&self, player: &ObjectId) -> bool {
        self.is_client() && self.player.as_ref() == Some(player)
    }

    /// Whether `object` may be written under this scope.
    pub fn valid_for<V: Visible + ?Sized>(&self, object: &V) -> bool {
        match &self.player {
            Some(player) if self.is_client() => object.visible_to(player),
            _ => true,
        }
    }
}

impl fmt::Display for WriteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.player {
            Some(player) => write!(f, "{}({})", self.kind, player),
            None => write!(f, "{}", self.kind),
        }
    }
}
