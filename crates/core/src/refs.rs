use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Aggregates addressable by a stable identifier.
pub trait HasId {
    /// Returns the aggregate identifier.
    fn ref_id(&self) -> Uuid;
}

/// Reference to an aggregate owned by another module.
///
/// `Stub` carries only the identifier and is what storage rehydrates when a
/// row stores a bare foreign key. `Loaded` wraps the full aggregate. The two
/// are structurally distinct, so code can never mistake a stub for a
/// legitimately empty aggregate: non-identifier fields are simply not there
/// to read until [`EntityRef::resolve`] has been called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRef<T> {
    Stub(Uuid),
    Loaded(T),
}

/// Raised when a stub is resolved against an aggregate with a different id.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("stub identifier {stub} does not match aggregate identifier {aggregate}")]
pub struct StubMismatch {
    pub stub: Uuid,
    pub aggregate: Uuid,
}

impl<T: HasId> EntityRef<T> {
    /// Builds a stub reference from an optional foreign key.
    ///
    /// An absent id yields an absent reference, never a stub wrapping a
    /// null identifier.
    pub fn from_id(id: Option<Uuid>) -> Option<Self> {
        id.map(Self::Stub)
    }

    /// Returns the referenced aggregate's identifier.
    ///
    /// Persisting a foreign key only ever reads this, so a stub and a
    /// loaded aggregate are interchangeable on the write path.
    pub fn id(&self) -> Uuid {
        match self {
            Self::Stub(id) => *id,
            Self::Loaded(value) => value.ref_id(),
        }
    }

    /// Returns the full aggregate when it has been loaded.
    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Stub(_) => None,
            Self::Loaded(value) => Some(value),
        }
    }

    /// Returns `true` when only the identifier is available.
    pub fn is_stub(&self) -> bool {
        matches!(self, Self::Stub(_))
    }

    /// Upgrades the reference with an aggregate fetched from its owning
    /// repository, verifying the identifiers agree.
    pub fn resolve(self, value: T) -> Result<Self, StubMismatch> {
        let expected = self.id();
        let actual = value.ref_id();
        if actual != expected {
            return Err(StubMismatch {
                stub: expected,
                aggregate: actual,
            });
        }
        Ok(Self::Loaded(value))
    }
}
