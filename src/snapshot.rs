//! Snapshot model, most-recent selection, and ephemeral instance naming.
//!
//! Snapshots are observed from the control plane and never created here.
//! The short name of the chosen snapshot seeds both the disposable
//! instance's identifier and every dump output filename, so produced
//! artifacts can be traced back to their source snapshot.

use std::time::SystemTime;

use rand::Rng;

/// Control-plane ceiling on instance identifier length.
pub const MAX_INSTANCE_IDENTIFIER_LEN: usize = 63;

const RANDOM_TOKEN_LEN: usize = 8;

/// Lifecycle status reported for a snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SnapshotStatus {
    /// The snapshot is still being taken and cannot be restored yet.
    Creating,
    /// The snapshot is complete and restorable.
    Available,
    /// Any other status string reported by the control plane.
    Other(String),
}

impl SnapshotStatus {
    /// Parses a control-plane status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "creating" => Self::Creating,
            "available" => Self::Available,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns `true` when the snapshot can be restored.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// A point-in-time backup held by the provider, observed via the control
/// plane.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Snapshot {
    /// Fully qualified, possibly colon-namespaced identifier.
    pub identifier: String,
    /// Status at observation time.
    pub status: SnapshotStatus,
    /// Creation timestamp used for most-recent selection.
    pub created_at: SystemTime,
}

impl Snapshot {
    /// Returns the identifier's suffix after the last colon, or the whole
    /// identifier when it carries no namespace.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.identifier
            .rsplit(':')
            .next()
            .unwrap_or(self.identifier.as_str())
    }
}

/// Picks the most recently created snapshot with status `available`.
///
/// Ties on the creation timestamp resolve to the later element in document
/// order, matching the control plane's own listing order. Returns `None`
/// when no snapshot is available.
#[must_use]
pub fn select_latest_available(snapshots: Vec<Snapshot>) -> Option<Snapshot> {
    snapshots
        .into_iter()
        .filter(|snapshot| snapshot.status.is_available())
        .max_by_key(|snapshot| snapshot.created_at)
}

/// Generates a disposable instance identifier of the form
/// `dump-<8 random letters>-<snapshot short name>`, truncated to
/// [`MAX_INSTANCE_IDENTIFIER_LEN`].
///
/// The random token sits directly after the prefix so truncation only ever
/// removes short-name characters, never uniqueness-bearing ones. Two
/// concurrent runs whose tokens collide after truncation remain a known
/// residual risk. Tokens use lowercase letters only: the control plane
/// stores identifiers case-insensitively, so mixed case would not add
/// entropy.
#[must_use]
pub fn ephemeral_instance_identifier(short_name: &str) -> String {
    let mut rng = rand::thread_rng();
    let token: String = (0..RANDOM_TOKEN_LEN)
        .map(|_| rng.gen_range('a'..='z'))
        .collect();
    let mut identifier = format!("dump-{token}-{short_name}");
    truncate_identifier(&mut identifier);
    identifier
}

fn truncate_identifier(identifier: &mut String) {
    if identifier.len() <= MAX_INSTANCE_IDENTIFIER_LEN {
        return;
    }
    let mut cut = MAX_INSTANCE_IDENTIFIER_LEN;
    while !identifier.is_char_boundary(cut) {
        cut -= 1;
    }
    identifier.truncate(cut);
}
