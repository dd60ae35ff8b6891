use serde::{Deserialize, Serialize};

/// The five corrective operations the sync can replay against a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Subscribe,
    Unsubscribe,
    CreatePlaylist,
    DeletePlaylist,
    UpdatePlaylist,
}

/// A pending corrective operation together with the indices of the servers
/// it still has to reach. Serialized with a `type` tag and the entity key
/// under `channel` or `name`, matching the persisted state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "subscribe")]
    Subscribe { channel: String, servers: Vec<usize> },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { channel: String, servers: Vec<usize> },
    #[serde(rename = "createPlaylist")]
    CreatePlaylist { name: String, servers: Vec<usize> },
    #[serde(rename = "deletePlaylist")]
    DeletePlaylist { name: String, servers: Vec<usize> },
    #[serde(rename = "updatePlaylist")]
    UpdatePlaylist { name: String, servers: Vec<usize> },
}

impl Action {
    pub fn new(kind: ActionKind, key: &str, servers: Vec<usize>) -> Self {
        let key = key.to_string();
        match kind {
            ActionKind::Subscribe => Action::Subscribe {
                channel: key,
                servers,
            },
            ActionKind::Unsubscribe => Action::Unsubscribe {
                channel: key,
                servers,
            },
            ActionKind::CreatePlaylist => Action::CreatePlaylist { name: key, servers },
            ActionKind::DeletePlaylist => Action::DeletePlaylist { name: key, servers },
            ActionKind::UpdatePlaylist => Action::UpdatePlaylist { name: key, servers },
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Subscribe { .. } => ActionKind::Subscribe,
            Action::Unsubscribe { .. } => ActionKind::Unsubscribe,
            Action::CreatePlaylist { .. } => ActionKind::CreatePlaylist,
            Action::DeletePlaylist { .. } => ActionKind::DeletePlaylist,
            Action::UpdatePlaylist { .. } => ActionKind::UpdatePlaylist,
        }
    }

    /// The channel id or playlist name this action operates on.
    pub fn key(&self) -> &str {
        match self {
            Action::Subscribe { channel, .. } | Action::Unsubscribe { channel, .. } => channel,
            Action::CreatePlaylist { name, .. }
            | Action::DeletePlaylist { name, .. }
            | Action::UpdatePlaylist { name, .. } => name,
        }
    }

    pub fn servers(&self) -> &[usize] {
        match self {
            Action::Subscribe { servers, .. }
            | Action::Unsubscribe { servers, .. }
            | Action::CreatePlaylist { servers, .. }
            | Action::DeletePlaylist { servers, .. }
            | Action::UpdatePlaylist { servers, .. } => servers,
        }
    }

    fn servers_mut(&mut self) -> &mut Vec<usize> {
        match self {
            Action::Subscribe { servers, .. }
            | Action::Unsubscribe { servers, .. }
            | Action::CreatePlaylist { servers, .. }
            | Action::DeletePlaylist { servers, .. }
            | Action::UpdatePlaylist { servers, .. } => servers,
        }
    }

    /// Same action retargeted at a different server set. Used when a drain
    /// re-queues the servers that failed.
    pub fn with_servers(mut self, mut servers: Vec<usize>) -> Self {
        servers.sort_unstable();
        servers.dedup();
        *self.servers_mut() = servers;
        self
    }
}

/// Durable queue of corrective operations.
///
/// Invariant: at most one entry exists per `(kind, key)` pair. Adding an
/// action that already has an entry folds the new target servers into the
/// existing one instead of appending a duplicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: Vec<Action>,
}

impl Ledger {
    /// Queue `kind` against `key` for every server in `targets`, folding
    /// into an existing entry when one matches.
    pub fn add(&mut self, kind: ActionKind, key: &str, mut targets: Vec<usize>) {
        for entry in &mut self.entries {
            if entry.kind() == kind && entry.key() == key {
                let servers = entry.servers_mut();
                for &target in &targets {
                    if !servers.contains(&target) {
                        servers.push(target);
                    }
                }
                servers.sort_unstable();
                return;
            }
        }
        targets.sort_unstable();
        targets.dedup();
        self.entries.push(Action::new(kind, key, targets));
    }

    /// True when the ledger holds an entry of `kind` still targeting
    /// `server`. Called on the pre-pass snapshot to suppress diffs that
    /// would conflict with an operation the server never received.
    pub fn has_left_over(&self, kind: ActionKind, server: usize) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.kind() == kind && entry.servers().contains(&server))
    }

    /// Most-recently-added entry first. Entries target disjoint identities,
    /// so no cross-entry ordering is needed.
    pub fn pop(&mut self) -> Option<Action> {
        self.entries.pop()
    }

    /// Re-append an action, typically one holding only its failed servers.
    pub fn push(&mut self, action: Action) {
        self.entries.push(action);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
