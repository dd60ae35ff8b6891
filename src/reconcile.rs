use anyhow::{bail, Result};

use crate::diff::{detect_new_items, detect_removed_items, items_changed};
use crate::ledger::{Action, ActionKind, Ledger};
use crate::piped::ServerApi;
use crate::state::{PlaylistState, SyncState};

/// Drives one sync pass across all configured servers.
///
/// The baseline loaded from disk is never touched while diffing; every
/// change lands in a working copy, which the caller persists only after the
/// pass has finished. The left-over snapshot of the todo queue is taken once
/// up front and consulted read-only, so a diff that conflicts with an action
/// a server never received can be suppressed.
pub struct Reconciler {
    servers: Vec<Box<dyn ServerApi>>,
    baseline: SyncState,
    working: SyncState,
    left_over: Ledger,
}

impl Reconciler {
    pub fn new(baseline: SyncState, servers: Vec<Box<dyn ServerApi>>) -> Self {
        let left_over = baseline.todo.clone();
        let working = baseline.clone();
        Self {
            servers,
            baseline,
            working,
            left_over,
        }
    }

    /// Run the pass: diff every server against the baseline, then drain the
    /// todo queue against all target servers. Returns the new baseline for
    /// the caller to persist.
    ///
    /// A server that cannot be read is skipped for the pass; actions
    /// targeting it simply fail during the drain and stay queued.
    pub async fn run(mut self) -> SyncState {
        for idx in 0..self.servers.len() {
            if let Err(e) = self.sync_server(idx).await {
                tracing::warn!(
                    "Skipping server {} for this pass: {}",
                    self.servers[idx].url(),
                    e
                );
            }
        }
        self.drain().await;
        self.working
    }

    async fn sync_server(&mut self, idx: usize) -> Result<()> {
        let url = self.servers[idx].url().to_string();
        let subscriptions = self.servers[idx].get_subscriptions().await?;
        let playlists = self.servers[idx].get_playlists().await?;

        let baseline_names: Vec<String> = self
            .baseline
            .playlists
            .iter()
            .map(|p| p.name.clone())
            .collect();
        let live_names: Vec<String> = playlists.iter().map(|p| p.name.clone()).collect();

        if self.baseline.servers.contains(&url) {
            tracing::info!("Checking for removed subscriptions on {}", url);
            let removed: Vec<String> =
                detect_removed_items(&self.baseline.subscriptions, &subscriptions, |s| s.as_str())
                    .into_iter()
                    .map(|(_, channel)| channel.clone())
                    .collect();
            for channel in &removed {
                self.queue_unsubscribe(idx, channel);
            }

            tracing::info!("Checking for removed playlists on {}", url);
            let removed: Vec<String> =
                detect_removed_items(&baseline_names, &live_names, |s| s.as_str())
                    .into_iter()
                    .map(|(_, name)| name.clone())
                    .collect();
            for name in &removed {
                self.queue_delete_playlist(idx, name);
            }
        } else {
            // First contact: absence of data on a fresh server is not a
            // deletion, so removal detection must not run. Push everything
            // instead.
            tracing::info!("New server {} added to the sync set", url);
            self.push_full_state(idx).await?;
        }

        tracing::info!("Checking for new subscriptions on {}", url);
        let added: Vec<String> =
            detect_new_items(&self.baseline.subscriptions, &subscriptions, |s| s.as_str())
                .into_iter()
                .map(|(_, channel)| channel.clone())
                .collect();
        for channel in &added {
            self.queue_subscribe(idx, channel);
        }

        tracing::info!("Checking for new playlists on {}", url);
        let added: Vec<String> = detect_new_items(&baseline_names, &live_names, |s| s.as_str())
            .into_iter()
            .map(|(_, name)| name.clone())
            .collect();
        for name in &added {
            // Items are only fetched once a playlist is known to be new.
            let Some(remote) = playlists.iter().find(|p| p.name == *name) else {
                continue;
            };
            let items = self.servers[idx].get_playlist_items(&remote.id).await?;
            self.queue_create_playlist(idx, name, items);
        }

        for remote in &playlists {
            let Some(saved) = self.baseline.playlist(&remote.name) else {
                // Newly observed above; nothing recorded to compare against.
                continue;
            };
            let saved_items = saved.items.clone();
            tracing::info!("Checking playlist {} for changed items on {}", remote.name, url);
            let live_items = self.servers[idx].get_playlist_items(&remote.id).await?;
            if items_changed(&saved_items, &live_items) {
                self.queue_update_playlist(idx, &remote.name, live_items);
            }
        }

        if !self.working.servers.contains(&url) {
            self.working.servers.push(url);
        }
        Ok(())
    }

    /// Bootstrap a server seen for the first time with the full working
    /// baseline.
    async fn push_full_state(&self, idx: usize) -> Result<()> {
        let server = self.servers[idx].as_ref();
        tracing::info!("Pushing current state to {}", server.url());
        for channel in &self.working.subscriptions {
            server.subscribe(channel).await?;
        }
        for playlist in &self.working.playlists {
            let playlist_id = server.create_playlist(&playlist.name).await?;
            if !playlist.items.is_empty() {
                server.add_playlist_items(&playlist_id, &playlist.items).await?;
            }
        }
        Ok(())
    }

    /// Every server except the one the change was observed on.
    fn targets(&self, origin: usize) -> Vec<usize> {
        (0..self.servers.len()).filter(|&i| i != origin).collect()
    }

    fn queue_subscribe(&mut self, origin: usize, channel: &str) {
        if !self.working.subscriptions.iter().any(|c| c == channel) {
            self.working.subscriptions.push(channel.to_string());
        }
        let targets = self.targets(origin);
        self.working.todo.add(ActionKind::Subscribe, channel, targets);
    }

    fn queue_unsubscribe(&mut self, origin: usize, channel: &str) {
        if self.left_over.has_left_over(ActionKind::Subscribe, origin) {
            tracing::warn!(
                "Server state not up to date: ignoring unsubscribe of {} seen on {}",
                channel,
                self.servers[origin].url()
            );
            return;
        }
        self.working.subscriptions.retain(|c| c != channel);
        let targets = self.targets(origin);
        self.working.todo.add(ActionKind::Unsubscribe, channel, targets);
    }

    fn queue_create_playlist(&mut self, origin: usize, name: &str, items: Vec<String>) {
        if self.left_over.has_left_over(ActionKind::DeletePlaylist, origin) {
            tracing::warn!(
                "Server state not up to date: ignoring new playlist {} seen on {}",
                name,
                self.servers[origin].url()
            );
            return;
        }
        if self.working.playlist(name).is_none() {
            self.working.playlists.push(PlaylistState {
                name: name.to_string(),
                items,
            });
        }
        let targets = self.targets(origin);
        self.working.todo.add(ActionKind::CreatePlaylist, name, targets);
    }

    fn queue_delete_playlist(&mut self, origin: usize, name: &str) {
        if self.left_over.has_left_over(ActionKind::CreatePlaylist, origin) {
            tracing::warn!(
                "Server state not up to date: ignoring deleted playlist {} seen on {}",
                name,
                self.servers[origin].url()
            );
            return;
        }
        self.working.playlists.retain(|p| p.name != name);
        let targets = self.targets(origin);
        self.working.todo.add(ActionKind::DeletePlaylist, name, targets);
    }

    fn queue_update_playlist(&mut self, origin: usize, name: &str, items: Vec<String>) {
        if self.left_over.has_left_over(ActionKind::UpdatePlaylist, origin) {
            tracing::warn!(
                "Server state not up to date: ignoring changed playlist {} seen on {}",
                name,
                self.servers[origin].url()
            );
            return;
        }
        if let Some(playlist) = self.working.playlist_mut(name) {
            playlist.items = items;
        }
        let targets = self.targets(origin);
        self.working.todo.add(ActionKind::UpdatePlaylist, name, targets);
    }

    /// Apply every queued action to every server it targets. A failed
    /// server goes back into a fresh pending set; the action is re-queued
    /// with only those servers, so the next pass retries exactly the ones
    /// that missed out.
    async fn drain(&mut self) {
        let mut todos = std::mem::take(&mut self.working.todo);
        let playlists = self.working.playlists.clone();

        while let Some(action) = todos.pop() {
            tracing::info!("Processing todo {:?} for {}", action.kind(), action.key());
            let mut pending = Vec::new();
            for &server_idx in action.servers() {
                let Some(server) = self.servers.get(server_idx) else {
                    tracing::warn!(
                        "Dropping unknown server index {} from pending action",
                        server_idx
                    );
                    continue;
                };
                if let Err(e) = apply_action(server.as_ref(), &playlists, &action).await {
                    tracing::warn!(
                        "Failed to apply {:?} for {} on {}: {}",
                        action.kind(),
                        action.key(),
                        server.url(),
                        e
                    );
                    pending.push(server_idx);
                }
            }
            if !pending.is_empty() {
                self.working.todo.push(action.with_servers(pending));
            }
        }
    }
}

/// Translate one queued action into remote calls against one server.
///
/// Playlist ids are resolved by name here, at apply time, because ids are
/// not stable across servers.
async fn apply_action(
    server: &dyn ServerApi,
    playlists: &[PlaylistState],
    action: &Action,
) -> Result<()> {
    match action {
        Action::Subscribe { channel, .. } => server.subscribe(channel).await,
        Action::Unsubscribe { channel, .. } => server.unsubscribe(channel).await,
        Action::DeletePlaylist { name, .. } => {
            let remote = server.get_playlists().await?;
            // Absence counts as success: someone already deleted it.
            for playlist in remote.iter().filter(|p| p.name == *name) {
                server.delete_playlist(&playlist.id).await?;
            }
            Ok(())
        }
        Action::CreatePlaylist { name, .. } => {
            let Some(playlist) = playlists.iter().find(|p| p.name == *name) else {
                // Deleted again since it was queued; nothing left to create.
                return Ok(());
            };
            let playlist_id = server.create_playlist(name).await?;
            if !playlist.items.is_empty() {
                server.add_playlist_items(&playlist_id, &playlist.items).await?;
            }
            Ok(())
        }
        Action::UpdatePlaylist { name, .. } => {
            let Some(playlist) = playlists.iter().find(|p| p.name == *name) else {
                return Ok(());
            };
            let remote = server.get_playlists().await?;
            let mut updated = false;
            for entry in remote.iter().filter(|p| p.name == *name) {
                server.clear_playlist(&entry.id).await?;
                server.add_playlist_items(&entry.id, &playlist.items).await?;
                // Re-read and compare: a write that went through but did not
                // stick counts as a failure and stays queued for retry.
                let live = server.get_playlist_items(&entry.id).await?;
                if live != playlist.items {
                    bail!(
                        "playlist {} did not persist as written on {}",
                        name,
                        server.url()
                    );
                }
                updated = true;
            }
            if !updated {
                tracing::info!("Playlist {} missing on {}, creating it", name, server.url());
                let playlist_id = server.create_playlist(name).await?;
                if !playlist.items.is_empty() {
                    server.add_playlist_items(&playlist_id, &playlist.items).await?;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piped::RemotePlaylist;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct FakePlaylist {
        id: String,
        name: String,
        items: Vec<String>,
    }

    #[derive(Debug, Default)]
    struct FakeBackend {
        subscriptions: Vec<String>,
        playlists: Vec<FakePlaylist>,
        next_id: usize,
        fail_reads: bool,
        fail_writes: bool,
        truncate_adds: bool,
        calls: Vec<String>,
    }

    impl FakeBackend {
        fn playlist(&self, name: &str) -> Option<&FakePlaylist> {
            self.playlists.iter().find(|p| p.name == name)
        }
    }

    struct FakeServer {
        url: String,
        backend: Arc<Mutex<FakeBackend>>,
    }

    impl FakeServer {
        fn new(url: &str) -> (Self, Arc<Mutex<FakeBackend>>) {
            let backend = Arc::new(Mutex::new(FakeBackend::default()));
            (
                Self {
                    url: url.to_string(),
                    backend: backend.clone(),
                },
                backend,
            )
        }
    }

    #[async_trait]
    impl ServerApi for FakeServer {
        fn url(&self) -> &str {
            &self.url
        }

        async fn get_subscriptions(&self) -> Result<Vec<String>> {
            let backend = self.backend.lock().unwrap();
            if backend.fail_reads {
                bail!("connection refused");
            }
            Ok(backend.subscriptions.clone())
        }

        async fn subscribe(&self, channel_id: &str) -> Result<()> {
            let mut backend = self.backend.lock().unwrap();
            backend.calls.push(format!("subscribe:{channel_id}"));
            if backend.fail_writes {
                bail!("internal server error");
            }
            if !backend.subscriptions.iter().any(|c| c == channel_id) {
                backend.subscriptions.push(channel_id.to_string());
            }
            Ok(())
        }

        async fn unsubscribe(&self, channel_id: &str) -> Result<()> {
            let mut backend = self.backend.lock().unwrap();
            backend.calls.push(format!("unsubscribe:{channel_id}"));
            if backend.fail_writes {
                bail!("internal server error");
            }
            backend.subscriptions.retain(|c| c != channel_id);
            Ok(())
        }

        async fn get_playlists(&self) -> Result<Vec<RemotePlaylist>> {
            let backend = self.backend.lock().unwrap();
            if backend.fail_reads {
                bail!("connection refused");
            }
            Ok(backend
                .playlists
                .iter()
                .map(|p| RemotePlaylist {
                    id: p.id.clone(),
                    name: p.name.clone(),
                })
                .collect())
        }

        async fn create_playlist(&self, name: &str) -> Result<String> {
            let mut backend = self.backend.lock().unwrap();
            backend.calls.push(format!("create:{name}"));
            if backend.fail_writes {
                bail!("internal server error");
            }
            backend.next_id += 1;
            let id = format!("pl-{}", backend.next_id);
            backend.playlists.push(FakePlaylist {
                id: id.clone(),
                name: name.to_string(),
                items: Vec::new(),
            });
            Ok(id)
        }

        async fn delete_playlist(&self, playlist_id: &str) -> Result<()> {
            let mut backend = self.backend.lock().unwrap();
            backend.calls.push(format!("delete:{playlist_id}"));
            if backend.fail_writes {
                bail!("internal server error");
            }
            backend.playlists.retain(|p| p.id != playlist_id);
            Ok(())
        }

        async fn clear_playlist(&self, playlist_id: &str) -> Result<()> {
            let mut backend = self.backend.lock().unwrap();
            if backend.fail_writes {
                bail!("internal server error");
            }
            if let Some(playlist) = backend.playlists.iter_mut().find(|p| p.id == playlist_id) {
                playlist.items.clear();
            }
            Ok(())
        }

        async fn get_playlist_items(&self, playlist_id: &str) -> Result<Vec<String>> {
            let backend = self.backend.lock().unwrap();
            if backend.fail_reads {
                bail!("connection refused");
            }
            backend
                .playlists
                .iter()
                .find(|p| p.id == playlist_id)
                .map(|p| p.items.clone())
                .ok_or_else(|| anyhow!("no playlist {playlist_id}"))
        }

        async fn add_playlist_items(&self, playlist_id: &str, video_ids: &[String]) -> Result<()> {
            let mut backend = self.backend.lock().unwrap();
            if backend.fail_writes {
                bail!("internal server error");
            }
            let truncate = backend.truncate_adds;
            let Some(playlist) = backend.playlists.iter_mut().find(|p| p.id == playlist_id)
            else {
                bail!("no playlist {playlist_id}");
            };
            if truncate && video_ids.len() > 1 {
                playlist.items.push(video_ids[0].clone());
            } else {
                playlist.items.extend(video_ids.iter().cloned());
            }
            Ok(())
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn baseline(
        subscriptions: &[&str],
        playlists: &[(&str, &[&str])],
        servers: &[&str],
    ) -> SyncState {
        SyncState {
            subscriptions: strings(subscriptions),
            playlists: playlists
                .iter()
                .map(|(name, items)| PlaylistState {
                    name: name.to_string(),
                    items: strings(items),
                })
                .collect(),
            servers: strings(servers),
            todo: Ledger::default(),
        }
    }

    fn seed(backend: &Arc<Mutex<FakeBackend>>, subscriptions: &[&str], playlists: &[(&str, &[&str])]) {
        let mut backend = backend.lock().unwrap();
        backend.subscriptions = strings(subscriptions);
        for (i, (name, items)) in playlists.iter().enumerate() {
            backend.playlists.push(FakePlaylist {
                id: format!("seeded-{i}"),
                name: name.to_string(),
                items: strings(items),
            });
        }
    }

    fn sessions(servers: Vec<FakeServer>) -> Vec<Box<dyn ServerApi>> {
        servers
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn ServerApi>)
            .collect()
    }

    #[tokio::test]
    async fn test_unchanged_servers_queue_nothing() {
        let (server0, backend0) = FakeServer::new("https://one.example");
        let (server1, backend1) = FakeServer::new("https://two.example");
        seed(&backend0, &["A"], &[("Favorites", &["x"])]);
        seed(&backend1, &["A"], &[("Favorites", &["x"])]);

        let state = baseline(
            &["A"],
            &[("Favorites", &["x"])],
            &["https://one.example", "https://two.example"],
        );
        let result = Reconciler::new(state, sessions(vec![server0, server1]))
            .run()
            .await;

        assert!(result.todo.is_empty());
        assert_eq!(result.subscriptions, strings(&["A"]));
        assert!(backend0.lock().unwrap().calls.is_empty());
        assert!(backend1.lock().unwrap().calls.is_empty());

        // Replaying the identical pass against the new baseline stays quiet.
        let (server0, backend0) = FakeServer::new("https://one.example");
        let (server1, backend1) = FakeServer::new("https://two.example");
        seed(&backend0, &["A"], &[("Favorites", &["x"])]);
        seed(&backend1, &["A"], &[("Favorites", &["x"])]);
        let replay = Reconciler::new(result, sessions(vec![server0, server1]))
            .run()
            .await;
        assert!(replay.todo.is_empty());
        assert_eq!(replay.subscriptions, strings(&["A"]));
    }

    #[tokio::test]
    async fn test_subscription_add_and_remove_scenario() {
        let (server0, backend0) = FakeServer::new("https://one.example");
        let (server1, backend1) = FakeServer::new("https://two.example");
        seed(&backend0, &["A", "C"], &[]);
        seed(&backend1, &["A", "B"], &[]);

        let state = baseline(&["A", "B"], &[], &["https://one.example", "https://two.example"]);
        let result = Reconciler::new(state, sessions(vec![server0, server1]))
            .run()
            .await;

        assert_eq!(result.subscriptions, strings(&["A", "C"]));
        assert!(result.todo.is_empty());

        // Server 1 was brought in line; server 0 originated both changes and
        // was never targeted.
        let backend1 = backend1.lock().unwrap();
        assert_eq!(backend1.subscriptions, strings(&["A", "C"]));
        assert!(backend1.calls.contains(&"subscribe:C".to_string()));
        assert!(backend1.calls.contains(&"unsubscribe:B".to_string()));
        assert!(backend0.lock().unwrap().calls.is_empty());
    }

    #[tokio::test]
    async fn test_left_over_create_suppresses_delete_diff() {
        let (server0, backend0) = FakeServer::new("https://one.example");
        let (server1, backend1) = FakeServer::new("https://two.example");
        // Server 0 never received the playlist; server 1 has it.
        seed(&backend0, &[], &[]);
        seed(&backend1, &[], &[("Favorites", &["x"])]);

        let mut state = baseline(
            &[],
            &[("Favorites", &["x"])],
            &["https://one.example", "https://two.example"],
        );
        state.todo.add(ActionKind::CreatePlaylist, "Favorites", vec![0]);

        let result = Reconciler::new(state, sessions(vec![server0, server1]))
            .run()
            .await;

        // The missing playlist on server 0 must not be read as a deletion.
        assert!(result.playlist("Favorites").is_some());
        assert!(!result
            .todo
            .iter()
            .any(|a| a.kind() == ActionKind::DeletePlaylist));

        // Draining the left-over action finally created it on server 0.
        let backend0 = backend0.lock().unwrap();
        assert!(backend0.calls.contains(&"create:Favorites".to_string()));
        assert_eq!(backend0.playlist("Favorites").unwrap().items, strings(&["x"]));
        assert!(!backend0.calls.iter().any(|c| c.starts_with("delete:")));
        assert!(!backend1.lock().unwrap().calls.iter().any(|c| c.starts_with("delete:")));
        assert!(result.todo.is_empty());
    }

    #[tokio::test]
    async fn test_drain_requeues_only_failed_servers() {
        let (server0, backend0) = FakeServer::new("https://one.example");
        let (server1, backend1) = FakeServer::new("https://two.example");
        let (server2, backend2) = FakeServer::new("https://three.example");
        for backend in [&backend0, &backend1, &backend2] {
            seed(backend, &["A"], &[]);
        }
        backend1.lock().unwrap().fail_writes = true;

        let mut state = baseline(
            &["A", "B"],
            &[],
            &[
                "https://one.example",
                "https://two.example",
                "https://three.example",
            ],
        );
        state.todo.add(ActionKind::Subscribe, "B", vec![0, 1, 2]);

        let result = Reconciler::new(state, sessions(vec![server0, server1, server2]))
            .run()
            .await;

        assert_eq!(result.todo.len(), 1);
        let entry = result.todo.iter().next().unwrap();
        assert_eq!(entry.kind(), ActionKind::Subscribe);
        assert_eq!(entry.key(), "B");
        assert_eq!(entry.servers(), &[1]);

        assert!(backend0.lock().unwrap().subscriptions.contains(&"B".to_string()));
        assert!(backend2.lock().unwrap().subscriptions.contains(&"B".to_string()));
        assert!(!backend1.lock().unwrap().subscriptions.contains(&"B".to_string()));
    }

    #[tokio::test]
    async fn test_new_server_receives_full_bootstrap() {
        let (server0, backend0) = FakeServer::new("https://one.example");
        let (server1, backend1) = FakeServer::new("https://two.example");
        seed(&backend0, &["A", "B"], &[("Favorites", &["x", "y"])]);
        // Server 1 is brand new and empty.

        let state = baseline(
            &["A", "B"],
            &[("Favorites", &["x", "y"])],
            &["https://one.example"],
        );
        let result = Reconciler::new(state, sessions(vec![server0, server1]))
            .run()
            .await;

        let backend1 = backend1.lock().unwrap();
        assert_eq!(backend1.subscriptions, strings(&["A", "B"]));
        assert_eq!(backend1.playlist("Favorites").unwrap().items, strings(&["x", "y"]));

        // Bootstrap must never be mistaken for mass deletion.
        assert!(result.todo.is_empty());
        assert_eq!(result.subscriptions, strings(&["A", "B"]));
        assert!(result.playlist("Favorites").is_some());
        assert!(result.servers.contains(&"https://two.example".to_string()));
        assert!(backend0.lock().unwrap().calls.is_empty());
    }

    #[tokio::test]
    async fn test_playlist_item_change_replicates_full_list() {
        let (server0, backend0) = FakeServer::new("https://one.example");
        let (server1, backend1) = FakeServer::new("https://two.example");
        seed(&backend0, &[], &[("Favorites", &["x", "y", "z"])]);
        seed(&backend1, &[], &[("Favorites", &["x", "y"])]);

        let state = baseline(
            &[],
            &[("Favorites", &["x", "y"])],
            &["https://one.example", "https://two.example"],
        );
        let result = Reconciler::new(state, sessions(vec![server0, server1]))
            .run()
            .await;

        assert_eq!(
            result.playlist("Favorites").unwrap().items,
            strings(&["x", "y", "z"])
        );
        assert!(result.todo.is_empty());
        assert_eq!(
            backend1.lock().unwrap().playlist("Favorites").unwrap().items,
            strings(&["x", "y", "z"])
        );
        assert!(backend0.lock().unwrap().calls.is_empty());
    }

    #[tokio::test]
    async fn test_update_verification_mismatch_requeues() {
        let (server0, backend0) = FakeServer::new("https://one.example");
        let (server1, backend1) = FakeServer::new("https://two.example");
        seed(&backend0, &[], &[("Favorites", &["x", "y", "z"])]);
        seed(&backend1, &[], &[("Favorites", &["x", "y"])]);
        // Server 1 silently drops items on bulk add.
        backend1.lock().unwrap().truncate_adds = true;

        let state = baseline(
            &[],
            &[("Favorites", &["x", "y"])],
            &["https://one.example", "https://two.example"],
        );
        let result = Reconciler::new(state, sessions(vec![server0, server1]))
            .run()
            .await;

        assert_eq!(result.todo.len(), 1);
        let entry = result.todo.iter().next().unwrap();
        assert_eq!(entry.kind(), ActionKind::UpdatePlaylist);
        assert_eq!(entry.key(), "Favorites");
        assert_eq!(entry.servers(), &[1]);
        assert!(backend0.lock().unwrap().calls.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_skipped_not_destroyed() {
        let (server0, backend0) = FakeServer::new("https://one.example");
        let (server1, backend1) = FakeServer::new("https://two.example");
        backend0.lock().unwrap().fail_reads = true;
        seed(&backend1, &["A"], &[]);

        let state = baseline(&["A"], &[], &["https://one.example", "https://two.example"]);
        let result = Reconciler::new(state, sessions(vec![server0, server1]))
            .run()
            .await;

        // No diffs were invented for the unreachable server.
        assert!(result.todo.is_empty());
        assert_eq!(result.subscriptions, strings(&["A"]));
        assert!(backend0.lock().unwrap().calls.is_empty());
        assert!(backend1.lock().unwrap().calls.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_server_index_is_dropped_from_todo() {
        let (server0, backend0) = FakeServer::new("https://one.example");
        seed(&backend0, &[], &[]);

        let mut state = baseline(&["B"], &[], &["https://one.example"]);
        // Index 5 refers to a server that is no longer configured.
        state.todo.add(ActionKind::Subscribe, "B", vec![0, 5]);

        let result = Reconciler::new(state, sessions(vec![server0])).run().await;

        assert!(result.todo.is_empty());
        assert!(backend0.lock().unwrap().subscriptions.contains(&"B".to_string()));
    }
}
