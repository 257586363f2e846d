//! Tree/table synchronization engine.
//!
//! [`NavigationEngine`] owns an arena of tree nodes, one per visible
//! directory, and keeps three consumers consistent: the lazily-expanded
//! tree, the flat listing of the selected directory, and deep-link
//! navigation. All mutation happens on the coordinating thread; listings
//! run as background tasks and come back as [`NavMessage`]s the owner
//! feeds into [`NavigationEngine::pump`].
//!
//! Every node carries a generation counter. Collapsing bumps it and
//! cancels the in-flight listing, so a result from a superseded expansion
//! can never resurrect discarded children — the engine drops any message
//! whose generation no longer matches.

use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::CoreResult;
use crate::event::NavEvent;
use crate::model::{Host, Resource};
use crate::nav::sort_resources;
use crate::repo::{path as rpath, ResourceRepository};
use crate::task::{spawn_task, TaskHandle, TaskKind};

/// Index of a node in the engine's arena.
pub type NodeId = usize;

/// Lifecycle of a node's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No children loaded; expanding will start a listing.
    Idle,
    /// A listing task is in flight.
    Loading,
    /// Children are populated.
    Loaded,
    /// The last listing failed; children are whatever they were before.
    Error,
}

/// Background listing results, delivered to [`NavigationEngine::pump`].
#[derive(Debug)]
pub enum NavMessage {
    /// Child directories of a tree node.
    DirsListed {
        node: NodeId,
        generation: u64,
        result: CoreResult<Vec<Resource>>,
    },
    /// Flat listing of the selected directory.
    Listed {
        seq: u64,
        path: String,
        result: CoreResult<Vec<Resource>>,
    },
}

struct NavNode {
    resource: Resource,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    expanded: bool,
    load_state: LoadState,
    generation: u64,
    task: Option<TaskHandle<()>>,
}

struct PendingNavigation {
    segments: Vec<String>,
    idx: usize,
    current: NodeId,
}

/// The tree/table synchronization state machine.
pub struct NavigationEngine {
    repo: Arc<dyn ResourceRepository>,
    host: Host,
    nodes: Vec<NavNode>,
    root: NodeId,
    selected: Option<NodeId>,
    pending: Option<PendingNavigation>,
    next_generation: u64,
    listing_seq: u64,
    listing_task: Option<TaskHandle<()>>,
    events: UnboundedSender<NavEvent>,
    msg_tx: UnboundedSender<NavMessage>,
}

impl NavigationEngine {
    /// Creates an engine over `repo` rooted at `host`'s root path.
    ///
    /// Returns the engine and the message receiver the owner must drain
    /// into [`NavigationEngine::pump`].
    pub fn new(
        repo: Arc<dyn ResourceRepository>,
        host: Host,
        events: UnboundedSender<NavEvent>,
    ) -> (Self, UnboundedReceiver<NavMessage>) {
        let (msg_tx, msg_rx) = unbounded_channel();
        let mut engine = Self {
            repo,
            host,
            nodes: Vec::new(),
            root: 0,
            selected: None,
            pending: None,
            next_generation: 0,
            listing_seq: 0,
            listing_task: None,
            events,
            msg_tx,
        };
        engine.rebuild_root();
        (engine, msg_rx)
    }

    /// Swaps the backend and rebuilds the tree from the new host's root.
    ///
    /// The previous arena is fully discarded — no node survives a host
    /// switch. When the host carries a last-accessed path, deep navigation
    /// towards it starts immediately.
    pub fn update_root(&mut self, host: Host, repo: Arc<dyn ResourceRepository>) {
        if let Some(task) = self.listing_task.take() {
            task.cancel();
        }
        self.listing_seq += 1;
        self.repo = repo;
        self.host = host;
        self.rebuild_root();
        if let Some(path) = self.host.last_accessed_path().map(str::to_string) {
            self.navigate_to(&path);
        }
    }

    /// Starts loading a node's child directories.
    ///
    /// Only acts on `Idle` nodes: a second expand while a listing is in
    /// flight is a no-op, and a `Loaded` node keeps its children.
    pub fn expand(&mut self, node: NodeId) {
        let Some(state) = self.nodes.get(node).map(|n| n.load_state) else {
            return;
        };
        if state != LoadState::Idle {
            return;
        }

        let generation = self.nodes[node].generation;
        self.nodes[node].load_state = LoadState::Loading;
        let path = self.nodes[node].resource.path().to_string();
        let repo = self.repo.clone();
        let tx = self.msg_tx.clone();
        let handle = spawn_task(TaskKind::List, move |ctx| async move {
            let result = repo.list_dirs(&path).await.map(|mut dirs| {
                sort_resources(&mut dirs, false);
                dirs
            });
            if !ctx.is_cancelled() {
                let _ = tx.send(NavMessage::DirsListed {
                    node,
                    generation,
                    result,
                });
            }
            Ok(())
        });
        self.nodes[node].task = Some(handle);
    }

    /// Discards a node's children and resets it to `Idle`.
    ///
    /// An in-flight listing is cancelled, and the generation bump makes
    /// sure its result is dropped even if it was already on the channel.
    pub fn collapse(&mut self, node: NodeId) {
        if self.nodes.get(node).is_none() {
            return;
        }
        if let Some(task) = self.nodes[node].task.take() {
            task.cancel();
        }
        self.nodes[node].generation = self.bump_generation();
        self.nodes[node].children.clear();
        self.nodes[node].expanded = false;
        self.nodes[node].load_state = LoadState::Idle;
        if self.pending_runs_through(node) {
            self.pending = None;
        }
        let _ = self.events.send(NavEvent::NodeCollapsed { node });
    }

    /// Moves the current-directory pointer and refreshes the flat listing.
    ///
    /// The listing runs independently of any tree expansion and may
    /// complete concurrently with it; only the most recent selection's
    /// result is applied.
    pub fn select(&mut self, node: NodeId) {
        let Some(path) = self
            .nodes
            .get(node)
            .map(|n| n.resource.path().to_string())
        else {
            return;
        };
        self.selected = Some(node);
        self.host.set_last_accessed_path(Some(path.clone()));
        let _ = self.events.send(NavEvent::SelectionChanged { node });

        if let Some(task) = self.listing_task.take() {
            task.cancel();
        }
        self.listing_seq += 1;
        let seq = self.listing_seq;
        let repo = self.repo.clone();
        let tx = self.msg_tx.clone();
        let handle = spawn_task(TaskKind::List, move |ctx| async move {
            let result = repo.list(&path, 1).await;
            if !ctx.is_cancelled() {
                let _ = tx.send(NavMessage::Listed { seq, path, result });
            }
            Ok(())
        });
        self.listing_task = Some(handle);
    }

    /// Selects the parent of the current selection, if any.
    pub fn select_parent(&mut self) {
        if let Some(parent) = self
            .selected
            .and_then(|node| self.nodes.get(node))
            .and_then(|n| n.parent)
        {
            self.select(parent);
        }
    }

    /// Resolves an absolute path into a chain of expansions ending in a
    /// selection.
    ///
    /// The walk expands one level at a time, resuming when that level's
    /// listing arrives, and matches each segment by exact (leniently
    /// percent-decoded, NFC-normalized) name. If the full path no longer
    /// exists, the deepest matched node is selected instead.
    pub fn navigate_to(&mut self, absolute_path: &str) {
        let remainder = absolute_path
            .strip_prefix(self.host.root())
            .unwrap_or(absolute_path);
        let segments = rpath::split_segments(remainder);
        if segments.is_empty() {
            self.select(self.root);
            return;
        }
        self.pending = Some(PendingNavigation {
            segments,
            idx: 0,
            current: self.root,
        });
        self.advance_navigation();
    }

    /// Applies a background listing result.
    pub fn pump(&mut self, message: NavMessage) {
        match message {
            NavMessage::DirsListed {
                node,
                generation,
                result,
            } => self.apply_dirs_listed(node, generation, result),
            NavMessage::Listed { seq, path, result } => self.apply_listing(seq, path, result),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The host currently shown, including the tracked last-accessed path.
    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn resource(&self, node: NodeId) -> Option<&Resource> {
        self.nodes.get(node).map(|n| &n.resource)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    pub fn load_state(&self, node: NodeId) -> Option<LoadState> {
        self.nodes.get(node).map(|n| n.load_state)
    }

    pub fn is_expanded(&self, node: NodeId) -> bool {
        self.nodes.get(node).map(|n| n.expanded).unwrap_or(false)
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    pub fn selected_resource(&self) -> Option<&Resource> {
        self.selected.and_then(|node| self.resource(node))
    }

    /// `true` while a deep navigation is waiting on listings.
    pub fn navigation_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn rebuild_root(&mut self) {
        self.nodes.clear();
        let resource = Resource::directory(
            self.host.root(),
            self.host.root(),
            self.host.id().clone(),
        );
        let generation = self.bump_generation();
        self.nodes.push(NavNode {
            resource,
            parent: None,
            children: Vec::new(),
            expanded: false,
            load_state: LoadState::Idle,
            generation,
            task: None,
        });
        self.root = 0;
        self.selected = None;
        self.pending = None;
        let _ = self.events.send(NavEvent::RootChanged { node: self.root });
    }

    fn bump_generation(&mut self) -> u64 {
        // Monotonic across host switches, so a listing spawned against a
        // previous tree can never match a node of the current one.
        self.next_generation += 1;
        self.next_generation
    }

    fn alloc_node(&mut self, parent: NodeId, resource: Resource) -> NodeId {
        let id = self.nodes.len();
        let generation = self.bump_generation();
        self.nodes.push(NavNode {
            resource,
            parent: Some(parent),
            children: Vec::new(),
            expanded: false,
            load_state: LoadState::Idle,
            generation,
            task: None,
        });
        id
    }

    fn pending_runs_through(&self, node: NodeId) -> bool {
        let Some(pending) = &self.pending else {
            return false;
        };
        let mut cursor = Some(pending.current);
        while let Some(id) = cursor {
            if id == node {
                return true;
            }
            cursor = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    fn apply_dirs_listed(
        &mut self,
        node: NodeId,
        generation: u64,
        result: CoreResult<Vec<Resource>>,
    ) {
        let matches = self
            .nodes
            .get(node)
            .map(|n| n.generation == generation && n.load_state == LoadState::Loading)
            .unwrap_or(false);
        if !matches {
            tracing::debug!(node, generation, "discarding superseded listing");
            return;
        }
        self.nodes[node].task = None;

        match result {
            Ok(dirs) => {
                let ids: Vec<NodeId> = dirs
                    .into_iter()
                    .map(|res| self.alloc_node(node, res))
                    .collect();
                // Children become visible as one batch, never incrementally.
                let entry = &mut self.nodes[node];
                entry.children = ids;
                entry.load_state = LoadState::Loaded;
                entry.expanded = true;
                let _ = self.events.send(NavEvent::NodeExpanded { node });
            }
            Err(e) => {
                self.nodes[node].load_state = LoadState::Error;
                let _ = self.events.send(NavEvent::NodeLoadFailed {
                    node,
                    message: e.message_chain().join(": "),
                });
            }
        }

        if self
            .pending
            .as_ref()
            .map(|p| p.current == node)
            .unwrap_or(false)
        {
            self.advance_navigation();
        }
    }

    fn apply_listing(&mut self, seq: u64, path: String, result: CoreResult<Vec<Resource>>) {
        if seq != self.listing_seq {
            tracing::debug!(%path, "discarding superseded flat listing");
            return;
        }
        self.listing_task = None;
        match result {
            Ok(mut resources) => {
                sort_resources(&mut resources, true);
                let _ = self.events.send(NavEvent::ListingReady { path, resources });
            }
            Err(e) => {
                let _ = self.events.send(NavEvent::ListingFailed {
                    path,
                    message: e.message_chain().join(": "),
                });
            }
        }
    }

    fn advance_navigation(&mut self) {
        while let Some(pending) = self.pending.take() {
            match self.nodes[pending.current].load_state {
                LoadState::Idle => {
                    let current = pending.current;
                    self.pending = Some(pending);
                    self.expand(current);
                    return;
                }
                LoadState::Loading => {
                    self.pending = Some(pending);
                    return;
                }
                LoadState::Error => {
                    self.select(pending.current);
                    return;
                }
                LoadState::Loaded => {
                    let want =
                        crate::nfc_string(&rpath::decode_segment_lenient(&pending.segments[pending.idx]));
                    let matched = self.nodes[pending.current]
                        .children
                        .iter()
                        .copied()
                        .find(|&child| self.nodes[child].resource.name() == want);
                    match matched {
                        None => {
                            // Path no longer exists; stop at the deepest match.
                            self.select(pending.current);
                            return;
                        }
                        Some(child) if pending.idx + 1 == pending.segments.len() => {
                            self.select(child);
                            return;
                        }
                        Some(child) => {
                            self.pending = Some(PendingNavigation {
                                segments: pending.segments,
                                idx: pending.idx + 1,
                                current: child,
                            });
                        }
                    }
                }
            }
        }
    }
}
