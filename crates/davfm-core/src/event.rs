//! Notifications from the navigation engine to its consumer.
//!
//! The core never touches UI state directly: every visible change is
//! announced as a [`NavEvent`] on the channel handed to
//! [`crate::nav::NavigationEngine::new`]. Node payloads are read back
//! through the engine's accessors.

use crate::model::Resource;
use crate::nav::NodeId;

/// A state change the UI should reflect.
#[derive(Debug, Clone)]
pub enum NavEvent {
    /// The tree root was rebuilt (host switch).
    RootChanged { node: NodeId },
    /// A node finished loading and now carries children.
    NodeExpanded { node: NodeId },
    /// A node was collapsed; its children were discarded.
    NodeCollapsed { node: NodeId },
    /// Loading a node's children failed. The node is in the `Error` state;
    /// its previous children are untouched.
    NodeLoadFailed { node: NodeId, message: String },
    /// The current-directory selection moved.
    SelectionChanged { node: NodeId },
    /// The flat listing for the selected directory is ready,
    /// directories first, name-sorted.
    ListingReady {
        path: String,
        resources: Vec<Resource>,
    },
    /// The flat listing for the selected directory failed; the previous
    /// listing should be left as-is.
    ListingFailed { path: String, message: String },
}
