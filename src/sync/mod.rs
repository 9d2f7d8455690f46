// Live Sync Module - push channel with polling fallback
//
// Change events and poll ticks both end in the same refetch-and-replace of
// whole entity sets. The channel supervisor is a statig machine; the alert
// detectors fire only on observed edges.

pub mod alerts;
pub mod coordinator;
pub mod events;
pub mod snapshot;
pub mod supervisor;

pub use alerts::{CodeEdgeDetector, NewItemDetector, SyncAlert};
pub use coordinator::LiveSyncCoordinator;
pub use events::{ChangeKind, EntityKind, FeedMessage, RemoteEvent};
pub use snapshot::{SyncedView, TaskSnapshot};
pub use supervisor::{ChannelEvent, ChannelMode, ChannelSupervisor};
