// Domain models shared by the engine, the feed and the HTTP surface

mod connection;
mod feed;
mod network;
mod threat;
mod traffic;

pub use connection::{Connection, ConnectionDelta, ConnectionStatus, RawConnectionEvent};
pub use feed::{FeedSnapshot, FeedState, FeedUpdate};
pub use network::{InterfaceKind, NetworkStatus, NetworkStatusSnapshot, PathStatus, PathUpdate};
pub use threat::{MAX_SEVERITY, MIN_SEVERITY, ThreatEvent, ThreatType};
pub use traffic::{BYTES_PER_MB, RatePoint, TrafficSample, TrafficTotals};
