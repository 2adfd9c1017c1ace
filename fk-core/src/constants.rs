// Field manager recorded on every PATCH this process issues
pub const FIELD_MANAGER: &str = "fake-kubelet";

// Defaults for the CLI flags the controller consumes
pub const DEFAULT_POD_CIDR: &str = "10.0.0.0/24";
pub const DEFAULT_NODE_IP: &str = "196.168.0.1";
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_LOCK_POD_PARALLELISM: usize = 16;
pub const DEFAULT_DELETE_POD_PARALLELISM: usize = 16;

// Worker lane queues are bounded; overflow drops the oldest entry
pub const DEFAULT_LANE_CAPACITY: usize = 1024;

// Heartbeat scheduling: per-node jitter spread, and the initial retry delay
// after a failed status write (doubles up to the heartbeat interval)
pub const HEARTBEAT_JITTER: f64 = 0.1;
pub const HEARTBEAT_RETRY_INITIAL: std::time::Duration = std::time::Duration::from_secs(1);

// How long we wait for in-flight workers after cancellation before the
// process exits anyways
pub const SHUTDOWN_DEADLINE_SECONDS: u64 = 10;

// Metric names
pub const NODE_STATUS_WRITES_METRIC: &str = "fake_kubelet_node_status_writes_total";
pub const POD_STATUS_WRITES_METRIC: &str = "fake_kubelet_pod_status_writes_total";
pub const POD_DELETES_METRIC: &str = "fake_kubelet_pod_deletes_total";
pub const QUEUE_DROPPED_METRIC: &str = "fake_kubelet_queue_dropped_total";
