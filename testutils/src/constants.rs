pub const TEST_NAMESPACE: &str = "test";
pub const TEST_POD_NAME: &str = "the-pod";
pub const TEST_NODE_NAME: &str = "node0";

// The annotation and label the test fixtures carry so ownership selectors
// have something to match on
pub const MANAGED_ANNOTATION: &str = "fake-kubelet.io/managed";
pub const MANAGED_LABEL: &str = "type";
pub const MANAGED_LABEL_VALUE: &str = "fake";

pub const TEST_NODE_IP: &str = "10.11.12.13";
pub const TEST_POD_CIDR: &str = "10.0.0.0/24";
pub const TEST_VERSION: &str = "v0.4.0-test";

// Fixture objects get a fixed creation timestamp so rendered output is
// byte-stable across test runs
pub const TEST_CREATION_TS: i64 = 1234567890;
