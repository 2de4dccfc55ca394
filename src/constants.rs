//! # Conformance Constants
//!
//! Operational boundaries shared by fixtures, adapters and scenarios.

/// Page size the service applies when a list request carries none
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Maximum length of a resource ID
pub const MAX_ID_LENGTH: usize = 63;

/// Length of the random suffix appended to fixture IDs
pub const DEFAULT_SUFFIX_LENGTH: usize = 8;

/// Attempts before a fixture ID collision becomes a fixture error
pub const MAX_FIXTURE_ATTEMPTS: usize = 16;

/// Default REST API prefix
pub const DEFAULT_API_PREFIX: &str = "/v1beta";

/// Default namespace used as the parent of pipelines and connections
pub const DEFAULT_NAMESPACE: &str = "namespaces/admin";

/// Default prefix for every fixture ID created by the suite
pub const DEFAULT_ID_PREFIX: &str = "cfm-";

/// Request headers understood by the service under test
pub mod headers {
    pub const USER_UID: &str = "jwt-sub";
    pub const DEFAULT_API_KEY: &str = "x-api-key";
}

/// Wire names of the response views
pub mod views {
    pub const BASIC: &str = "VIEW_BASIC";
    pub const FULL: &str = "VIEW_FULL";
}
