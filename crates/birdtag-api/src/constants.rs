//! API constants

/// Versioned prefix of every API route
pub const API_PREFIX: &str = "/api/v0";

/// Header carrying the opaque caller identity
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Shown when a search is made without any tag
pub const SEARCH_USAGE_HINT: &str =
    "To search, use a GET request with parameters like ?userID=xyz&crow=2&owl=1";

/// Shown when a detection search carries no usable label
pub const DETECTION_USAGE_HINT: &str =
    "To search by detections, POST a body like {\"labels\": [\"crow\", \"crow\", \"owl\"]}";

pub const NO_RESULTS_MESSAGE: &str = "No results found";

/// Upper bound on JSON request bodies
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
