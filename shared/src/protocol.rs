/// Service annotation holding the DNS suffix used to build per-tag URLs
pub const ANNOTATION_BASE_URL: &str = "baseurl";

/// Service annotation naming the serverless NEG that fronts the service
pub const ANNOTATION_SERVERLESS_NEG: &str = "serverless-neg";

/// Placeholders substituted in a serverless NEG URL mask
pub const MASK_TAG_PLACEHOLDER: &str = "<tag>";
pub const MASK_SERVICE_PLACEHOLDER: &str = "<service>";

/// Cloud console deep link base for Cloud Run services
pub const CONSOLE_RUN_DETAIL: &str = "https://console.cloud.google.com/run/detail";

/// HTTP paths served by the daemon
pub const PAGE_PATH: &str = "/";
pub const DATA_PATH: &str = "/data";
pub const HEALTH_PATH: &str = "/healthz";

/// Environment variables read at startup
pub const ENV_PROJECT: &str = "CRRTUV_PROJECT";
pub const ENV_LOCATION: &str = "CRRTUV_LOCATION";
pub const ENV_IDENTIFYING_LABEL: &str = "CRRTUV_IDENTIFYING_LABEL";
pub const ENV_MAX_REVISIONS: &str = "CRRTUV_MAX_REVISIONS";
pub const ENV_TIMEZONE: &str = "CRRTUV_TIMEZONE";
pub const ENV_MAX_CONCURRENT_LOOKUPS: &str = "CRRTUV_MAX_CONCURRENT_LOOKUPS";
pub const ENV_ACCESS_TOKEN: &str = "CRRTUV_ACCESS_TOKEN";
pub const ENV_LISTEN: &str = "CRRTUV_LISTEN";
pub const ENV_STATIC_PAGE: &str = "CRRTUV_STATIC_PAGE";
pub const ENV_LOG_LEVEL: &str = "CRRTUV_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "CRRTUV_LOG_FORMAT";
