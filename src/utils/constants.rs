/// Queue addresses ending with this suffix are FIFO queues.
pub const FIFO_QUEUE_SUFFIX: &str = ".fifo";

/// Maximum number of entries the service accepts in one batch call.
pub const MAX_BATCH_SIZE: usize = 10;

pub const MAX_DELAY_SECONDS: u32 = 900;
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;
pub const MAX_VISIBILITY_TIMEOUT: u32 = 43_200;
pub const DEFAULT_VISIBILITY_TIMEOUT: u32 = 30;

/// FIFO deduplication window.
pub const DEDUPLICATION_WINDOW_SECS: u64 = 300;

// Reserved metadata keys
pub const METADATA_ID: &str = "__id__";
pub const METADATA_MD5: &str = "md5";
pub const METADATA_RECEIPT_HANDLE: &str = "receiptHandle";

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_KEY_PREFIX: &str = "qrush:sqs";
