/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Owners (the accounts that fund jobs) share the BIGSERIAL key space.
pub type OwnerId = DbId;

/// Jobs are addressed by opaque UUIDs so ids cannot be enumerated.
pub type JobId = uuid::Uuid;

/// Assets share the job id scheme.
pub type AssetId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
