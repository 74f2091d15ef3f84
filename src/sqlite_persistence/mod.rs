mod versioned_schema;

pub use versioned_schema::{
    migrate_if_needed, read_schema_version, Column, SqlType, Table, VersionedSchema,
    BASE_DB_VERSION, DEFAULT_TIMESTAMP_MS,
};
