//! Sensor ingestion: decode 16-byte device records and persist them as
//! typed, timestamped values per device.

pub mod config;
pub mod db {
    pub mod error;
    pub mod models;
    pub mod store;
}
pub mod env_file;
pub mod schema;
pub mod sensor {
    pub mod device;
    pub mod record;
}
pub mod services {
    pub mod reader;
    pub mod seed;
}

pub use db::error::StoreError;
pub use db::store::{ValueFilter, ValueStore};
pub use sensor::device::{CharDevice, RecordSource};
pub use sensor::record::{DecodeError, RECORD_LEN, Record};
pub use services::reader::{Exit, Reader, ReaderError, ReaderSettings, ReaderState, RunSummary};
