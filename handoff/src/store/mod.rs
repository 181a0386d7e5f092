//! Data store acting as the transaction's resource manager, and the write each
//! participant performs against it.

mod data_store;
mod file_data_store;
mod resource_operation;
mod statement;

pub use data_store::{DataStore, DataStoreProvider, Row};
pub use file_data_store::FileDataStore;
pub use resource_operation::ResourceOperation;
pub use statement::{is_identifier, WriteStatement};
