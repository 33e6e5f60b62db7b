pub mod about;
pub mod alphabet;
pub mod batch;
pub mod bundle;
pub mod community;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod feature_location;
pub mod flat_file;
pub mod genome;
pub mod genome_pair;
pub mod import_table;
pub mod matcher;
pub mod provenance;
pub mod store;
pub mod ticket;
pub mod validator;

pub use error::{ErrorCode, ReconcileError, Result};
