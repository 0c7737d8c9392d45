pub mod registry;
pub mod types;

pub use registry::CredentialSet;
pub use types::Credential;
