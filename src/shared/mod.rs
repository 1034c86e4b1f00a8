pub mod errors;
pub mod fingerprint;
pub mod ids;

pub use errors::PipelineError;
pub use ids::{ProjectId, TableName, TenantId, UserId};
