mod router;
mod sections;

pub use router::{ArtifactRouter, ArtifactStores, base_name};
pub use sections::extract_code;
