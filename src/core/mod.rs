// Domain-layer modules and shared errors/models
pub mod models {
    pub use crate::models::*;
}

pub mod merge {
    pub use crate::merge::*;
}

pub mod pipeline {
    pub use crate::pipeline::*;
}

pub mod errors {
    pub use crate::errors::*;
}
