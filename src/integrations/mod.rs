//! External service integrations.

pub mod gateway_client {
    pub use crate::gateway_client::*;
}

pub mod mock_gateway {
    pub use crate::mock_gateway::*;
}

pub mod session {
    pub use crate::session::*;
}
