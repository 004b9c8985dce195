pub mod command;
pub mod security;
pub mod snapshot;
pub mod threat;

pub use command::*;
pub use security::*;
pub use snapshot::*;
pub use threat::*;
