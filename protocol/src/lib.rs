pub mod error;
pub mod message;
pub mod value;

pub use error::{ErrorCode, WireError};
pub use message::{Envelope, MessageType};
pub use value::{Row, SqlValue};
