//! AMQP 0-9-1 method and content-header registry.

pub mod constants;
pub mod method;
pub mod properties;

pub use constants::reply_code;
pub use method::{Method, MethodArgs, MethodId};
pub use properties::{BasicProperties, ContentHeader};
