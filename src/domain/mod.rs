pub mod message;
pub mod query;
pub mod record;

pub use message::{Header, MessageBody, MessagePart, RawMessage};
pub use query::Query;
pub use record::PaymentRecord;
