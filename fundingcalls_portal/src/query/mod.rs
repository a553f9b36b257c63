mod filter;
pub use self::filter::{CallStatus, FilterState, Programme};
