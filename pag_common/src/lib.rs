mod amount;
mod id;

pub use amount::{Amount, AmountConversionError, Currency};
pub use id::Id;
