pub mod process;
pub mod states;

pub use process::{FulfillmentError, FulfillmentProcess};
pub use states::{CompletionPolicy, FulfillmentEvent, FulfillmentTransition, FULL_PROGRESS};
