pub mod channel;
pub mod queue;
pub mod memory;
pub mod fanout;
pub mod reconciliation;
pub mod worker;
pub mod consumer;

pub use channel::*;
pub use queue::*;
pub use memory::*;
pub use fanout::*;
pub use reconciliation::*;
pub use worker::*;
pub use consumer::*;
