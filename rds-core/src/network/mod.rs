mod client;
mod session;

pub use client::{ClientConfig, CommandOutcome, SmartGenClient, SubmitPolicy, SubmitReport};
pub use session::{Session, Timeouts};
