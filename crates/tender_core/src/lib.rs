pub mod filter_engine;
pub mod state_machine;
pub mod types;
pub mod validator;

pub use filter_engine::{apply_filters, Condition};
pub use state_machine::{State, TenderStateMachine, Trigger};
pub use types::*;
