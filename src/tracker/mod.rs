//! Generation tracking: session state machine, status poller, result
//! selection and per-project job history.

pub mod history;
pub mod poller;
pub mod selection;
pub mod selector;
pub mod session;

pub use history::JobHistoryCache;
pub use poller::{JobStatusPoller, PollEvent};
pub use selection::MosaicSelection;
pub use selector::{select_result, Quality, ResultUnavailable};
pub use session::{GenerationSession, SessionError, SessionSnapshot, SessionState};
