mod countdown;
mod progress;
mod state;
mod view;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use countdown::{RemainingTime, format_remaining};
pub use progress::SessionProgress;
pub use state::{
    ExamSession, Navigation, PendingSave, SessionMode, SubmitTicket, SubmitTrigger,
};
pub use view::{QuestionView, SessionSnapshot};
pub use workflow::SessionController;
