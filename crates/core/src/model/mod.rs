mod attempt;
mod deadline;
mod exam;
mod ids;
mod results;

pub use ids::{AttemptId, ExamId, QuestionId};

pub use attempt::{AnswerSheet, Attempt, AttemptError, AttemptOrigin, AttemptStatus};
pub use deadline::{DeadlinePolicy, EntryTiming};
pub use exam::{ExamError, ExamPaper, ExamStatus, Question};
pub use results::{ExamResults, QuestionResult, ScoreSummary};
