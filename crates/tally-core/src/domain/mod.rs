//! Domain model (ids, events, stacks, projects, summaries, results, errors).

pub mod description;
pub mod errors;
pub mod event;
pub mod ids;
pub mod outcome;
pub mod project;
pub mod stack;
pub mod summary;
pub mod window;

pub use description::EventUserDescription;
pub use errors::{ErrorKind, MailError, TallyError};
pub use event::{DataMap, Event, EventFilter, OrderKey, UserDescription};
pub use ids::{EventId, OrganizationId, ProjectId, StackId, UserId};
pub use outcome::{JobResult, JobResultKind};
pub use project::{NotificationSettings, Organization, Project, User};
pub use stack::Stack;
pub use summary::{DailySummary, StackSummary, SummaryClaim, WindowStats};
pub use window::{EndOfDayTicks, SummaryWindow};
