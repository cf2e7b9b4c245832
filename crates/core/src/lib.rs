pub mod calendar;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod messaging;
pub mod time;

pub use chrono;
pub use chrono_tz;

pub use calendar::{
    CalendarError, CalendarGateway, EventChanges, EventQuery, InMemoryCalendar, NewAllDayEvent,
    NewEvent, RecurringCreated, SearchOutcome,
};
pub use domain::conversation::{
    ConversationState, HistoryTurn, PendingAction, PendingEvent, SenderId, TurnRole,
};
pub use domain::event::{CalendarEvent, EventId, EventTiming, SeriesId};
pub use domain::family::{FamilyMember, FamilyWhitelist, WhitelistError};
pub use domain::intent::{CalendarEntities, Frequency, Intent, IntentKind, Recurrence};
pub use errors::{ApplicationError, DomainError};
pub use messaging::{InboundMessage, MessageId, MessageSender, Recipient, SendError};
