pub mod conversation;
pub mod event;
pub mod family;
pub mod intent;

pub use conversation::{
    ConversationState, HistoryTurn, PendingAction, PendingEvent, SenderId, TurnRole,
};
pub use event::{CalendarEvent, EventId, EventTiming, SeriesId};
pub use family::{FamilyMember, FamilyWhitelist, WhitelistError};
pub use intent::{CalendarEntities, Frequency, Intent, IntentKind, Recurrence};
