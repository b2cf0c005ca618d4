//! Per-prayer, per-day notification lifecycle

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationState {
    #[default]
    Unscheduled,
    Scheduled,
    Fired,
    /// Snoozed this many times
    Snoozed(u32),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEvent {
    Schedule,
    Fire,
    Snooze { max_snoozes: u32 },
    Stop,
    Cancel,
}

impl NotificationState {
    /// Next state, or `None` when the event is not allowed here
    pub fn on(self, event: NotificationEvent) -> Option<NotificationState> {
        use NotificationEvent as E;
        use NotificationState as S;

        match (self, event) {
            (_, E::Cancel) | (_, E::Stop) => Some(S::Cancelled),
            (_, E::Schedule) => Some(S::Scheduled),
            (S::Scheduled | S::Fired, E::Fire) => Some(S::Fired),
            (S::Snoozed(n), E::Fire) => Some(S::Snoozed(n)),
            // A notification can fire while the process is down, so snoozing
            // before a recorded fire is allowed
            (S::Unscheduled | S::Scheduled | S::Fired, E::Snooze { max_snoozes }) if max_snoozes >= 1 => {
                Some(S::Snoozed(1))
            }
            (S::Snoozed(n), E::Snooze { max_snoozes }) if n < max_snoozes => Some(S::Snoozed(n + 1)),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, NotificationState::Scheduled | NotificationState::Snoozed(_))
    }
}

impl std::fmt::Display for NotificationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationState::Unscheduled => write!(f, "unscheduled"),
            NotificationState::Scheduled => write!(f, "scheduled"),
            NotificationState::Fired => write!(f, "fired"),
            NotificationState::Snoozed(n) => write!(f, "snoozed({})", n),
            NotificationState::Cancelled => write!(f, "cancelled"),
        }
    }
}
