use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `HELD` is the only non-terminal state; it transitions to exactly one of
/// `COMMITTED`, `RELEASED`, or `EXPIRED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
pub enum ReservationState {
    Held,
    Committed,
    Released,
    Expired,
}

impl ReservationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReservationState::Held)
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct InventoryReservation {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    pub reserved_by: String,
    pub state: ReservationState,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

impl InventoryReservation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == ReservationState::Held && self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(state: ReservationState, expires_at: DateTime<Utc>) -> InventoryReservation {
        InventoryReservation {
            id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            quantity: 1,
            reserved_by: "order-1".to_string(),
            state,
            expires_at,
            created_at: Utc::now(),
            committed_at: None,
            released_at: None,
        }
    }

    #[test]
    fn only_held_reservations_past_expiry_are_expired() {
        let now = Utc::now();
        assert!(sample(ReservationState::Held, now - Duration::seconds(1)).is_expired(now));
        assert!(!sample(ReservationState::Held, now + Duration::seconds(1)).is_expired(now));
        assert!(!sample(ReservationState::Committed, now - Duration::seconds(1)).is_expired(now));
    }
}
