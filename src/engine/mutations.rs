use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{pick_beds, validate_draft, validate_range};
use super::{Engine, EngineError};

/// Fields for a new room.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub room_type: RoomType,
    pub capacity_beds: u32,
    pub price_per_night: Minor,
    /// Defaults to `capacity_beds`.
    pub max_occupancy: Option<u32>,
    pub bed_labels: BedLabels,
    pub status: RoomStatus,
}

impl NewRoom {
    pub fn dormitory(name: impl Into<String>, capacity_beds: u32, price_per_night: Minor) -> Self {
        Self {
            name: name.into(),
            room_type: RoomType::Dormitory,
            capacity_beds,
            price_per_night,
            max_occupancy: None,
            bed_labels: BedLabels::Numbered,
            status: RoomStatus::Available,
        }
    }
}

/// Fields for a new guest.
#[derive(Debug, Clone, Default)]
pub struct NewGuest {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Engine {
    pub async fn create_room(&self, new: NewRoom) -> Result<Room, EngineError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::Validation("room name is required".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("room name too long"));
        }
        if new.capacity_beds == 0 {
            return Err(EngineError::Validation("a room needs at least one bed".into()));
        }
        if new.capacity_beds > MAX_BEDS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many beds in room"));
        }
        if new.max_occupancy == Some(0) {
            return Err(EngineError::Validation("max occupancy must be at least 1".into()));
        }
        if new.price_per_night < 0 {
            return Err(EngineError::Validation("price must not be negative".into()));
        }
        if new.price_per_night > MAX_PRICE_PER_NIGHT {
            return Err(EngineError::LimitExceeded("price per night too high"));
        }
        if let BedLabels::Custom(labels) = &new.bed_labels {
            if labels.len() != new.capacity_beds as usize {
                return Err(EngineError::Validation(format!(
                    "{} bed labels given for {} beds",
                    labels.len(),
                    new.capacity_beds
                )));
            }
            let mut seen = std::collections::HashSet::new();
            for label in labels {
                if label.trim().is_empty() || label.len() > MAX_LABEL_LEN {
                    return Err(EngineError::Validation(format!("invalid bed label '{label}'")));
                }
                if !seen.insert(label.as_str()) {
                    return Err(EngineError::Validation(format!("duplicate bed label '{label}'")));
                }
            }
        }

        let _registry = self.registry.lock().await;
        if self.store.room_count() >= MAX_ROOMS_PER_PROPERTY {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if self.store.room_id_by_name(&name).is_some() {
            return Err(EngineError::AlreadyExists(format!("room '{name}'")));
        }

        let room = Room {
            id: Ulid::new(),
            name,
            room_type: new.room_type,
            capacity_beds: new.capacity_beds,
            price_per_night: new.price_per_night,
            max_occupancy: new.max_occupancy.unwrap_or(new.capacity_beds),
            bed_labels: new.bed_labels,
            status: new.status,
        };
        self.persist_registry(Event::RoomCreated { room: room.clone() })
            .await?;
        info!(room = %room.name, beds = room.capacity_beds, "room created");
        Ok(room)
    }

    pub async fn create_guest(&self, new: NewGuest) -> Result<Guest, EngineError> {
        let first_name = new.first_name.trim().to_string();
        let last_name = new.last_name.trim().to_string();
        let email = non_blank(new.email);
        // Same identity rule as import rows, so every guest survives an export
        let full_name = !first_name.is_empty() && !last_name.is_empty();
        if !full_name && email.is_none() {
            return Err(EngineError::Validation(
                "guest needs a first and last name, or an email".into(),
            ));
        }
        if first_name.len() + last_name.len() > MAX_NAME_LEN
            || email.as_ref().is_some_and(|e| e.len() > MAX_NAME_LEN)
        {
            return Err(EngineError::LimitExceeded("guest name too long"));
        }

        let guest = Guest {
            id: Ulid::new(),
            first_name,
            last_name,
            email,
            phone: non_blank(new.phone),
        };
        let _registry = self.registry.lock().await;
        self.persist_registry(Event::GuestCreated { guest: guest.clone() })
            .await?;
        debug!(guest = %guest.id, "guest created");
        Ok(guest)
    }

    /// Book beds in a room. New stays start pending or confirmed.
    pub async fn allocate_bed(
        &self,
        room_id: Ulid,
        range: DateRange,
        draft: StayDraft,
    ) -> Result<Stay, EngineError> {
        if !matches!(draft.state, LifecycleState::Pending | LifecycleState::Confirmed) {
            return Err(EngineError::Validation(format!(
                "a new stay cannot start as {}",
                draft.state
            )));
        }
        self.place_stay(room_id, range, draft).await
    }

    /// Read availability, then commit under the room's write lock, retrying
    /// once when another writer took the beds in between.
    pub(crate) async fn place_stay(
        &self,
        room_id: Ulid,
        range: DateRange,
        draft: StayDraft,
    ) -> Result<Stay, EngineError> {
        validate_range(&range)?;
        validate_draft(&draft)?;
        if !self.store.contains_guest(&draft.guest_id) {
            return Err(EngineError::not_found("guest", draft.guest_id));
        }
        let occupying = self.config.active.contains(draft.state);

        let mut retried = false;
        loop {
            let snapshot = self.availability_snapshot(room_id, &range, draft.beds).await?;
            if occupying && !snapshot.allowed {
                let room = self
                    .store
                    .get_room(&room_id)
                    .ok_or_else(|| EngineError::not_found("room", room_id))?;
                let err = if room.status.is_bookable() {
                    EngineError::Capacity {
                        room: room.name,
                        capacity: room.capacity_beds,
                    }
                } else {
                    EngineError::Validation(format!(
                        "room '{}' is {} and takes no bookings",
                        room.name, room.status
                    ))
                };
                metrics::counter!(crate::observability::ALLOCATIONS_REJECTED_TOTAL, "reason" => err.label())
                    .increment(1);
                debug!(room = %room_id, %range, "room full");
                return Err(err);
            }

            match self.commit_stay(room_id, range, &draft, snapshot.room_version).await {
                Err(EngineError::ConcurrencyConflict(_)) if !retried => {
                    retried = true;
                    metrics::counter!(crate::observability::CONCURRENCY_RETRIES_TOTAL).increment(1);
                    warn!(room = %room_id, %range, "room changed while booking, retrying");
                }
                Err(e) => {
                    metrics::counter!(crate::observability::ALLOCATIONS_REJECTED_TOTAL, "reason" => e.label())
                        .increment(1);
                    return Err(e);
                }
                Ok(stay) => return Ok(stay),
            }
        }
    }

    async fn commit_stay(
        &self,
        room_id: Ulid,
        range: DateRange,
        draft: &StayDraft,
        observed_version: u64,
    ) -> Result<Stay, EngineError> {
        let rs = self
            .store
            .get_room_state(&room_id)
            .ok_or_else(|| EngineError::not_found("room", room_id))?;
        let mut guard = rs.write().await;

        let existing: Vec<Occupancy> = guard.overlapping(&range).cloned().collect();
        let labels = pick_beds(
            &guard,
            &range,
            &existing,
            &self.config.active,
            draft,
            observed_version,
        )?;

        let price = guard.room.price_per_night;
        let total_amount = match draft.total_amount {
            Some(total) => total,
            None => price
                .checked_mul(range.nights())
                .and_then(|t| t.checked_mul(i64::from(draft.beds)))
                .ok_or(EngineError::LimitExceeded("stay total overflows"))?,
        };
        let id = Ulid::new();
        let stay = Stay {
            id,
            guest_id: draft.guest_id,
            range,
            state: draft.state,
            total_amount,
            amount_paid: draft.amount_paid,
            payment_state: PaymentState::derive(total_amount, draft.amount_paid),
            confirmation_code: confirmation_code(id),
        };
        let assignments: Vec<BedAssignment> = labels
            .into_iter()
            .map(|bed_label| BedAssignment {
                id: Ulid::new(),
                stay_id: id,
                room_id,
                bed_label,
                price_per_night: price,
            })
            .collect();

        let event = Event::StayCommitted {
            stay: stay.clone(),
            room_id,
            assignments,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(crate::observability::STAYS_COMMITTED_TOTAL).increment(1);
        info!(
            stay = %stay.confirmation_code,
            room = %guard.room.name,
            %range,
            state = %stay.state,
            "stay committed"
        );
        Ok(stay)
    }

    /// Take a room in or out of service. Existing stays are untouched; a room that is
    /// not available simply offers no beds to new bookings.
    pub async fn set_room_status(&self, room_id: Ulid, status: RoomStatus) -> Result<Room, EngineError> {
        let rs = self
            .store
            .get_room_state(&room_id)
            .ok_or_else(|| EngineError::not_found("room", room_id))?;
        let mut guard = rs.write().await;
        if guard.room.status == status {
            return Ok(guard.room.clone());
        }

        let from = guard.room.status;
        self.persist_and_apply(&mut guard, &Event::RoomStatusChanged { room_id, status })
            .await?;
        info!(room = %guard.room.name, %from, to = %status, "room status changed");
        Ok(guard.room.clone())
    }

    // ── Lifecycle ────────────────────────────────────────────

    pub async fn check_in(&self, stay_id: Ulid) -> Result<Stay, EngineError> {
        self.transition(stay_id, LifecycleState::CheckedIn).await
    }

    pub async fn check_out(&self, stay_id: Ulid) -> Result<Stay, EngineError> {
        self.transition(stay_id, LifecycleState::CheckedOut).await
    }

    pub async fn complete(&self, stay_id: Ulid) -> Result<Stay, EngineError> {
        self.transition(stay_id, LifecycleState::Completed).await
    }

    pub async fn cancel(&self, stay_id: Ulid) -> Result<Stay, EngineError> {
        self.transition(stay_id, LifecycleState::Cancelled).await
    }

    pub async fn mark_no_show(&self, stay_id: Ulid) -> Result<Stay, EngineError> {
        self.transition(stay_id, LifecycleState::NoShow).await
    }

    async fn transition(&self, stay_id: Ulid, next: LifecycleState) -> Result<Stay, EngineError> {
        let room_id = self
            .store
            .room_for_stay(&stay_id)
            .ok_or_else(|| EngineError::not_found("stay", stay_id))?;
        let rs = self
            .store
            .get_room_state(&room_id)
            .ok_or_else(|| EngineError::not_found("room", room_id))?;
        let mut guard = rs.write().await;
        let stay = self
            .store
            .get_stay(&stay_id)
            .ok_or_else(|| EngineError::not_found("stay", stay_id))?;

        if !stay.state.can_transition_to(next) {
            return Err(EngineError::Validation(format!(
                "stay {} cannot go from {} to {next}",
                stay.confirmation_code, stay.state
            )));
        }

        // A stay entering the active set starts holding beds again
        let active = &self.config.active;
        if !active.contains(stay.state) && active.contains(next) {
            let others: Vec<Occupancy> = guard
                .overlapping(&stay.range)
                .filter(|o| o.assignment.stay_id != stay_id)
                .cloned()
                .collect();
            let beds = self.store.assignments_for_stay(&stay_id).len() as u32;
            let check = super::can_allocate_beds(&guard.room, &stay.range, &others, active, beds);
            if !check.allowed {
                return Err(EngineError::Capacity {
                    room: guard.room.name.clone(),
                    capacity: guard.room.capacity_beds,
                });
            }
        }

        let event = Event::StayStateChanged {
            id: stay_id,
            room_id,
            state: next,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::STATE_TRANSITIONS_TOTAL, "to" => next.as_str())
            .increment(1);
        info!(stay = %stay.confirmation_code, from = %stay.state, to = %next, "stay transitioned");

        self.store
            .get_stay(&stay_id)
            .ok_or_else(|| EngineError::not_found("stay", stay_id))
    }

    // ── Payments ─────────────────────────────────────────────

    pub async fn record_payment(&self, stay_id: Ulid, amount: Minor) -> Result<Stay, EngineError> {
        if amount <= 0 {
            return Err(EngineError::Validation("payment must be positive".into()));
        }
        let room_id = self
            .store
            .room_for_stay(&stay_id)
            .ok_or_else(|| EngineError::not_found("stay", stay_id))?;
        let rs = self
            .store
            .get_room_state(&room_id)
            .ok_or_else(|| EngineError::not_found("room", room_id))?;
        let mut guard = rs.write().await;
        let stay = self
            .store
            .get_stay(&stay_id)
            .ok_or_else(|| EngineError::not_found("stay", stay_id))?;

        let amount_paid = stay
            .amount_paid
            .checked_add(amount)
            .ok_or(EngineError::LimitExceeded("payment total overflows"))?;
        let event = Event::PaymentRecorded {
            id: stay_id,
            room_id,
            amount_paid,
            payment_state: PaymentState::derive(stay.total_amount, amount_paid),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(stay = %stay.confirmation_code, amount, amount_paid, "payment recorded");

        self.store
            .get_stay(&stay_id)
            .ok_or_else(|| EngineError::not_found("stay", stay_id))
    }
}
