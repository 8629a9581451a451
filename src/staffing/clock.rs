//! Worker clock state machine.
//!
//! ```text
//! not_assigned ─▶ not_started ─▶ clocked_in ⇄ clocked_out ─▶ shift_ended
//!                      │
//!                      └──────▶ no_show
//! ```
//!
//! A worker gets at most [`MAX_ENTRIES`] time entries and at most one of
//! them is open at any time. Clock-in is allowed at any hour; there is no
//! shift time-window check.

use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

use super::StaffingError;
use crate::model::{assigned_personnel::WorkerStatus, time_entry::TimeEntry};

pub const MAX_ENTRIES: usize = 3;

/// State shown to clients, derived from the persisted status and entries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    NotAssigned,
    NotStarted,
    ClockedIn,
    ClockedOut,
    ShiftEnded,
    NoShow,
}

/// Row change a transition asks the store to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryChange {
    Open {
        entry_number: u8,
        clock_in: NaiveDateTime,
    },
    Close {
        entry_id: u64,
        clock_out: NaiveDateTime,
    },
    Correct {
        entry_id: u64,
        clock_in: NaiveDateTime,
        clock_out: Option<NaiveDateTime>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub status: WorkerStatus,
    pub change: Option<EntryChange>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClockAction {
    ClockIn,
    ClockOut,
    EndShift,
    NoShow,
}

impl ClockAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ClockAction::ClockIn => "clock_in",
            ClockAction::ClockOut => "clock_out",
            ClockAction::EndShift => "end_shift",
            ClockAction::NoShow => "no_show",
        }
    }
}

/// Clock view of one assignment. `entries` must be ordered by entry number.
#[derive(Debug, Clone, Copy)]
pub struct WorkerClock<'a> {
    pub status: WorkerStatus,
    pub entries: &'a [TimeEntry],
}

impl<'a> WorkerClock<'a> {
    pub fn new(status: WorkerStatus, entries: &'a [TimeEntry]) -> Self {
        Self { status, entries }
    }

    pub fn active_entry(&self) -> Option<&'a TimeEntry> {
        self.entries.iter().find(|e| e.is_open())
    }

    pub fn apply(&self, action: ClockAction, at: NaiveDateTime) -> Result<Transition, StaffingError> {
        match action {
            ClockAction::ClockIn => self.clock_in(at),
            ClockAction::ClockOut => self.clock_out(at),
            ClockAction::EndShift => self.end_shift(at),
            ClockAction::NoShow => self.mark_no_show(),
        }
    }

    pub fn clock_in(&self, at: NaiveDateTime) -> Result<Transition, StaffingError> {
        self.ensure_not_terminal()?;
        if self.active_entry().is_some() {
            return Err(StaffingError::AlreadyClockedIn);
        }
        if self.entries.len() >= MAX_ENTRIES {
            return Err(StaffingError::EntryLimitReached { max: MAX_ENTRIES });
        }
        if let Some(last) = self.entries.last().and_then(|e| e.clock_out) {
            if at < last {
                return Err(StaffingError::InvalidTimeRange {
                    reason: "clock-in precedes the previous clock-out".to_string(),
                });
            }
        }

        Ok(Transition {
            status: WorkerStatus::ClockedIn,
            change: Some(EntryChange::Open {
                entry_number: (self.entries.len() + 1) as u8,
                clock_in: at,
            }),
        })
    }

    pub fn clock_out(&self, at: NaiveDateTime) -> Result<Transition, StaffingError> {
        self.ensure_not_terminal()?;
        let active = self.active_entry().ok_or(StaffingError::NotClockedIn)?;
        if at < active.clock_in {
            return Err(StaffingError::InvalidTimeRange {
                reason: "clock-out precedes clock-in".to_string(),
            });
        }

        Ok(Transition {
            status: WorkerStatus::ClockedOut,
            change: Some(EntryChange::Close {
                entry_id: active.id,
                clock_out: at,
            }),
        })
    }

    /// Ends the worker's shift, closing the open entry if there is one.
    pub fn end_shift(&self, at: NaiveDateTime) -> Result<Transition, StaffingError> {
        self.ensure_not_terminal()?;
        let change = match self.active_entry() {
            // a clock skew must not produce a negative entry
            Some(active) => Some(EntryChange::Close {
                entry_id: active.id,
                clock_out: at.max(active.clock_in),
            }),
            None => None,
        };

        Ok(Transition {
            status: WorkerStatus::ShiftEnded,
            change,
        })
    }

    pub fn mark_no_show(&self) -> Result<Transition, StaffingError> {
        self.ensure_not_terminal()?;
        if self.status != WorkerStatus::Assigned || !self.entries.is_empty() {
            return Err(StaffingError::NoShowNotAllowed {
                status: self.status,
            });
        }

        Ok(Transition {
            status: WorkerStatus::NoShow,
            change: None,
        })
    }

    /// Replaces the times of an existing entry.
    ///
    /// Only the last entry may be left open, entries may not overlap their
    /// neighbours, and a finished worker cannot have an entry reopened.
    pub fn correct_entry(
        &self,
        entry_id: u64,
        clock_in: NaiveDateTime,
        clock_out: Option<NaiveDateTime>,
    ) -> Result<Transition, StaffingError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.id == entry_id)
            .ok_or(StaffingError::EntryNotFound { entry_id })?;

        if let Some(out) = clock_out {
            if out <= clock_in {
                return Err(StaffingError::InvalidTimeRange {
                    reason: "clock-out must be after clock-in".to_string(),
                });
            }
        } else {
            if idx + 1 != self.entries.len() {
                return Err(StaffingError::InvalidTimeRange {
                    reason: "only the latest entry can be left open".to_string(),
                });
            }
            if self.status.is_finished() {
                return Err(StaffingError::ShiftAlreadyEnded);
            }
        }

        if idx > 0 {
            let prev = &self.entries[idx - 1];
            if prev.clock_out.is_none_or(|out| out > clock_in) {
                return Err(StaffingError::InvalidTimeRange {
                    reason: "entry overlaps the previous entry".to_string(),
                });
            }
        }
        if let Some(next) = self.entries.get(idx + 1) {
            if clock_out.is_none_or(|out| out > next.clock_in) {
                return Err(StaffingError::InvalidTimeRange {
                    reason: "entry overlaps the next entry".to_string(),
                });
            }
        }

        let open_after = self.entries.iter().any(|e| {
            if e.id == entry_id {
                clock_out.is_none()
            } else {
                e.is_open()
            }
        });
        let status = match self.status {
            status if status.is_finished() => status,
            _ if open_after => WorkerStatus::ClockedIn,
            WorkerStatus::ClockedIn => WorkerStatus::ClockedOut,
            status => status,
        };

        Ok(Transition {
            status,
            change: Some(EntryChange::Correct {
                entry_id,
                clock_in,
                clock_out,
            }),
        })
    }

    pub fn display_state(&self, has_user: bool) -> DisplayState {
        if !has_user {
            return DisplayState::NotAssigned;
        }
        match self.status {
            WorkerStatus::NoShow => DisplayState::NoShow,
            WorkerStatus::ShiftEnded => DisplayState::ShiftEnded,
            _ if self.active_entry().is_some() => DisplayState::ClockedIn,
            _ if self.entries.is_empty() => DisplayState::NotStarted,
            _ => DisplayState::ClockedOut,
        }
    }

    /// Total minutes across closed entries.
    pub fn worked_minutes(&self) -> i64 {
        self.entries.iter().map(TimeEntry::minutes).sum()
    }

    fn ensure_not_terminal(&self) -> Result<(), StaffingError> {
        match self.status {
            WorkerStatus::NoShow => Err(StaffingError::WorkerNoShow),
            WorkerStatus::ShiftEnded => Err(StaffingError::ShiftAlreadyEnded),
            _ => Ok(()),
        }
    }
}

/// Applies a transition to an in-memory entry list the way the store
/// applies it to the database.
pub fn apply_change(entries: &mut Vec<TimeEntry>, assignment_id: u64, change: &EntryChange, next_id: u64) {
    match *change {
        EntryChange::Open {
            entry_number,
            clock_in,
        } => entries.push(TimeEntry {
            id: next_id,
            assigned_personnel_id: assignment_id,
            entry_number,
            clock_in,
            clock_out: None,
            is_active: true,
        }),
        EntryChange::Close {
            entry_id,
            clock_out,
        } => {
            if let Some(e) = entries.iter_mut().find(|e| e.id == entry_id) {
                e.clock_out = Some(clock_out);
                e.is_active = false;
            }
        }
        EntryChange::Correct {
            entry_id,
            clock_in,
            clock_out,
        } => {
            if let Some(e) = entries.iter_mut().find(|e| e.id == entry_id) {
                e.clock_in = clock_in;
                e.clock_out = clock_out;
                e.is_active = clock_out.is_none();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    /// Runs an action against the in-memory worker and applies the result.
    fn step(
        status: &mut WorkerStatus,
        entries: &mut Vec<TimeEntry>,
        action: ClockAction,
        when: NaiveDateTime,
    ) -> Result<(), StaffingError> {
        let t = WorkerClock::new(*status, entries).apply(action, when)?;
        if let Some(change) = &t.change {
            let next_id = entries.len() as u64 + 1;
            apply_change(entries, 1, change, next_id);
        }
        *status = t.status;
        Ok(())
    }

    #[test]
    fn first_clock_in_opens_entry_one() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();

        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();

        assert_eq!(status, WorkerStatus::ClockedIn);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_number, 1);
        assert!(entries[0].is_active);
        assert_eq!(entries[0].clock_out, None);
    }

    #[test]
    fn clock_out_then_in_creates_second_entry() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();

        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();
        step(&mut status, &mut entries, ClockAction::ClockOut, at(12, 0)).unwrap();
        assert_eq!(status, WorkerStatus::ClockedOut);
        assert!(!entries[0].is_active);
        assert_eq!(entries[0].clock_out, Some(at(12, 0)));

        step(&mut status, &mut entries, ClockAction::ClockIn, at(12, 30)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].entry_number, 2);
        assert!(entries[1].is_active);
    }

    #[test]
    fn clock_in_while_active_is_rejected() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();

        let err = step(&mut status, &mut entries, ClockAction::ClockIn, at(9, 0)).unwrap_err();
        assert_eq!(err, StaffingError::AlreadyClockedIn);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn fourth_clock_in_is_rejected() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        for (i, h) in [6, 9, 12].into_iter().enumerate() {
            step(&mut status, &mut entries, ClockAction::ClockIn, at(h, 0)).unwrap();
            step(&mut status, &mut entries, ClockAction::ClockOut, at(h + 2, 0)).unwrap();
            assert_eq!(entries.len(), i + 1);
        }

        let err = step(&mut status, &mut entries, ClockAction::ClockIn, at(16, 0)).unwrap_err();
        assert_eq!(err, StaffingError::EntryLimitReached { max: 3 });
        assert_eq!(entries.len(), MAX_ENTRIES);
    }

    #[test]
    fn clock_in_rejected_for_finished_workers() {
        let clock = WorkerClock::new(WorkerStatus::NoShow, &[]);
        assert_eq!(clock.clock_in(at(8, 0)), Err(StaffingError::WorkerNoShow));

        let clock = WorkerClock::new(WorkerStatus::ShiftEnded, &[]);
        assert_eq!(clock.clock_in(at(8, 0)), Err(StaffingError::ShiftAlreadyEnded));
    }

    #[test]
    fn clock_out_without_active_entry_is_rejected() {
        let clock = WorkerClock::new(WorkerStatus::Assigned, &[]);
        assert_eq!(clock.clock_out(at(8, 0)), Err(StaffingError::NotClockedIn));
    }

    #[test]
    fn clock_out_before_clock_in_is_rejected() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();

        let err = WorkerClock::new(status, &entries).clock_out(at(7, 0)).unwrap_err();
        assert!(matches!(err, StaffingError::InvalidTimeRange { .. }));
    }

    #[test]
    fn end_shift_closes_active_entry() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();
        step(&mut status, &mut entries, ClockAction::EndShift, at(16, 0)).unwrap();

        assert_eq!(status, WorkerStatus::ShiftEnded);
        assert_eq!(entries[0].clock_out, Some(at(16, 0)));
        assert!(entries.iter().all(|e| !e.is_active));

        let err = step(&mut status, &mut entries, ClockAction::ClockIn, at(17, 0)).unwrap_err();
        assert_eq!(err, StaffingError::ShiftAlreadyEnded);
    }

    #[test]
    fn end_shift_without_entries_has_no_entry_change() {
        let t = WorkerClock::new(WorkerStatus::Assigned, &[])
            .end_shift(at(16, 0))
            .unwrap();
        assert_eq!(t.status, WorkerStatus::ShiftEnded);
        assert_eq!(t.change, None);
    }

    #[test]
    fn end_shift_twice_is_rejected() {
        let clock = WorkerClock::new(WorkerStatus::ShiftEnded, &[]);
        assert_eq!(clock.end_shift(at(16, 0)), Err(StaffingError::ShiftAlreadyEnded));
    }

    #[test]
    fn no_show_only_from_not_started() {
        let t = WorkerClock::new(WorkerStatus::Assigned, &[]).mark_no_show().unwrap();
        assert_eq!(t.status, WorkerStatus::NoShow);

        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();
        let err = WorkerClock::new(status, &entries).mark_no_show().unwrap_err();
        assert_eq!(
            err,
            StaffingError::NoShowNotAllowed {
                status: WorkerStatus::ClockedIn
            }
        );
    }

    #[test]
    fn no_show_blocks_every_action() {
        let clock = WorkerClock::new(WorkerStatus::NoShow, &[]);
        for action in [
            ClockAction::ClockIn,
            ClockAction::ClockOut,
            ClockAction::EndShift,
            ClockAction::NoShow,
        ] {
            assert_eq!(clock.apply(action, at(9, 0)), Err(StaffingError::WorkerNoShow));
        }
    }

    #[test]
    fn at_most_one_open_entry_through_any_sequence() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        let actions = [
            ClockAction::ClockIn,
            ClockAction::ClockIn,
            ClockAction::ClockOut,
            ClockAction::ClockOut,
            ClockAction::ClockIn,
            ClockAction::ClockOut,
            ClockAction::ClockIn,
            ClockAction::ClockIn,
            ClockAction::ClockOut,
            ClockAction::ClockIn,
            ClockAction::EndShift,
        ];
        for (i, action) in actions.into_iter().enumerate() {
            let _ = step(&mut status, &mut entries, action, at(6 + i as u32, 0));
            assert!(entries.iter().filter(|e| e.is_open()).count() <= 1);
            assert!(entries.len() <= MAX_ENTRIES);
        }
        assert_eq!(status, WorkerStatus::ShiftEnded);
    }

    #[test]
    fn display_states() {
        assert_eq!(
            WorkerClock::new(WorkerStatus::Assigned, &[]).display_state(false),
            DisplayState::NotAssigned
        );
        assert_eq!(
            WorkerClock::new(WorkerStatus::Assigned, &[]).display_state(true),
            DisplayState::NotStarted
        );

        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();
        assert_eq!(
            WorkerClock::new(status, &entries).display_state(true),
            DisplayState::ClockedIn
        );
        step(&mut status, &mut entries, ClockAction::ClockOut, at(10, 0)).unwrap();
        assert_eq!(
            WorkerClock::new(status, &entries).display_state(true),
            DisplayState::ClockedOut
        );
        assert_eq!(
            WorkerClock::new(WorkerStatus::OnBreak, &entries).display_state(true),
            DisplayState::ClockedOut
        );
    }

    #[test]
    fn worked_minutes_ignores_open_entry() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();
        step(&mut status, &mut entries, ClockAction::ClockOut, at(11, 30)).unwrap();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(12, 0)).unwrap();

        assert_eq!(WorkerClock::new(status, &entries).worked_minutes(), 210);
    }

    #[test]
    fn on_break_worker_can_clock_back_in() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();
        step(&mut status, &mut entries, ClockAction::ClockOut, at(10, 0)).unwrap();

        let t = WorkerClock::new(WorkerStatus::OnBreak, &entries)
            .clock_in(at(10, 30))
            .unwrap();
        assert_eq!(t.status, WorkerStatus::ClockedIn);
    }

    #[test]
    fn correct_entry_rejects_overlap() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();
        step(&mut status, &mut entries, ClockAction::ClockOut, at(10, 0)).unwrap();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(11, 0)).unwrap();
        step(&mut status, &mut entries, ClockAction::ClockOut, at(13, 0)).unwrap();

        let clock = WorkerClock::new(status, &entries);
        let err = clock
            .correct_entry(entries[0].id, at(8, 0), Some(at(11, 30)))
            .unwrap_err();
        assert!(matches!(err, StaffingError::InvalidTimeRange { .. }));

        let err = clock
            .correct_entry(entries[1].id, at(9, 0), Some(at(12, 0)))
            .unwrap_err();
        assert!(matches!(err, StaffingError::InvalidTimeRange { .. }));

        let t = clock
            .correct_entry(entries[0].id, at(7, 45), Some(at(10, 15)))
            .unwrap();
        assert_eq!(t.status, WorkerStatus::ClockedOut);
    }

    #[test]
    fn correct_entry_closing_active_entry_clocks_out() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();

        let t = WorkerClock::new(status, &entries)
            .correct_entry(entries[0].id, at(8, 0), Some(at(12, 0)))
            .unwrap();
        assert_eq!(t.status, WorkerStatus::ClockedOut);
    }

    #[test]
    fn correcting_earlier_entry_keeps_worker_clocked_in() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();
        step(&mut status, &mut entries, ClockAction::ClockOut, at(10, 0)).unwrap();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(11, 0)).unwrap();

        let t = WorkerClock::new(status, &entries)
            .correct_entry(entries[0].id, at(7, 0), Some(at(10, 0)))
            .unwrap();
        assert_eq!(t.status, WorkerStatus::ClockedIn);

        let change = t.change.clone().unwrap();
        apply_change(&mut entries, 1, &change, 0);
        let clock = WorkerClock::new(t.status, &entries);
        assert_eq!(entries.iter().filter(|e| e.is_open()).count(), 1);
        assert_eq!(clock.display_state(true), DisplayState::ClockedIn);
    }

    #[test]
    fn correct_entry_cannot_reopen_for_ended_worker() {
        let mut status = WorkerStatus::Assigned;
        let mut entries = Vec::new();
        step(&mut status, &mut entries, ClockAction::ClockIn, at(8, 0)).unwrap();
        step(&mut status, &mut entries, ClockAction::EndShift, at(12, 0)).unwrap();

        let clock = WorkerClock::new(status, &entries);
        assert_eq!(
            clock.correct_entry(entries[0].id, at(8, 0), None),
            Err(StaffingError::ShiftAlreadyEnded)
        );
        assert_eq!(
            clock.correct_entry(99, at(8, 0), Some(at(9, 0))),
            Err(StaffingError::EntryNotFound { entry_id: 99 })
        );
    }
}
