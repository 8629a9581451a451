//! Timesheet export as CSV.
//!
//! The file opens with a short header block (one `label,value` pair per
//! line) followed by the worker table. Rows have different widths, so the
//! writer runs in flexible mode.

use csv::WriterBuilder;
use thiserror::Error;

use crate::model::timesheet::TimesheetStatus;
use crate::staffing::clock::MAX_ENTRIES;
use crate::staffing::store::{ShiftDetail, WorkerView};
use crate::staffing::timesheet::minutes_to_hours;

const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV flush failed: {0}")]
    Io(#[from] std::io::Error),
}

fn worker_row(worker: &WorkerView) -> Vec<String> {
    let mut row = Vec::with_capacity(3 + MAX_ENTRIES * 2);
    row.push(worker.user_name.clone().unwrap_or_default());
    row.push(worker.assignment.role_code.to_string());

    for slot in 0..MAX_ENTRIES {
        match worker.entries.get(slot) {
            Some(entry) => {
                row.push(entry.clock_in.format(TIME_FORMAT).to_string());
                row.push(
                    entry
                        .clock_out
                        .map(|out| out.format(TIME_FORMAT).to_string())
                        .unwrap_or_default(),
                );
            }
            None => {
                row.push(String::new());
                row.push(String::new());
            }
        }
    }

    row.push(format!("{:.2}", worker.worked_hours));
    row
}

/// Renders the timesheet of a shift. Open slots are left out.
pub fn render_timesheet_csv(detail: &ShiftDetail, status: TimesheetStatus) -> Result<Vec<u8>, ExportError> {
    let mut wtr = WriterBuilder::new().flexible(true).from_writer(Vec::new());

    let shift = &detail.shift;
    let window = format!(
        "{} - {}",
        shift.start_time.format(TIME_FORMAT),
        shift.end_time.format(TIME_FORMAT)
    );
    let date = shift.date.format("%Y-%m-%d").to_string();
    let status = status.to_string();

    wtr.write_record(["Job", detail.job_name.as_str()])?;
    wtr.write_record(["Company", detail.company_name.as_str()])?;
    wtr.write_record(["Date", date.as_str()])?;
    wtr.write_record(["Location", shift.location.as_deref().unwrap_or("")])?;
    wtr.write_record(["Shift", window.as_str()])?;
    wtr.write_record(["Status", status.as_str()])?;

    let mut header = vec!["Worker".to_string(), "Role".to_string()];
    for n in 1..=MAX_ENTRIES {
        header.push(format!("In {n}"));
        header.push(format!("Out {n}"));
    }
    header.push("Total Hours".to_string());
    wtr.write_record(&header)?;

    let mut total_minutes = 0;
    for worker in detail.workers.iter().filter(|w| w.assignment.user_id.is_some()) {
        wtr.write_record(worker_row(worker))?;
        total_minutes += worker.worked_minutes;
    }

    let mut footer = vec![String::new(); header.len()];
    footer[0] = "Total".to_string();
    if let Some(last) = footer.last_mut() {
        *last = format!("{:.2}", minutes_to_hours(total_minutes));
    }
    wtr.write_record(&footer)?;

    wtr.flush()?;
    wtr.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

/// Attachment file name for a shift's timesheet.
pub fn file_name(detail: &ShiftDetail) -> String {
    let job: String = detail
        .job_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("timesheet-{}-{}.csv", job.trim_matches('-'), detail.shift.date.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::assigned_personnel::{AssignedPersonnel, WorkerStatus};
    use crate::model::shift::RoleCode;
    use crate::model::time_entry::TimeEntry;
    use crate::staffing::fulfillment::{Fulfillment, tests::sample_shift};
    use chrono::{NaiveDate, Utc};

    fn assignment(id: u64, user_id: Option<u64>, role_code: RoleCode) -> AssignedPersonnel {
        AssignedPersonnel {
            id,
            shift_id: 40,
            user_id,
            role_code,
            status: WorkerStatus::ShiftEnded,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn entry(id: u64, assignment_id: u64, n: u8, from: (u32, u32), to: (u32, u32)) -> TimeEntry {
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        TimeEntry {
            id,
            assigned_personnel_id: assignment_id,
            entry_number: n,
            clock_in: day.and_hms_opt(from.0, from.1, 0).unwrap(),
            clock_out: Some(day.and_hms_opt(to.0, to.1, 0).unwrap()),
            is_active: false,
        }
    }

    fn detail() -> ShiftDetail {
        let shift = sample_shift();
        let workers = vec![
            WorkerView::new(
                assignment(1, Some(7), RoleCode::CrewChief),
                Some("Dana Reyes".into()),
                vec![entry(1, 1, 1, (8, 0), (12, 0)), entry(2, 1, 2, (12, 30), (16, 0))],
            ),
            WorkerView::new(
                assignment(2, Some(8), RoleCode::Rigger),
                Some("Sam, Jr.".into()),
                vec![entry(3, 2, 1, (9, 0), (11, 15))],
            ),
            WorkerView::new(assignment(3, None, RoleCode::Stagehand), None, vec![]),
        ];
        let assignments: Vec<AssignedPersonnel> = workers.iter().map(|w| w.assignment.clone()).collect();

        let fulfillment = Fulfillment::compute(&shift, &assignments);
        ShiftDetail {
            fully_staffed: fulfillment.is_fully_staffed(),
            fulfillment,
            shift,
            job_name: "Arena Load-In".into(),
            company_id: 3,
            company_name: "Acme Events".into(),
            workers,
            timesheet_id: Some(5),
            timesheet_status: Some(TimesheetStatus::Completed),
        }
    }

    fn rows(bytes: &[u8]) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes)
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn writes_header_block_then_worker_table() {
        let out = render_timesheet_csv(&detail(), TimesheetStatus::Completed).unwrap();
        let rows = rows(&out);

        assert_eq!(rows[0], vec!["Job", "Arena Load-In"]);
        assert_eq!(rows[1], vec!["Company", "Acme Events"]);
        assert_eq!(rows[2], vec!["Date", "2026-03-14"]);
        assert_eq!(rows[3], vec!["Location", "Hall B"]);
        assert_eq!(rows[4], vec!["Shift", "08:00 - 16:00"]);
        assert_eq!(rows[5], vec!["Status", "completed"]);
        assert_eq!(rows[6][0], "Worker");
        assert_eq!(rows[6].len(), 9);
    }

    #[test]
    fn one_row_per_staffed_worker_with_totals() {
        let out = render_timesheet_csv(&detail(), TimesheetStatus::Completed).unwrap();
        let rows = rows(&out);

        // header block, column header, two workers, footer
        assert_eq!(rows.len(), 10);
        assert_eq!(
            rows[7],
            vec!["Dana Reyes", "CC", "08:00", "12:00", "12:30", "16:00", "", "", "7.50"]
        );
        assert_eq!(rows[8][0], "Sam, Jr.");
        assert_eq!(rows[8][8], "2.25");
        assert_eq!(rows[9][0], "Total");
        assert_eq!(rows[9][8], "9.75");
    }

    #[test]
    fn file_name_is_slugged() {
        assert_eq!(file_name(&detail()), "timesheet-arena-load-in-20260314.csv");
    }
}
