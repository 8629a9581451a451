pub mod admin;
pub mod clock;
pub mod companies;
pub mod crew_chief;
pub mod guard;
pub mod jobs;
pub mod personnel;
pub mod response;
pub mod shifts;
pub mod time_entries;
pub mod timesheets;
pub mod users;
