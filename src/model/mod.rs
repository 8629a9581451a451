pub mod assigned_personnel;
pub mod company;
pub mod crew_chief_permission;
pub mod job;
pub mod role;
pub mod shift;
pub mod time_entry;
pub mod timesheet;
pub mod user;

/// Lets a strum string enum be decoded from a VARCHAR column with
/// `#[sqlx(try_from = "String")]`.
macro_rules! string_column {
    ($ty:ty) => {
        impl TryFrom<String> for $ty {
            type Error = strum::ParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

pub(crate) use string_column;
