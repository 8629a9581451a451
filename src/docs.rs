use crate::api::clock::ClockRequest;
use crate::api::companies::CreateCompany;
use crate::api::crew_chief::{GrantPermission, ShiftRights};
use crate::api::jobs::{CreateJob, JobFilter};
use crate::api::personnel::{AssignWorker, SyncImport, SyncSummary};
use crate::api::response::Meta;
use crate::api::shifts::CreateShift;
use crate::api::time_entries::CorrectEntry;
use crate::api::timesheets::{RejectReq, SignatureReq, TimesheetDetail};
use crate::api::users::CreateUser;
use crate::model::{
    assigned_personnel::{AssignedPersonnel, WorkerStatus},
    company::Company,
    crew_chief_permission::{CrewChiefPermission, PermissionType},
    job::{Job, JobStatus},
    shift::{RoleCode, Shift, ShiftStatus},
    time_entry::TimeEntry,
    timesheet::{Timesheet, TimesheetStatus},
    user::User,
};
use crate::models::{LoginReqDto, RegisterReq};
use crate::staffing::clock::DisplayState;
use crate::staffing::fulfillment::{Fulfillment, RoleFulfillment};
use crate::staffing::store::{ShiftDetail, WorkerView};
use crate::utils::cache::CacheStats;
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Crew Scheduling API",
        version = "1.0.0",
        description = r#"
## Crew Scheduling Service

Backend for staffing event and production shifts: client companies contract
**jobs**, jobs own **shifts**, workers are assigned to shifts in a role and
clock in and out, and the hours end up on an approvable **timesheet**.

### Key Features
- **Shifts & staffing**
  - Required headcount per role (CC, SH, FO, RFO, RG, GL) and live fulfillment
  - Assign, unassign and bulk sync-import of workers
- **Time tracking**
  - Up to three clock-in/clock-out entries per worker
  - End-shift, end-all and no-show handling
- **Timesheets**
  - Finalization is blocked until every worker has ended their shift
  - Company and manager signatures, rejection with reason, CSV export
- **Crew chief permissions**
  - Grants scoped to a client company, a job or a single shift

### Security
Endpoints under `/api/v1` require a **JWT Bearer** access token obtained
from `/auth/login`.

### Response Format
Every JSON response uses `{ "success", "data" | "error", "meta" }`; list
endpoints carry pagination in `meta`.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::users::create_user,
        crate::api::users::list_users,

        crate::api::companies::list_companies,
        crate::api::companies::create_company,

        crate::api::jobs::list_jobs,
        crate::api::jobs::get_job,
        crate::api::jobs::create_job,
        crate::api::jobs::update_job,
        crate::api::jobs::delete_job,
        crate::api::jobs::list_job_shifts,

        crate::api::shifts::list_shifts,
        crate::api::shifts::get_shift,
        crate::api::shifts::create_shift,
        crate::api::shifts::update_shift,
        crate::api::shifts::delete_shift,

        crate::api::personnel::assign_worker,
        crate::api::personnel::unassign_worker,
        crate::api::personnel::sync_import,

        crate::api::clock::clock_in,
        crate::api::clock::clock_out,
        crate::api::clock::end_shift,
        crate::api::clock::no_show,
        crate::api::clock::end_all,
        crate::api::time_entries::correct_time_entry,

        crate::api::timesheets::create_timesheet,
        crate::api::timesheets::list_timesheets,
        crate::api::timesheets::get_timesheet,
        crate::api::timesheets::finalize_timesheet,
        crate::api::timesheets::company_approve,
        crate::api::timesheets::manager_approve,
        crate::api::timesheets::reject_timesheet,
        crate::api::timesheets::export_timesheet,
        crate::api::timesheets::delete_timesheet,

        crate::api::crew_chief::list_permissions,
        crate::api::crew_chief::grant_permission,
        crate::api::crew_chief::revoke_permission,
        crate::api::crew_chief::my_shift_rights,

        crate::api::admin::cache_stats,
        crate::api::admin::clear_cache
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            User,
            CreateUser,
            Company,
            CreateCompany,
            Job,
            JobStatus,
            JobFilter,
            CreateJob,
            Shift,
            ShiftStatus,
            RoleCode,
            CreateShift,
            ShiftDetail,
            WorkerView,
            DisplayState,
            Fulfillment,
            RoleFulfillment,
            AssignedPersonnel,
            WorkerStatus,
            AssignWorker,
            SyncImport,
            SyncSummary,
            TimeEntry,
            ClockRequest,
            CorrectEntry,
            Timesheet,
            TimesheetStatus,
            TimesheetDetail,
            SignatureReq,
            RejectReq,
            CrewChiefPermission,
            PermissionType,
            GrantPermission,
            ShiftRights,
            CacheStats,
            Meta
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token refresh and registration"),
        (name = "User", description = "User administration"),
        (name = "Company", description = "Client companies"),
        (name = "Job", description = "Jobs contracted by companies"),
        (name = "Shift", description = "Shifts, headcount and staffing detail"),
        (name = "Personnel", description = "Worker assignment"),
        (name = "Clock", description = "Clock-in/out and time entry corrections"),
        (name = "Timesheet", description = "Timesheet approval and export"),
        (name = "Crew Chief", description = "Crew chief management grants"),
        (name = "Admin", description = "Operational endpoints"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_staffing_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/shifts/{shift_id}/clock-in"));
        assert!(doc.paths.paths.contains_key("/api/v1/timesheets/{timesheet_id}/finalize"));
        assert!(doc.paths.paths.contains_key("/auth/login"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("ShiftDetail"));
    }
}
