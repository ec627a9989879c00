use crate::api::attendance::{FaceAttendanceReq, MarkAttendanceReq};
use crate::api::student::{AddStudentReq, RegisterFaceReq};
use crate::api::teacher::ChangePasswordReq;
use crate::engine::{FaceMatch, Mark, MultiFaceOutcome, RecognizedMark, StudentSummary};
use crate::model::attendance::{AttendanceDay, AttendanceRecord, AttendanceStatus};
use crate::model::student::Student;
use crate::model::teacher::Teacher;
use crate::models::{LoginReqDto, RegisterReqDto};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Student Attendance System API",
        version = "1.0.0",
        description = r#"
## Student Attendance System

REST backend for classroom attendance: teachers register students
(optionally with a face photo), mark daily attendance manually or through an
external face-recognition service, and export CSV reports.

### 🔹 Key Features
- **Attendance**
  - Manual batch marking merged into one session per class/section per day
  - Single and multi-face recognition marking
  - Full-day reset and CSV exports
- **Student Directory**
  - CRUD, face enrollment, CSV export
- **Teacher Accounts**
  - Registration, login, profile, password change

### 🔐 Security
All non-auth endpoints require **JWT Bearer authentication**.

### 📦 Response Format
JSON-based RESTful responses with a `success` flag; CSV downloads for reports.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::teacher::get_profile,
        crate::api::teacher::update_profile,
        crate::api::teacher::change_password,

        crate::api::student::list_students,
        crate::api::student::get_student,
        crate::api::student::add_student,
        crate::api::student::update_student,
        crate::api::student::delete_student,
        crate::api::student::register_face,
        crate::api::student::download_students_csv,

        crate::api::attendance::mark_attendance,
        crate::api::attendance::list_attendance,
        crate::api::attendance::today_attendance,
        crate::api::attendance::attendance_by_date,
        crate::api::attendance::download_today_csv,
        crate::api::attendance::download_csv_by_date,
        crate::api::attendance::download_roster_csv,
        crate::api::attendance::face_attendance,
        crate::api::attendance::face_multiple_attendance,
        crate::api::attendance::face_status,
        crate::api::attendance::reset_today
    ),
    components(
        schemas(
            RegisterReqDto,
            LoginReqDto,
            ChangePasswordReq,
            Teacher,
            Student,
            AddStudentReq,
            RegisterFaceReq,
            AttendanceDay,
            AttendanceRecord,
            AttendanceStatus,
            Mark,
            MarkAttendanceReq,
            FaceAttendanceReq,
            FaceMatch,
            RecognizedMark,
            StudentSummary,
            MultiFaceOutcome
        )
    ),
    tags(
        (name = "Auth", description = "Teacher authentication APIs"),
        (name = "Teacher", description = "Teacher profile APIs"),
        (name = "Students", description = "Student directory APIs"),
        (name = "Attendance", description = "Attendance marking and report APIs"),
    )
)]
pub struct ApiDoc;
