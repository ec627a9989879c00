pub mod attendance;
pub mod student;
pub mod teacher;
