pub mod csv;
pub mod db_utils;
pub mod face_api;
pub mod roll_cache;
pub mod roll_filter;
