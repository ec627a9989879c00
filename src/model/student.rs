use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "id": 1,
        "studentId": "STU-001",
        "name": "Jane Doe",
        "email": "jane@school.edu",
        "class": "10",
        "section": "A",
        "profilePhoto": "",
        "faceEmbedding": [],
        "registeredBy": 1
    })
)]
pub struct Student {
    pub id: u64,

    /// Human-readable roll number, unique across the directory.
    pub student_id: String,

    pub name: String,
    pub email: Option<String>,
    pub class: String,
    pub section: String,
    pub profile_photo: String,

    #[schema(value_type = Vec<f64>)]
    pub face_embedding: Json<Vec<f64>>,

    pub registered_by: Option<u64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
