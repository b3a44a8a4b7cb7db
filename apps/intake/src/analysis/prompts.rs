// Field extraction prompt and response schema.
// The schema and the validation in `analysis::mod` are one contract: rename a
// field here and the `RawCandidate` serde names must follow.

use serde_json::{json, Value};

pub const FIELD_NAME: &str = "name";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_COLLEGE: &str = "college";
pub const FIELD_FIT_SCORE: &str = "fitScore";

pub const RESUME_ANALYSIS_PROMPT: &str = r#"You are an advanced AI recruiter.
Analyze the following resume text and return a JSON object with exactly these keys:
{
  "name": "candidate full name",
  "email": "email address",
  "college": "college or university name",
  "fitScore": number between 0 and 100 indicating how suitable the candidate is for a software developer role
}

Base the fitScore on their skills, projects, and technical experience.
Use an empty string for any field that does not appear in the resume.

RESUME TEXT:
{resume_text}"#;

/// Response schema sent with every analysis request.
pub fn candidate_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            FIELD_NAME: { "type": "STRING", "description": "Candidate full name" },
            FIELD_EMAIL: { "type": "STRING", "description": "Email address" },
            FIELD_COLLEGE: { "type": "STRING", "description": "College name" },
            FIELD_FIT_SCORE: {
                "type": "NUMBER",
                "description": "Score between 0 and 100 based on suitability for software developer role"
            }
        },
        "required": [FIELD_NAME, FIELD_EMAIL, FIELD_COLLEGE, FIELD_FIT_SCORE]
    })
}
