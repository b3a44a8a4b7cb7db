use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::analysis::{MAX_FIT_SCORE, MIN_FIT_SCORE};
use crate::errors::AppError;
use crate::models::candidate::{CandidateRecord, CreateCandidateRequest, UpdateCandidateRequest};
use crate::persistence::{postgres, NewCandidate};
use crate::state::AppState;

fn validate_fit_score(score: f64) -> Result<(), AppError> {
    if score.is_finite() && (MIN_FIT_SCORE..=MAX_FIT_SCORE).contains(&score) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "fit_score must be between {MIN_FIT_SCORE} and {MAX_FIT_SCORE}, got {score}"
        )))
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("candidate {id}"))
}

/// POST /candidates
pub async fn handle_create(
    State(state): State<AppState>,
    Json(req): Json<CreateCandidateRequest>,
) -> Result<(StatusCode, Json<CandidateRecord>), AppError> {
    validate_fit_score(req.fit_score)?;
    let candidate = NewCandidate {
        name: req.name.trim().to_string(),
        email: req.email.trim().to_string(),
        college: req.college.trim().to_string(),
        fit_score: req.fit_score,
        resume_text: req.resume_text,
        source_message_id: None,
    };
    let record = postgres::insert_candidate(&state.db, &candidate).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /candidates
pub async fn handle_list(
    State(state): State<AppState>,
) -> Result<Json<Vec<CandidateRecord>>, AppError> {
    Ok(Json(postgres::list_candidates(&state.db).await?))
}

/// GET /candidates/:id
pub async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CandidateRecord>, AppError> {
    postgres::get_candidate(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// PUT /candidates/:id
pub async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCandidateRequest>,
) -> Result<Json<CandidateRecord>, AppError> {
    if let Some(score) = req.fit_score {
        validate_fit_score(score)?;
    }
    postgres::update_candidate(&state.db, id, &req)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// DELETE /candidates/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if postgres::delete_candidate(&state.db, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_score_bounds() {
        assert!(validate_fit_score(0.0).is_ok());
        assert!(validate_fit_score(100.0).is_ok());
        assert!(validate_fit_score(-1.0).is_err());
        assert!(validate_fit_score(100.5).is_err());
        assert!(validate_fit_score(f64::NAN).is_err());
    }
}
