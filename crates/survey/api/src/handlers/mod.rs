//! API handlers.

mod health;
mod surveys;

pub use health::health_check;
pub use surveys::{
    audit_trail, create_survey, get_survey, list_surveys, perform_transition, update_notes,
};
