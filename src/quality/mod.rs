//! Quality validation and scoring.
//!
//! Validity ([`QualityGate`]) and the composite score ([`quality_score`]) are
//! independent outputs: a rejected recording still gets a score, and a
//! passing recording may score anywhere in `[0, 1]`.

pub mod gate;
pub mod score;

pub use gate::{QualityGate, QualityIssue, QualityRejection};
pub use score::quality_score;
