//! Quality validation and processing lifecycle for crowd-sourced speech
//! recordings.
//!
//! | Module | Role |
//! |--------|------|
//! | [`audio`] | decode, downmix, resample, canonical WAV encoding, trimming |
//! | [`analysis`] | SNR / clipping / silence / spectral metrics, segmentation |
//! | [`quality`] | pass/fail gates and the composite score |
//! | [`recording`] | entities, repository and blob storage seams |
//! | [`pipeline`] | status machine, upload intake, dispatch, orchestrator |
//! | [`config`] | TOML settings and platform paths |

pub mod analysis;
pub mod audio;
pub mod config;
pub mod pipeline;
pub mod quality;
pub mod recording;

#[cfg(test)]
mod test_support;
