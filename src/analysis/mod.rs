// src/analysis/mod.rs
//
// Per-track movement analysis.
//
// Signal flow:
//   Tracked boxes → track_history (centroid window) → MovementSample
//   MovementSample → violation_classifier (direction rule + debounce) → confirmed?

pub mod track_history;
pub mod violation_classifier;

pub use track_history::TrackHistoryStore;
pub use violation_classifier::ViolationClassifier;
