// Master reference data
pub mod master;

// Job corpus
pub mod job;

// Subscribers & action history
pub mod user;

// Derived per-user preference state
pub mod profile;

// Per-job scoring artifacts
pub mod enrichment;

// Sections, picks & delivery queue
pub mod picks;
