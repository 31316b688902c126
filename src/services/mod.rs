// A: Master reference cache
pub mod masters;

// B: CSV ingest
pub mod ingest;

// C: Employer popularity aggregation
pub mod popularity;

// D: User profile derivation
pub mod profile;

// E: Job scoring & enrichment
pub mod scorer;

// F: Per-user matching
pub mod matcher;

// G: Section allocation
pub mod allocator;

// H: Delivery queue writing
pub mod queue;
