//! Pipeline stages for merging chapter archives.
//!
//! Each submodule implements one step and is plain blocking code; the
//! orchestrator decides what runs where.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ extract ──▶ transform ──▶ group ──▶ merge
//! (classify)   (unzip)     (rename /     (regex    (zip / compose
//!                           render)       runs)     in batches)
//! ```
//!
//! 1. [`discover`]  — list the source root, classify archives by extension
//! 2. [`extract`]   — unpack each archive into its own chapter directory
//! 3. [`transform`] — turn each page into a flat unit, copied or rendered
//!    through [`render`]
//! 4. [`group`]     — split the unit stream into contiguous volumes
//! 5. [`merge`]     — write one artifact per output unit
//!
//! [`natural`] and [`partition`] are shared helpers for ordering and for
//! splitting work between workers.

pub mod discover;
pub mod extract;
pub mod group;
pub mod merge;
pub mod natural;
pub mod partition;
pub mod render;
pub mod transform;
