//! Distance metrics for comparing price shapes
//!
//! - **dtw**: min-max normalized, Sakoe-Chiba banded dynamic time warping
//! - **shape**: compact 8-dimensional shape descriptor with cosine similarity
//! - **helpers**: normalization, correlation and similarity remaps shared by both
//!
//! Everything here is a pure function of its inputs. Degenerate inputs map to
//! `None` or `+inf` instead of NaN so callers can pick an explicit fallback.

pub mod dtw;
pub mod helpers;
pub mod shape;

pub use dtw::{dtw_similarity, windowed_dtw, DEFAULT_DTW_WINDOW};
pub use helpers::*;
pub use shape::{extract_shape_features, ShapeFeatures, MIN_SHAPE_LEN, SHAPE_DIM};
