//! Font-size fit search.
//!
//! Sizes shrink in whole-point steps from a starting size until the text
//! fits the width budget or the floor is reached. The search is bounded by
//! `start_size - min_size` iterations.

use super::fonts::FontFamily;

const FIT_STEP: f32 = 1.0;

/// Largest size at or below `start_size` at which `text` is no wider than
/// `max_width`, or `min_size` when nothing in range fits.
///
/// # Panics
///
/// Panics if `max_width` is not positive. That is a caller bug.
pub fn fit_single(text: &str, font: FontFamily, start_size: f32, max_width: f32, min_size: f32) -> f32 {
    fit_uniform(&[text], font, start_size, max_width, min_size)
}

/// Like [`fit_single`], but one size must fit every string at once, so
/// lines sized together stay visually consistent.
///
/// # Panics
///
/// Panics if `max_width` is not positive.
pub fn fit_uniform<S: AsRef<str>>(
    texts: &[S],
    font: FontFamily,
    start_size: f32,
    max_width: f32,
    min_size: f32,
) -> f32 {
    assert!(max_width > 0.0, "fit search needs a positive width budget, got {max_width}");

    let fits = |size: f32| texts.iter().all(|t| font.measure(t.as_ref(), size) <= max_width);

    let mut size = start_size;
    while size > min_size && !fits(size) {
        size = (size - FIT_STEP).max(min_size);
    }
    size
}
