//! Orientation-aware word ordering.
//!
//! Word centers are projected onto the principal axis of their covariance so
//! that slanted and vertical runs sort in true reading order. The sort is
//! deterministic for a fixed input: every comparison falls back to x, y and
//! text tie-breakers.

use crate::types::Word;

/// Variance below which the x spread is treated as degenerate (a vertical
/// column) and the sort falls back to y order.
const MIN_X_VARIANCE: f32 = 1.0;

/// Principal-axis slope below which the text is treated as horizontal.
const AXIS_ALIGNED_SLOPE: f32 = 0.12;

/// Sort words into reading order along their dominant direction.
pub fn sort_words_by_orientation(words: &mut [Word]) {
    if words.len() < 2 {
        return;
    }

    let n = words.len() as f32;
    let centers: Vec<(f32, f32)> = words.iter().map(|w| w.bbox.center()).collect();
    let mean_x = centers.iter().map(|c| c.0).sum::<f32>() / n;
    let mean_y = centers.iter().map(|c| c.1).sum::<f32>() / n;

    let mut var_x = 0.0f32;
    let mut var_y = 0.0f32;
    let mut cov_xy = 0.0f32;
    for &(x, y) in &centers {
        let dx = x - mean_x;
        let dy = y - mean_y;
        var_x += dx * dx;
        var_y += dy * dy;
        cov_xy += dx * dy;
    }
    var_x /= n;
    var_y /= n;
    cov_xy /= n;

    if var_x < MIN_X_VARIANCE {
        sort_by_y(words);
        return;
    }

    // First principal axis of the 2x2 covariance.
    let theta = 0.5 * (2.0 * cov_xy).atan2(var_x - var_y);
    let dir = (theta.cos(), theta.sin());

    if dir.0.abs() < 1e-6 {
        sort_by_y(words);
        return;
    }

    let slope = dir.1 / dir.0;
    if slope.abs() < AXIS_ALIGNED_SLOPE {
        sort_by_x(words);
        return;
    }

    // Flip so the projection increases in reading direction (left to right,
    // or top to bottom for steep axes).
    let dir = if dir.0 < 0.0 { (-dir.0, -dir.1) } else { dir };
    words.sort_by(|a, b| {
        let ca = a.bbox.center();
        let cb = b.bbox.center();
        let pa = (ca.0 - mean_x) * dir.0 + (ca.1 - mean_y) * dir.1;
        let pb = (cb.0 - mean_x) * dir.0 + (cb.1 - mean_y) * dir.1;
        pa.partial_cmp(&pb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| cmp_f32(ca.0, cb.0))
            .then_with(|| cmp_f32(ca.1, cb.1))
            .then_with(|| a.text.cmp(&b.text))
    });
}

fn cmp_f32(a: f32, b: f32) -> std::cmp::Ordering {
    a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
}

fn sort_by_x(words: &mut [Word]) {
    words.sort_by(|a, b| {
        cmp_f32(a.bbox.x0, b.bbox.x0)
            .then_with(|| cmp_f32(a.bbox.y0, b.bbox.y0))
            .then_with(|| a.text.cmp(&b.text))
    });
}

fn sort_by_y(words: &mut [Word]) {
    words.sort_by(|a, b| {
        cmp_f32(a.bbox.y0, b.bbox.y0)
            .then_with(|| cmp_f32(a.bbox.x0, b.bbox.x0))
            .then_with(|| a.text.cmp(&b.text))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;

    fn word(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> Word {
        Word::new(text, 90.0, BBox::new(x0, y0, x1, y1))
    }

    #[test]
    fn test_horizontal_text_sorts_by_x() {
        let mut words = vec![
            word("world", 60.0, 0.0, 100.0, 10.0),
            word("hello", 0.0, 1.0, 40.0, 11.0),
        ];
        sort_words_by_orientation(&mut words);
        assert_eq!(words[0].text, "hello");
        assert_eq!(words[1].text, "world");
    }

    #[test]
    fn test_vertical_column_sorts_by_y() {
        let mut words = vec![
            word("三", 10.0, 80.0, 30.0, 100.0),
            word("一", 10.0, 0.0, 30.0, 20.0),
            word("二", 10.0, 40.0, 30.0, 60.0),
        ];
        sort_words_by_orientation(&mut words);
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["一", "二", "三"]);
    }

    #[test]
    fn test_slanted_run_sorts_along_principal_axis() {
        // A 45-degree diagonal: projection order differs from plain x order
        // only if the axis is honored; both agree here, but the steep slope
        // exercises the projection path.
        let mut words = vec![
            word("c", 80.0, 80.0, 100.0, 100.0),
            word("a", 0.0, 0.0, 20.0, 20.0),
            word("b", 40.0, 40.0, 60.0, 60.0),
        ];
        sort_words_by_orientation(&mut words);
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_is_deterministic() {
        let make = || {
            vec![
                word("b", 40.0, 3.0, 60.0, 13.0),
                word("a", 0.0, 0.0, 20.0, 10.0),
                word("c", 80.0, 6.0, 100.0, 16.0),
            ]
        };
        let mut first = make();
        let mut second = make();
        sort_words_by_orientation(&mut first);
        sort_words_by_orientation(&mut second);
        assert_eq!(first, second);
    }
}
