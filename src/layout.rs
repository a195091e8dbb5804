use kurbo::Point;
use rand::Rng;

/// Results render in pages of this many items.
pub const GROUP_SIZE: usize = 8;

/// Rotation jitter applied to scattered images, in whole degrees.
pub const IMAGE_ROTATION_JITTER_DEG: std::ops::Range<i32> = -6..6;

/// A scatter position in percentage-of-container coordinates (the container
/// center is `(50, 50)`), with an optional rotation for image cards.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub rotation_deg: i32,
}

/// Position item `index` of `total` on a ring around the container center.
///
/// Angle is `2π·index/total`; the radius gets a uniform jitter of
/// `±jitter_range/2` from the injected random source, and the ring is
/// stretched by the per-axis aspect factors.
pub fn scatter<R: Rng>(
    index: usize,
    total: usize,
    base_radius: f64,
    jitter_range: f64,
    aspect_x: f64,
    aspect_y: f64,
    rng: &mut R,
) -> Point {
    let total = total.max(1);
    let angle = std::f64::consts::TAU * index as f64 / total as f64;
    let radius = base_radius + (rng.r#gen::<f64>() - 0.5) * jitter_range;
    Point::new(
        50.0 + aspect_x * radius * angle.cos(),
        50.0 + aspect_y * radius * angle.sin(),
    )
}

/// [`scatter`] plus the rotation jitter image cards get.
pub fn scatter_rotated<R: Rng>(
    index: usize,
    total: usize,
    base_radius: f64,
    jitter_range: f64,
    aspect_x: f64,
    aspect_y: f64,
    rng: &mut R,
) -> Placement {
    let p = scatter(index, total, base_radius, jitter_range, aspect_x, aspect_y, rng);
    Placement {
        x: p.x,
        y: p.y,
        rotation_deg: rng.gen_range(IMAGE_ROTATION_JITTER_DEG),
    }
}

/// Number of display pages for `len` items (always at least one).
pub fn group_count(len: usize) -> usize {
    len.div_ceil(GROUP_SIZE).max(1)
}

/// The visible page of `items` for a wrap-around group index.
pub fn page<T>(items: &[T], group_idx: usize) -> &[T] {
    let idx = group_idx % group_count(items.len());
    let start = idx * GROUP_SIZE;
    let end = (start + GROUP_SIZE).min(items.len());
    &items[start.min(items.len())..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn zero_jitter_lands_on_the_nominal_ring() {
        let mut rng = StdRng::seed_from_u64(1);
        for total in 1..=12usize {
            for i in 0..total {
                let p = scatter(i, total, 40.0, 0.0, 1.0, 1.0, &mut rng);
                let (dx, dy) = (p.x - 50.0, p.y - 50.0);
                let r = (dx * dx + dy * dy).sqrt();
                assert!((r - 40.0).abs() < 1e-9);

                let angle = std::f64::consts::TAU * i as f64 / total as f64;
                assert!((dx - 40.0 * angle.cos()).abs() < 1e-9);
                assert!((dy - 40.0 * angle.sin()).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn jitter_stays_within_half_range() {
        let mut rng = StdRng::seed_from_u64(2);
        for i in 0..500usize {
            let p = scatter(i, 500, 50.0, 30.0, 1.0, 1.0, &mut rng);
            let (dx, dy) = (p.x - 50.0, p.y - 50.0);
            let r = (dx * dx + dy * dy).sqrt();
            assert!(r >= 35.0 - 1e-9 && r <= 65.0 + 1e-9, "r = {r}");
        }
    }

    #[test]
    fn aspect_scales_each_axis() {
        let mut rng = StdRng::seed_from_u64(3);
        // index 0 of n sits at angle 0: pure +x displacement
        let p = scatter(0, 4, 50.0, 0.0, 1.4, 0.9, &mut rng);
        assert!((p.x - (50.0 + 1.4 * 50.0)).abs() < 1e-9);
        assert!((p.y - 50.0).abs() < 1e-9);
        // index 1 of 4 sits at angle π/2: pure +y displacement
        let p = scatter(1, 4, 50.0, 0.0, 1.4, 0.9, &mut rng);
        assert!((p.x - 50.0).abs() < 1e-9);
        assert!((p.y - (50.0 + 0.9 * 50.0)).abs() < 1e-9);
    }

    #[test]
    fn seeded_rng_makes_scatter_reproducible() {
        let a = scatter(3, 8, 50.0, 30.0, 1.4, 0.9, &mut StdRng::seed_from_u64(9));
        let b = scatter(3, 8, 50.0, 30.0, 1.4, 0.9, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn rotation_jitter_is_bounded() {
        let mut rng = StdRng::seed_from_u64(4);
        for i in 0..200usize {
            let pl = scatter_rotated(i, 200, 50.0, 30.0, 1.4, 0.9, &mut rng);
            assert!((-6..6).contains(&pl.rotation_deg), "rot = {}", pl.rotation_deg);
        }
    }

    #[test]
    fn paging_wraps_and_clamps() {
        let items: Vec<u32> = (0..20).collect();
        assert_eq!(group_count(items.len()), 3);
        assert_eq!(page(&items, 0), &items[0..8]);
        assert_eq!(page(&items, 2), &items[16..20]);
        // wrap-around
        assert_eq!(page(&items, 3), &items[0..8]);

        let empty: Vec<u32> = Vec::new();
        assert_eq!(group_count(0), 1);
        assert!(page(&empty, 5).is_empty());
    }
}
