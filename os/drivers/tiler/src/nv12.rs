//! Co-packing planner for paired luma (8-bit) and chroma (16-bit, half
//! width) blocks.
//!
//! Everything here is pure arithmetic in slots. A luma block of `w` slots
//! comes with a chroma block of `(w + 1) / 2` slots; the planner decides
//! whether the pairs are better laid out in two separate areas or
//! interleaved in one shared area.

use crate::config::Nv12Template;
use alloc::vec::Vec;
use tiler_info::container::CONTAINER_WIDTH;

/// Band of the 8-bit format, in slots.
pub const BAND_8: u16 = 64;
/// Band of the 16-bit format, in slots.
pub const BAND_16: u16 = 32;

#[inline]
const fn align_up(x: i32, a: i32) -> i32 {
    (x + a - 1) & !(a - 1)
}

/// Outcome of [`best_pack`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Pack {
    pub count: u16,
    /// Width of the area holding `count` blocks.
    pub area: u16,
    /// `count · width · 1024 / area`.
    pub efficiency: u32,
}

/// Greedy count of `width`-slot blocks, each starting at `offset` modulo
/// `align`, that can share one area while keeping the area within the same
/// `band` stride class.
///
/// Returns the count with the best efficiency, or a count of 0 if not even
/// one block fits.
#[must_use]
pub fn best_pack(offset: u16, align: u16, band: u16, width: u16, max_count: u16) -> Pack {
    let (o, a, b, w) = (i32::from(offset), i32::from(align.max(1)), i32::from(band), i32::from(width));
    let e = align_up(w, a);
    let stride = align_up(o + w, b);
    let mut used = stride;
    let mut best = Pack {
        count: 0,
        area: 0,
        efficiency: 0,
    };

    let mut m = 0i32;
    while m < i32::from(max_count) && o + m * e + w <= i32::from(CONTAINER_WIDTH) && stride == align_up(used - o - m * e, b)
    {
        m += 1;
        #[allow(clippy::cast_sign_loss)]
        let efficiency = (m * w * 1024 / used) as u32;
        if efficiency > best.efficiency {
            best = Pack {
                count: narrow(m),
                area: narrow(used),
                efficiency,
            };
        }
        used = align_up(o + m * e + w, b);
    }
    best
}

/// Slot positions of paired blocks inside one shared area.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Nv12Plan {
    /// Area width.
    pub area: u16,
    /// `(luma_left, chroma_left)` per pair, relative to the area.
    pub coords: Vec<(u16, u16)>,
}

impl Nv12Plan {
    #[inline]
    #[must_use]
    pub fn count(&self) -> u16 {
        u16::try_from(self.coords.len()).unwrap_or(u16::MAX)
    }

    fn push(&mut self, luma: i32, chroma: i32) {
        self.coords.push((narrow(luma), narrow(chroma)));
    }

    /// Every block lies inside the area and no two blocks overlap.
    #[must_use]
    pub fn is_feasible(&self, width: u16) -> bool {
        let chroma_width = width.div_ceil(2);
        let mut spans: Vec<(u16, u16)> = self
            .coords
            .iter()
            .flat_map(|&(l, c)| [(l, l + width), (c, c + chroma_width)])
            .collect();
        spans.sort_unstable();
        spans.iter().all(|&(_, end)| end <= self.area) && spans.windows(2).all(|pair| pair[0].1 <= pair[1].0)
    }
}

#[inline]
fn narrow(value: i32) -> u16 {
    u16::try_from(value.max(0)).unwrap_or(u16::MAX)
}

/// Scoring of a plan placing `placed` of `wanted` pairs in `area` slots.
///
/// Fewer rounds of `area`-sized reservations dominate; the efficiency of the
/// area breaks ties. A plan placing nothing scores 0.
#[must_use]
pub fn score(placed: u16, width: u16, area: u16, wanted: u16) -> i64 {
    if placed == 0 || area == 0 {
        return 0;
    }
    let (n, w, ar) = (i64::from(placed), i64::from(width), i64::from(area));
    let rounds = i64::from(wanted.div_ceil(placed));
    0x1000_0000 - rounds * ar * 32 + 1024 * n * ((w * 3 + 1) >> 1) / ar
}

/// Separate plan: luma blocks in one area, chroma blocks in a second one.
///
/// Returns the pair count both areas admit and a weighted area.
#[must_use]
pub fn separate(offset: u16, align: u16, width: u16, n: u16) -> Pack {
    let luma = best_pack(offset, align, BAND_8, width, n);
    let chroma = best_pack(offset >> 1, (align >> 1).max(1), BAND_16, width.div_ceil(2), luma.count);
    Pack {
        count: chroma.count,
        area: chroma.area.saturating_mul(3),
        efficiency: chroma.efficiency,
    }
}

/// Progressive: `AAAAaaaaBBbbCc`.
///
/// Each run of luma blocks is followed by its half-width chroma blocks, which
/// in turn leave room for a narrower run.
#[must_use]
pub fn progressive(offset: u16, align: u16, width: u16, n: u16) -> Nv12Plan {
    let (o, a, w, n) = (i32::from(offset), i32::from(align.max(1)), i32::from(width), i32::from(n));
    let area = i32::from(BAND_8);
    let mut plan = Nv12Plan {
        area: BAND_8,
        coords: Vec::new(),
    };

    let mut x = o;
    let mut m = 0;
    while x + w < area && m < n {
        let upper = (area + x) >> 1;
        let mut l = upper;
        while x + w <= upper && m < n {
            plan.push(x, l);
            l = (area + x + w + 1) >> 1;
            x = align_up(x + w - o, a) + o;
            m += 1;
        }
        x = align_up(l - o, a) + o;
    }
    plan
}

/// Reverse progressive: the mirror image of [`progressive`].
#[must_use]
pub fn reverse_progressive(offset: u16, align: u16, width: u16, n: u16) -> Nv12Plan {
    let a = align.max(1);
    let mirrored_offset = (a - (offset + width) % a) % a;
    let plan = progressive(mirrored_offset, a, width, n);
    let area = plan.area;
    let coords = plan
        .coords
        .iter()
        .map(|&(luma, chroma)| {
            Some((
                area.checked_sub(luma + width)?,
                area.checked_sub(chroma + width.div_ceil(2))?,
            ))
        })
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default();
    Nv12Plan { area, coords }
}

/// Simple interleave: `aAbcBdeCfgDhEFGH`.
///
/// Only applies to blocks narrower than the alignment whose chroma halves
/// provably land in the gaps between luma blocks.
#[must_use]
pub fn interleave(offset: u16, align: u16, width: u16, n: u16) -> Nv12Plan {
    let (o, a, w, n) = (i32::from(offset), i32::from(align.max(1)), i32::from(width), i32::from(n));
    let area = i32::from(BAND_8);
    let mut plan = Nv12Plan {
        area: BAND_8,
        coords: Vec::new(),
    };

    let e = (o + w) % a;
    let o1 = (o >> 1) % a;
    let e1 = ((o + w + 1) >> 1) % a;
    let o2 = o1 + (a >> 2);
    let e2 = e1 + (a >> 2);

    if w < a && o < e && e1 <= o && (e2 <= o || o2 >= e) {
        let mut x = o;
        let mut m = 0;
        while x + w <= area && m < n {
            plan.push(x, x >> 1);
            x += a;
            m += 1;
        }
    }
    plan
}

/// Butterfly: `AAbbaaBB`.
///
/// Pairs alternate between the left half of the area (chroma in the right
/// half) and the right half (chroma in the left half).
#[must_use]
pub fn butterfly(offset: u16, align: u16, width: u16, n: u16) -> Nv12Plan {
    let (o, a, w, n) = (i32::from(offset), i32::from(align.max(1)), i32::from(width), i32::from(n));
    let area = i32::from(BAND_8);
    let mut plan = Nv12Plan {
        area: BAND_8,
        coords: Vec::new(),
    };

    let e = align_up(w, a);
    if e == 0 {
        return plan;
    }
    let o2 = area - (a - (o + w) % a) % a;
    let m = ((o2 - 2 * o).min(2 * o2 - o - area).div_euclid(3) - w).div_euclid(e) + 1;

    let mut placed = 0;
    let mut i = 0;
    while i < m && placed < n {
        let x = o + i * e;
        plan.push(x, (x + area) >> 1);
        placed += 1;
        if placed < n {
            let x = o2 - i * e - w;
            plan.push(x, x >> 1);
            placed += 1;
        }
        i += 1;
    }
    plan
}

/// One large pair in an area of `roundUp(offset + width, band)`, chroma
/// before or after the luma block.
#[must_use]
pub fn large_pair(offset: u16, align: u16, width: u16, n: u16) -> Nv12Plan {
    let (o, a, w) = (i32::from(offset), i32::from(align.max(1)), i32::from(width));
    let band = i32::from(BAND_8);
    let w1 = (w + 1) >> 1;
    let area = align_up(o + w, band);
    let mut plan = Nv12Plan {
        area: narrow(area),
        coords: Vec::new(),
    };
    if n == 0 {
        return plan;
    }

    let mut d = 0;
    while d + o + w <= area {
        let before = ((o + d) % band) >> 1;
        if before + w1 <= o + d {
            plan.push(o + d, before);
            return plan;
        }

        let after = before + align_up(d + o + w - before, band >> 1);
        if after + w1 <= area {
            plan.push(o + d, after);
            return plan;
        }
        d += a;
    }
    plan
}

fn template_plan(template: &Nv12Template, offset: u16, align: u16, width: u16, n: u16) -> Option<Nv12Plan> {
    let (o, a, w) = (i32::from(offset), i32::from(align.max(1)), i32::from(width));
    let (to, tw) = (i32::from(template.offset), i32::from(template.width));
    if template.align < align || o + w + align_up(to - o, a) > to + tw {
        return None;
    }
    let count = usize::from(template.count.min(n));
    Some(Nv12Plan {
        area: template.area,
        coords: template.coords.iter().copied().take(count).collect(),
    })
}

/// Shared-area plan: the closed-form layouts in turn until one places every
/// pair, then the tuned templates, then the large-pair fallback.
#[must_use]
pub fn together(offset: u16, align: u16, width: u16, n: u16, templates: &[Nv12Template]) -> Nv12Plan {
    let methods: [fn(u16, u16, u16, u16) -> Nv12Plan; 4] = [progressive, reverse_progressive, interleave, butterfly];

    let mut best = Nv12Plan::default();
    for method in methods {
        if !best.coords.is_empty() && best.count() >= n {
            break;
        }
        let plan = method(offset, align, width, n);
        if plan.count() > best.count() && plan.is_feasible(width) {
            best = plan;
        }
    }

    for template in templates {
        if template.count < best.count() {
            break;
        }
        if let Some(plan) = template_plan(template, offset, align, width, n)
            && plan.is_feasible(width)
        {
            best = plan;
            break;
        }
    }

    if best.coords.is_empty() {
        let plan = large_pair(offset, align, width, n);
        if plan.is_feasible(width) {
            best = plan;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_NV12_TEMPLATES;

    #[test]
    fn best_pack_fills_one_band() {
        let pack = best_pack(0, 4, 64, 4, 100);
        assert_eq!((pack.count, pack.area, pack.efficiency), (16, 64, 1024));

        let pack = best_pack(0, 4, 64, 4, 5);
        assert_eq!((pack.count, pack.area), (5, 64));
    }

    #[test]
    fn best_pack_reports_nothing_when_nothing_fits() {
        assert_eq!(best_pack(0, 1, 64, 300, 4).count, 0);
        assert_eq!(best_pack(0, 1, 64, 4, 0).count, 0);
    }

    #[test]
    fn progressive_places_nine_pairs() {
        let plan = progressive(0, 2, 4, 9);
        assert_eq!(plan.area, 64);
        assert_eq!(
            plan.coords,
            [(0, 32), (4, 34), (8, 36), (12, 38), (16, 40), (20, 42), (24, 44), (28, 46), (48, 56)]
        );
        assert!(plan.is_feasible(4));
    }

    #[test]
    fn reverse_progressive_mirrors() {
        let plan = reverse_progressive(0, 2, 4, 9);
        assert_eq!(plan.count(), 9);
        assert_eq!(plan.coords[0], (60, 30));
        assert!(plan.is_feasible(4));
    }

    #[test]
    fn butterfly_alternates_halves() {
        let plan = butterfly(0, 4, 12, 2);
        assert_eq!(plan.coords, [(0, 32), (52, 26)]);
        assert!(plan.is_feasible(12));

        let plan = butterfly(26, 4, 4, 4);
        assert!(plan.coords.is_empty());
    }

    #[test]
    fn interleave_requires_narrow_blocks() {
        assert!(interleave(0, 4, 8, 4).coords.is_empty());
        assert!(interleave(1, 4, 1, 3).coords.is_empty());

        let plan = interleave(5, 8, 1, 3);
        assert_eq!(plan.coords, [(5, 2), (13, 6), (21, 10)]);
        assert!(plan.is_feasible(1));
    }

    #[test]
    fn large_pair_places_chroma_around_luma() {
        let before = large_pair(32, 64, 30, 1);
        assert_eq!(before.area, 64);
        assert_eq!(before.coords, [(32, 16)]);
        assert!(before.is_feasible(30));

        let after = large_pair(0, 2, 20, 1);
        assert_eq!(after.coords, [(0, 32)]);

        assert!(large_pair(0, 2, 100, 1).coords.is_empty());
    }

    #[test]
    fn together_prefers_closed_forms_without_templates() {
        let plan = together(0, 2, 4, 9, &[]);
        assert_eq!(plan, progressive(0, 2, 4, 9));
    }

    #[test]
    fn together_uses_a_matching_template() {
        let plan = together(2, 4, 4, 9, DEFAULT_NV12_TEMPLATES);
        assert_eq!(plan.coords, DEFAULT_NV12_TEMPLATES[0].coords);
        assert_eq!(plan.area, 64);
    }

    #[test]
    fn together_falls_back_to_a_large_pair() {
        let plan = together(60, 64, 10, 3, DEFAULT_NV12_TEMPLATES);
        assert_eq!(plan.coords, [(60, 30)]);
        assert_eq!(plan.area, 128);
    }

    #[test]
    fn scores_prefer_fewer_rounds_then_density() {
        let combined = score(9, 4, 64, 9);
        let separate_plan = separate(0, 2, 4, 9);
        assert_eq!((separate_plan.count, separate_plan.area), (9, 96));
        let separate_score = score(separate_plan.count, 4, separate_plan.area, 9);
        assert_eq!(combined, 0x1000_0000 - 2048 + 864);
        assert_eq!(separate_score, 0x1000_0000 - 3072 + 576);
        assert!(combined > separate_score);
        assert_eq!(score(0, 4, 64, 9), 0);
    }

    #[test]
    fn plans_never_exceed_the_request() {
        for n in 1..20 {
            for w in 1..40 {
                for (o, a) in [(0, 2), (2, 4), (0, 8), (4, 8), (1, 2)] {
                    let plan = together(o, a, w, n, DEFAULT_NV12_TEMPLATES);
                    assert!(plan.count() <= n, "o={o} a={a} w={w} n={n}");
                    assert!(plan.coords.is_empty() || plan.is_feasible(w));
                    assert!(separate(o, a, w, n).count <= n);
                }
            }
        }
    }
}
