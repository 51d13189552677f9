//! Quality scoring for IMB candidates. A setup earns points for each clean
//! ingredient (block, impulse, retrace touch, rejection reaction, healthy RR
//! and stop distance, HTF alignment) and is mapped onto a tier.

use crate::model::signal::Tier;

#[derive(Debug, Clone, Copy)]
pub struct QualityMeta {
    pub has_block: bool,
    pub impulse_ok: bool,
    pub touch_ok: bool,
    pub reaction_ok: bool,
    pub rr_ok: bool,
    pub sl_pct: f64,
    pub htf_alignment: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Quality {
    pub score: u32,
    pub tier: Tier,
}

pub fn score_signal(meta: &QualityMeta) -> u32 {
    let mut score = 0u32;

    if meta.has_block {
        score += 25;
    }
    if meta.impulse_ok {
        score += 25;
    }
    if meta.touch_ok {
        score += 15;
    }
    if meta.reaction_ok {
        score += 15;
    }
    if meta.rr_ok {
        score += 10;
    }
    // Healthy stop distance: tight but not razor thin.
    if (0.20..=0.90).contains(&meta.sl_pct) {
        score += 10;
    }
    if meta.htf_alignment {
        score += 20;
    }

    score.min(150)
}

pub fn tier_from_score(score: u32) -> Tier {
    match score {
        120.. => Tier::APlus,
        100..=119 => Tier::A,
        80..=99 => Tier::B,
        _ => Tier::None,
    }
}

pub fn evaluate_quality(meta: &QualityMeta) -> Quality {
    let score = score_signal(meta);
    Quality {
        score,
        tier: tier_from_score(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_meta() -> QualityMeta {
        QualityMeta {
            has_block: true,
            impulse_ok: true,
            touch_ok: true,
            reaction_ok: true,
            rr_ok: true,
            sl_pct: 0.5,
            htf_alignment: true,
        }
    }

    #[test]
    fn perfect_setup_is_a_plus() {
        let q = evaluate_quality(&full_meta());
        assert_eq!(q.score, 120);
        assert_eq!(q.tier, Tier::APlus);
    }

    #[test]
    fn losing_htf_alignment_drops_one_tier() {
        let meta = QualityMeta {
            htf_alignment: false,
            ..full_meta()
        };
        let q = evaluate_quality(&meta);
        assert_eq!(q.score, 100);
        assert_eq!(q.tier, Tier::A);
    }

    #[test]
    fn extreme_stop_distance_loses_points() {
        let meta = QualityMeta {
            sl_pct: 2.5,
            ..full_meta()
        };
        assert_eq!(score_signal(&meta), 110);
    }

    #[test]
    fn weak_setup_maps_to_none() {
        let meta = QualityMeta {
            has_block: true,
            impulse_ok: false,
            touch_ok: false,
            reaction_ok: false,
            rr_ok: false,
            sl_pct: 3.0,
            htf_alignment: false,
        };
        let q = evaluate_quality(&meta);
        assert_eq!(q.tier, Tier::None);
    }
}
