// decay/engine.rs
// Pure salience decay computation
//
// Blends exponential half-life decay with an Ebbinghaus forgetting curve:
// early inactivity follows the curve's steep-then-flattening shape, long
// inactivity converges to plain half-life decay. Half-life itself is
// stretched by long-term potentiation (strong memories resist), recall
// history, and the environmental context.

use super::context::EnvironmentalContext;
use super::params::{ltp_resistance, params_for};
use chronicle_types::MemoryType;

/// Inactivity under 15 minutes never decays.
const MIN_DECAY_HOURS: f64 = 0.25;
/// Per-recall half-life boost, and its cap.
const RECALL_BOOST_PER_RECALL: f64 = 0.02;
const RECALL_BOOST_CAP: f64 = 0.30;
/// The Ebbinghaus blend flattens over this window.
const FLATTEN_HOURS: f64 = 24.0;
/// The combined modifier never drops below this.
const MODIFIER_FLOOR: f64 = 0.15;

/// Input state for one decay computation.
#[derive(Debug, Clone, Copy)]
pub struct DecayInput {
    pub salience: f64,
    pub hours_since_access: f64,
    pub memory_type: Option<MemoryType>,
    pub recall_count: i64,
}

/// Modifier values recorded for audit logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayModifiers {
    pub ltp_factor: f64,
    pub recall_boost: f64,
    pub env_multiplier: f64,
    pub ebbinghaus_modifier: f64,
}

/// Result of one decay computation.
#[derive(Debug, Clone, Copy)]
pub struct DecayOutcome {
    pub new_salience: f64,
    pub decay_amount: f64,
    pub modifiers: DecayModifiers,
}

/// Compute the decayed salience for one memory. Pure and idempotent for a
/// given input.
pub fn compute_decay(input: &DecayInput, context: EnvironmentalContext) -> DecayOutcome {
    let params = params_for(input.memory_type);
    let ltp_factor = ltp_resistance(input.salience);
    let recall_boost =
        (input.recall_count.max(0) as f64 * RECALL_BOOST_PER_RECALL).min(RECALL_BOOST_CAP);
    let env_multiplier = context.decay_multiplier();

    if input.hours_since_access < MIN_DECAY_HOURS {
        return DecayOutcome {
            new_salience: input.salience,
            decay_amount: 0.0,
            modifiers: DecayModifiers {
                ltp_factor,
                recall_boost,
                env_multiplier,
                ebbinghaus_modifier: 1.0,
            },
        };
    }

    let effective_half_life =
        params.base_half_life_hours * ltp_factor * (1.0 + recall_boost) / env_multiplier;
    let base_ratio = 0.5f64.powf(input.hours_since_access / effective_half_life);

    // Ebbinghaus blend: weight the asymptotic forgetting curve early,
    // plain exponential decay late.
    let tau = input.hours_since_access / FLATTEN_HOURS;
    let forget = 0.15 + 0.85 * (-1.5 * tau).exp();
    let curve_weight = (-tau).exp();
    let modifier =
        (base_ratio * (1.0 - curve_weight) + forget * curve_weight).max(MODIFIER_FLOOR);

    let new_salience = (input.salience * modifier).max(params.floor);

    DecayOutcome {
        new_salience,
        decay_amount: (input.salience - new_salience).max(0.0),
        modifiers: DecayModifiers {
            ltp_factor,
            recall_boost,
            env_multiplier,
            ebbinghaus_modifier: modifier,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(
        salience: f64,
        hours: f64,
        memory_type: MemoryType,
        recall_count: i64,
    ) -> DecayInput {
        DecayInput {
            salience,
            hours_since_access: hours,
            memory_type: Some(memory_type),
            recall_count,
        }
    }

    #[test]
    fn test_episodic_decay_at_48h() {
        // salience 0.8, episodic, no recalls, 48h inactive, neutral context:
        // H_eff = 24 * 2.0 = 48, base ratio 0.5, modifier ~0.458
        let outcome = compute_decay(
            &input(0.8, 48.0, MemoryType::Episodic, 0),
            EnvironmentalContext::LowActivity,
        );
        assert!(
            (0.35..=0.40).contains(&outcome.new_salience),
            "got {}",
            outcome.new_salience
        );
        assert_eq!(outcome.modifiers.ltp_factor, 2.0);
        assert_eq!(outcome.modifiers.env_multiplier, 1.0);
    }

    #[test]
    fn test_semantic_high_recall_resists_decay() {
        // H_eff = 168 * 1.5 * 1.3 / 0.5 = 655.2 → barely half a half-life
        let outcome = compute_decay(
            &input(0.7, 168.0, MemoryType::Semantic, 20),
            EnvironmentalContext::FocusedLearning,
        );
        assert!(outcome.new_salience >= 0.58, "got {}", outcome.new_salience);
        assert_eq!(outcome.modifiers.recall_boost, 0.30, "boost caps at 0.30");
    }

    #[test]
    fn test_floor_clamp_after_long_inactivity() {
        let outcome = compute_decay(
            &input(0.12, 10_000.0, MemoryType::Episodic, 0),
            EnvironmentalContext::LowActivity,
        );
        assert_eq!(outcome.new_salience, 0.10);
    }

    #[test]
    fn test_sub_fifteen_minute_guard() {
        let outcome = compute_decay(
            &input(0.9, 0.2, MemoryType::Episodic, 0),
            EnvironmentalContext::RestPeriod,
        );
        assert_eq!(outcome.new_salience, 0.9);
        assert_eq!(outcome.decay_amount, 0.0);
    }

    #[test]
    fn test_decay_is_monotone_in_inactivity() {
        let mut previous = 1.0;
        for hours in [1.0, 6.0, 24.0, 72.0, 168.0, 720.0] {
            let outcome = compute_decay(
                &input(0.6, hours, MemoryType::Default, 0),
                EnvironmentalContext::LowActivity,
            );
            assert!(
                outcome.new_salience <= previous,
                "salience rose between checkpoints at {hours}h"
            );
            previous = outcome.new_salience;
        }
    }

    #[test]
    fn test_floor_respected_for_every_type() {
        for (memory_type, floor) in [
            (MemoryType::Episodic, 0.10),
            (MemoryType::Semantic, 0.15),
            (MemoryType::Procedural, 0.20),
            (MemoryType::Emotional, 0.12),
            (MemoryType::Default, 0.10),
        ] {
            let outcome = compute_decay(
                &input(0.9, 50_000.0, memory_type, 0),
                EnvironmentalContext::RestPeriod,
            );
            assert!(
                outcome.new_salience >= floor,
                "{memory_type:?} fell below its floor"
            );
        }
    }

    #[test]
    fn test_ltp_stronger_memories_lose_smaller_fraction() {
        // Decay fraction at S=0.9 must be below the fraction at S=0.3 over 72h
        let strong = compute_decay(
            &input(0.9, 72.0, MemoryType::Default, 0),
            EnvironmentalContext::LowActivity,
        );
        let weak = compute_decay(
            &input(0.3, 72.0, MemoryType::Default, 0),
            EnvironmentalContext::LowActivity,
        );
        let strong_fraction = strong.decay_amount / 0.9;
        let weak_fraction = weak.decay_amount / 0.3;
        assert!(
            strong_fraction < weak_fraction,
            "strong {strong_fraction} vs weak {weak_fraction}"
        );
    }

    #[test]
    fn test_context_changes_half_life() {
        let focused = compute_decay(
            &input(0.6, 48.0, MemoryType::Default, 0),
            EnvironmentalContext::FocusedLearning,
        );
        let rest = compute_decay(
            &input(0.6, 48.0, MemoryType::Default, 0),
            EnvironmentalContext::RestPeriod,
        );
        assert!(focused.new_salience > rest.new_salience);
    }

    #[test]
    fn test_idempotent_for_same_input() {
        let i = input(0.55, 30.0, MemoryType::Emotional, 3);
        let a = compute_decay(&i, EnvironmentalContext::HighActivity);
        let b = compute_decay(&i, EnvironmentalContext::HighActivity);
        assert_eq!(a.new_salience, b.new_salience);
        assert_eq!(a.modifiers, b.modifiers);
    }
}
