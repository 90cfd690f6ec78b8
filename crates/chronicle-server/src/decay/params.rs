// decay/params.rs
// Per-memory-type decay parameters and LTP resistance bands

use chronicle_types::MemoryType;

/// Decay parameters for one memory type.
#[derive(Debug, Clone, Copy)]
pub struct DecayParams {
    /// Base half-life in hours.
    pub base_half_life_hours: f64,
    /// Salience never decays below this.
    pub floor: f64,
    /// Multiplier applied to rehearsal boosts for this type.
    pub boost_multiplier: f64,
}

/// Look up decay parameters for a memory type (unclassified items decay as
/// `Default`).
pub fn params_for(memory_type: Option<MemoryType>) -> DecayParams {
    match memory_type.unwrap_or_default() {
        MemoryType::Episodic => DecayParams {
            base_half_life_hours: 24.0,
            floor: 0.10,
            boost_multiplier: 1.20,
        },
        MemoryType::Semantic => DecayParams {
            base_half_life_hours: 168.0,
            floor: 0.15,
            boost_multiplier: 1.00,
        },
        MemoryType::Procedural => DecayParams {
            base_half_life_hours: 720.0,
            floor: 0.20,
            boost_multiplier: 0.90,
        },
        MemoryType::Emotional => DecayParams {
            base_half_life_hours: 48.0,
            floor: 0.12,
            boost_multiplier: 1.30,
        },
        MemoryType::Default => DecayParams {
            base_half_life_hours: 72.0,
            floor: 0.10,
            boost_multiplier: 1.00,
        },
    }
}

/// Minimum salience for a memory type.
pub fn min_salience(memory_type: Option<MemoryType>) -> f64 {
    params_for(memory_type).floor
}

/// Clamp a salience value into the legal range for its memory type.
pub fn clamp_salience(salience: f64, memory_type: Option<MemoryType>) -> f64 {
    salience.clamp(min_salience(memory_type), 1.0)
}

/// Long-term-potentiation resistance: how strongly the current salience
/// multiplies the half-life. Stronger memories resist decay.
///
/// The ladder is lower-inclusive: a salience exactly on a band boundary
/// takes the stronger factor (pinned by the worked decay scenarios).
pub fn ltp_resistance(salience: f64) -> f64 {
    if salience >= 0.8 {
        2.0
    } else if salience >= 0.6 {
        1.5
    } else if salience >= 0.4 {
        1.0
    } else if salience >= 0.2 {
        0.75
    } else {
        0.5
    }
}
