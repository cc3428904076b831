//! Biorhythm engine.
//!
//! Three sinusoidal cycles start at zero on the day of birth and repeat with
//! fixed periods: physical (23 days), emotional (28 days) and intellectual
//! (33 days). Everything here is pure: no I/O, no shared state, no failure modes.
//! Callers must ensure a birth date exists before calling in.

use std::f64::consts::PI;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Below this absolute value a single-day reading is labeled [`Phase::Critical`].
pub const PHASE_CRITICAL_THRESHOLD: f64 = 0.05;

/// Above this value (or below its negation) a reading is [`Phase::High`] / [`Phase::Low`].
pub const PHASE_PEAK_THRESHOLD: f64 = 0.7;

/// Below this absolute value a day is reported by [`find_critical_days`].
///
/// Wider than [`PHASE_CRITICAL_THRESHOLD`]: it drives a forward-looking heads-up
/// window rather than the single-day label.
pub const CRITICAL_DAY_THRESHOLD: f64 = 0.1;

/// One of the three biorhythm cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cycle {
    /// 23-day cycle.
    Physical,
    /// 28-day cycle.
    Emotional,
    /// 33-day cycle.
    Intellectual,
}

impl Cycle {
    /// All cycles in display order.
    pub const ALL: [Self; 3] = [Self::Physical, Self::Emotional, Self::Intellectual];

    /// Period in days.
    #[must_use]
    pub const fn period(&self) -> u32 {
        match self {
            Self::Physical => 23,
            Self::Emotional => 28,
            Self::Intellectual => 33,
        }
    }

    /// Cycle name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Physical => "physical",
            Self::Emotional => "emotional",
            Self::Intellectual => "intellectual",
        }
    }

    /// Chart color for the cycle.
    #[must_use]
    pub const fn color(&self) -> &'static str {
        match self {
            Self::Physical => "#ef4444",
            Self::Emotional => "#3b82f6",
            Self::Intellectual => "#22c55e",
        }
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Qualitative label for a cycle reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Near a zero crossing.
    Critical,
    /// Near the positive peak.
    High,
    /// Near the negative trough.
    Low,
    /// Increasing towards tomorrow.
    Rising,
    /// Decreasing towards tomorrow.
    Falling,
}

/// Whole calendar days from `a` to `b` (negative when `b` is earlier).
#[must_use]
pub fn days_between(a: NaiveDate, b: NaiveDate) -> i64 {
    (b - a).num_days()
}

/// `sin(2π · days / period)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cycle_value(days_since_birth: i64, period: u32) -> f64 {
    (2.0 * PI * days_since_birth as f64 / f64::from(period)).sin()
}

/// Classify a reading.
///
/// The critical test comes first; the high/low comparisons are strict, so a
/// value of exactly `0.7` falls through to the rising/falling comparison with
/// the next day's value.
#[must_use]
pub fn phase_of(value: f64, period: u32, days_since_birth: i64) -> Phase {
    if value.abs() < PHASE_CRITICAL_THRESHOLD {
        return Phase::Critical;
    }
    if value > PHASE_PEAK_THRESHOLD {
        return Phase::High;
    }
    if value < -PHASE_PEAK_THRESHOLD {
        return Phase::Low;
    }

    let next = cycle_value(days_since_birth + 1, period);
    if next > value {
        Phase::Rising
    } else {
        Phase::Falling
    }
}

/// Canned advice for a cycle in a phase.
#[must_use]
pub const fn describe(cycle: Cycle, phase: Phase) -> &'static str {
    match (cycle, phase) {
        (Cycle::Physical, Phase::Critical) => "Journée critique physique : votre énergie est instable, ménagez-vous et évitez les efforts intenses.",
        (Cycle::Physical, Phase::High) => "Énergie physique au sommet : profitez-en pour le sport et les activités exigeantes.",
        (Cycle::Physical, Phase::Low) => "Énergie physique basse : privilégiez le repos et la récupération.",
        (Cycle::Physical, Phase::Rising) => "Votre vitalité remonte progressivement, reprenez doucement vos activités.",
        (Cycle::Physical, Phase::Falling) => "Votre énergie physique décline, pensez à ralentir le rythme.",
        (Cycle::Emotional, Phase::Critical) => "Journée critique émotionnelle : vos émotions peuvent être changeantes, restez indulgent envers vous-même.",
        (Cycle::Emotional, Phase::High) => "Sensibilité et créativité au plus haut : vos rêves peuvent être particulièrement vivants.",
        (Cycle::Emotional, Phase::Low) => "Humeur en retrait : accordez-vous du calme et de la douceur.",
        (Cycle::Emotional, Phase::Rising) => "Votre équilibre émotionnel s'améliore, l'humeur se fait plus légère.",
        (Cycle::Emotional, Phase::Falling) => "Votre sensibilité diminue, prenez du recul face aux tensions.",
        (Cycle::Intellectual, Phase::Critical) => "Journée critique intellectuelle : la concentration peut faiblir, évitez les décisions importantes.",
        (Cycle::Intellectual, Phase::High) => "Esprit vif et clair : idéal pour apprendre, analyser et décider.",
        (Cycle::Intellectual, Phase::Low) => "Esprit moins alerte : privilégiez les tâches simples et la réflexion lente.",
        (Cycle::Intellectual, Phase::Rising) => "Votre clarté mentale progresse, c'est le moment de planifier.",
        (Cycle::Intellectual, Phase::Falling) => "Votre concentration diminue, fractionnez votre travail.",
    }
}

/// One cycle evaluated on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReading {
    /// Which cycle.
    pub cycle: Cycle,
    /// Days elapsed since birth.
    pub days_since_birth: i64,
    /// Cycle value rounded to three decimals.
    pub value: f64,
    /// Value as a whole percentage.
    pub percentage: i32,
    /// Qualitative phase.
    pub phase: Phase,
    /// Advice for the phase.
    pub description: String,
}

impl CycleReading {
    #[allow(clippy::cast_possible_truncation)]
    fn evaluate(cycle: Cycle, days_since_birth: i64) -> Self {
        let raw = cycle_value(days_since_birth, cycle.period());
        let phase = phase_of(raw, cycle.period(), days_since_birth);
        Self {
            cycle,
            days_since_birth,
            value: round3(raw),
            percentage: (raw * 100.0).round() as i32,
            phase,
            description: describe(cycle, phase).to_string(),
        }
    }
}

/// All three cycles on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Biorhythm {
    /// 23-day cycle.
    pub physical: CycleReading,
    /// 28-day cycle.
    pub emotional: CycleReading,
    /// 33-day cycle.
    pub intellectual: CycleReading,
}

/// Evaluate the three cycles for `target`.
#[must_use]
pub fn calculate_biorhythm(birth_date: NaiveDate, target: NaiveDate) -> Biorhythm {
    let days = days_between(birth_date, target);
    Biorhythm {
        physical: CycleReading::evaluate(Cycle::Physical, days),
        emotional: CycleReading::evaluate(Cycle::Emotional, days),
        intellectual: CycleReading::evaluate(Cycle::Intellectual, days),
    }
}

/// Rounded values of the three cycles on one date, for charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBiorhythm {
    /// The date.
    pub date: NaiveDate,
    /// Physical value, three decimals.
    pub physical: f64,
    /// Emotional value, three decimals.
    pub emotional: f64,
    /// Intellectual value, three decimals.
    pub intellectual: f64,
}

/// Iterator over every day of an inclusive date range, ascending.
///
/// Cloning the iterator restarts nothing and shares nothing: it is a plain
/// function of its inputs.
#[derive(Debug, Clone)]
pub struct BiorhythmRange {
    birth_date: NaiveDate,
    next: Option<NaiveDate>,
    end: NaiveDate,
}

impl Iterator for BiorhythmRange {
    type Item = DailyBiorhythm;

    fn next(&mut self) -> Option<Self::Item> {
        let date = self.next.filter(|d| *d <= self.end)?;
        self.next = date.succ_opt();

        let days = days_between(self.birth_date, date);
        Some(DailyBiorhythm {
            date,
            physical: round3(cycle_value(days, Cycle::Physical.period())),
            emotional: round3(cycle_value(days, Cycle::Emotional.period())),
            intellectual: round3(cycle_value(days, Cycle::Intellectual.period())),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .next
            .map_or(0, |d| usize::try_from(days_between(d, self.end) + 1).unwrap_or(0));
        (remaining, Some(remaining))
    }
}

/// Daily values for every date from `start` to `end` inclusive.
/// Empty when `end` precedes `start`.
#[must_use]
pub fn calculate_biorhythm_range(
    birth_date: NaiveDate,
    start: NaiveDate,
    end: NaiveDate,
) -> BiorhythmRange {
    BiorhythmRange {
        birth_date,
        next: Some(start),
        end,
    }
}

/// A day on which one cycle is near a zero crossing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalDay {
    /// The date.
    pub date: NaiveDate,
    /// The crossing cycle.
    pub cycle: Cycle,
    /// Chart color for the cycle.
    pub color: String,
}

/// Scan `days_ahead` days starting at `from` (inclusive) for near-zero readings.
///
/// One entry per crossing cycle; a date may appear up to three times. The scan
/// stops early at the end of the representable calendar.
#[must_use]
pub fn find_critical_days(birth_date: NaiveDate, from: NaiveDate, days_ahead: u32) -> Vec<CriticalDay> {
    let mut found = Vec::new();

    let span = usize::try_from(days_ahead).unwrap_or(usize::MAX);
    for date in from.iter_days().take(span) {
        let days = days_between(birth_date, date);

        for cycle in Cycle::ALL {
            if cycle_value(days, cycle.period()).abs() < CRITICAL_DAY_THRESHOLD {
                found.push(CriticalDay {
                    date,
                    cycle,
                    color: cycle.color().to_string(),
                });
            }
        }
    }

    found
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
