//! Cognitive distortion detection
//!
//! Matches a free-text message against a phrase library of unhelpful-thinking
//! categories (English and Turkish phrasings). Each category carries its own
//! base confidence weight. Detection is pure and synchronous: the only state
//! is the compiled rule set, built once in `DistortionDetector::new`.
//!
//! Scoring:
//! - aggregate confidence = mean of matched weights
//! - severity = high if count x confidence >= 2.5, moderate if >= 1.5, else low
//! - recommended techniques = first technique of each matched distortion, deduplicated
//! - high severity with confidence > 0.8 also yields an immediate intervention

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Category, InsightCandidate, Priority, Provenance, Technique};

const HIGH_SEVERITY_SCORE: f64 = 2.5;
const MODERATE_SEVERITY_SCORE: f64 = 1.5;
const INTERVENTION_MIN_CONFIDENCE: f64 = 0.8;

/// Unhelpful thinking pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionKind {
    AllOrNothing,
    Catastrophizing,
    Overgeneralization,
    MindReading,
    FortuneTelling,
    EmotionalReasoning,
    ShouldStatements,
    Labeling,
    Personalization,
    MentalFilter,
    DisqualifyingPositive,
}

impl DistortionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllOrNothing => "all_or_nothing",
            Self::Catastrophizing => "catastrophizing",
            Self::Overgeneralization => "overgeneralization",
            Self::MindReading => "mind_reading",
            Self::FortuneTelling => "fortune_telling",
            Self::EmotionalReasoning => "emotional_reasoning",
            Self::ShouldStatements => "should_statements",
            Self::Labeling => "labeling",
            Self::Personalization => "personalization",
            Self::MentalFilter => "mental_filter",
            Self::DisqualifyingPositive => "disqualifying_positive",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AllOrNothing => "All-or-nothing thinking",
            Self::Catastrophizing => "Catastrophizing",
            Self::Overgeneralization => "Overgeneralization",
            Self::MindReading => "Mind reading",
            Self::FortuneTelling => "Fortune telling",
            Self::EmotionalReasoning => "Emotional reasoning",
            Self::ShouldStatements => "Should statements",
            Self::Labeling => "Labeling",
            Self::Personalization => "Personalization",
            Self::MentalFilter => "Mental filter",
            Self::DisqualifyingPositive => "Disqualifying the positive",
        }
    }

    pub fn all() -> &'static [DistortionKind] {
        &[
            Self::AllOrNothing,
            Self::Catastrophizing,
            Self::Overgeneralization,
            Self::MindReading,
            Self::FortuneTelling,
            Self::EmotionalReasoning,
            Self::ShouldStatements,
            Self::Labeling,
            Self::Personalization,
            Self::MentalFilter,
            Self::DisqualifyingPositive,
        ]
    }

    /// Base confidence contributed by a match
    pub fn weight(&self) -> f64 {
        match self {
            Self::Catastrophizing => 0.9,
            Self::ShouldStatements => 0.85,
            Self::AllOrNothing => 0.8,
            Self::Labeling => 0.8,
            Self::MindReading => 0.75,
            Self::FortuneTelling => 0.75,
            Self::Overgeneralization => 0.7,
            Self::EmotionalReasoning => 0.7,
            Self::Personalization => 0.7,
            Self::DisqualifyingPositive => 0.7,
            Self::MentalFilter => 0.65,
        }
    }

    /// Lowercase phrases that signal this distortion
    pub fn phrases(&self) -> &'static [&'static str] {
        match self {
            Self::AllOrNothing => &[
                "completely",
                "totally",
                "perfect",
                "total failure",
                "all or nothing",
                "either way",
                "nothing works",
                "tamamen",
                "mükemmel",
                "ya hep ya hiç",
                "hiçbir şey işe yaramıyor",
            ],
            Self::Catastrophizing => &[
                "disaster",
                "terrible",
                "horrible",
                "worst thing",
                "end of the world",
                "can't handle",
                "cannot handle",
                "ruined",
                "felaket",
                "korkunç",
                "berbat",
                "dünyanın sonu",
                "dayanamam",
                "mahvoldu",
            ],
            Self::Overgeneralization => &[
                "always",
                "never",
                "every time",
                "everyone",
                "nobody",
                "nothing ever",
                "her zaman",
                "asla",
                "hiçbir zaman",
                "hep",
                "herkes",
                "hiç kimse",
                "her seferinde",
            ],
            Self::MindReading => &[
                "they think",
                "he thinks",
                "she thinks",
                "everyone thinks",
                "they must think",
                "judging me",
                "benim hakkımda düşünüyor",
                "beni yargılıyor",
                "ne düşündüğünü biliyorum",
            ],
            Self::FortuneTelling => &[
                "will never change",
                "won't work",
                "going to fail",
                "it will go wrong",
                "no point trying",
                "değişmeyecek",
                "işe yaramayacak",
                "başaramayacağım",
                "kötü gidecek",
            ],
            Self::EmotionalReasoning => &[
                "i feel like a",
                "i feel stupid",
                "i feel worthless",
                "feels like it's true",
                "hissediyorum o yüzden",
                "değersiz hissediyorum",
            ],
            Self::ShouldStatements => &[
                "should",
                "shouldn't",
                "must",
                "have to",
                "ought to",
                "gerekir",
                "gerekirdi",
                "zorundayım",
            ],
            Self::Labeling => &[
                "i'm a failure",
                "i am a failure",
                "i'm useless",
                "i'm weak",
                "i'm pathetic",
                "i'm an idiot",
                "loser",
                "başarısızım",
                "işe yaramazım",
                "zayıfım",
                "aptalım",
            ],
            Self::Personalization => &[
                "my fault",
                "because of me",
                "i ruined",
                "i'm to blame",
                "benim yüzümden",
                "benim suçum",
            ],
            Self::MentalFilter => &[
                "only bad",
                "nothing good",
                "only the negative",
                "sadece kötü",
                "hiç iyi bir şey",
            ],
            Self::DisqualifyingPositive => &[
                "doesn't count",
                "just luck",
                "anyone could",
                "that was nothing",
                "sayılmaz",
                "sadece şans",
                "herkes yapabilir",
            ],
        }
    }

    /// Word endings that signal this distortion on any stem. Turkish marks
    /// necessity with a verb suffix ("olmalıyım", "gitmeli").
    pub fn suffixes(&self) -> &'static [&'static str] {
        match self {
            Self::ShouldStatements => &[
                "malıydım",
                "meliydim",
                "malıyım",
                "meliyim",
                "malısın",
                "melisin",
                "malıyız",
                "meliyiz",
                "malı",
                "meli",
            ],
            _ => &[],
        }
    }

    /// Techniques that address this distortion, most specific first
    pub fn techniques(&self) -> &'static [Technique] {
        match self {
            Self::AllOrNothing => &[Technique::BalancedThinking, Technique::CognitiveRestructuring],
            Self::Catastrophizing => &[Technique::Decatastrophizing, Technique::Grounding],
            Self::Overgeneralization => &[Technique::EvidenceExamination, Technique::BalancedThinking],
            Self::MindReading => &[Technique::EvidenceExamination, Technique::CognitiveRestructuring],
            Self::FortuneTelling => &[Technique::Decatastrophizing, Technique::EvidenceExamination],
            Self::EmotionalReasoning => &[Technique::Mindfulness, Technique::EvidenceExamination],
            Self::ShouldStatements => &[Technique::SelfCompassion, Technique::CognitiveRestructuring],
            Self::Labeling => &[Technique::SelfCompassion, Technique::CognitiveRestructuring],
            Self::Personalization => &[Technique::EvidenceExamination, Technique::SelfCompassion],
            Self::MentalFilter => &[Technique::BalancedThinking, Technique::Mindfulness],
            Self::DisqualifyingPositive => &[Technique::BalancedThinking, Technique::SelfCompassion],
        }
    }
}

impl fmt::Display for DistortionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity tier of an assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    Low,
    Moderate,
    High,
}

impl SeverityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityTier::Low => "low",
            SeverityTier::Moderate => "moderate",
            SeverityTier::High => "high",
        }
    }
}

/// Result of assessing one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistortionAssessment {
    pub detected: Vec<DistortionKind>,
    /// Mean of the matched weights, 0 when nothing matched
    pub confidence: f64,
    pub severity: SeverityTier,
    pub recommended: Vec<Technique>,
    pub intervention: Option<InsightCandidate>,
    pub rationale: String,
}

impl DistortionAssessment {
    pub fn is_empty(&self) -> bool {
        self.detected.is_empty()
    }
}

/// The little context detection needs
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext {
    pub now: DateTime<Utc>,
    /// Validity of an immediate-intervention candidate
    pub intervention_ttl: Duration,
}

impl DetectionContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            intervention_ttl: Duration::hours(24),
        }
    }
}

/// One compiled phrase rule
#[derive(Debug, Clone)]
pub struct DistortionRule {
    pub kind: DistortionKind,
    pattern: Regex,
}

impl DistortionRule {
    pub fn compile(kind: DistortionKind) -> Result<Self> {
        let alternatives = |items: &[&str]| items.iter().map(|p| regex::escape(p)).collect::<Vec<_>>().join("|");

        let mut source = format!(r"(?i)\b(?:{})\b", alternatives(kind.phrases()));
        // Suffixes need a stem in front, so no leading boundary
        if !kind.suffixes().is_empty() {
            source.push_str(&format!(r"|\w+(?:{})\b", alternatives(kind.suffixes())));
        }
        let pattern = Regex::new(&source)?;
        Ok(Self { kind, pattern })
    }

    /// Whether the message contains any of this rule's phrases
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Mean of matched weights
pub fn aggregate_confidence(kinds: &[DistortionKind]) -> f64 {
    if kinds.is_empty() {
        return 0.0;
    }
    kinds.iter().map(|k| k.weight()).sum::<f64>() / kinds.len() as f64
}

/// Severity from match count and aggregate confidence
pub fn severity_for(count: usize, confidence: f64) -> SeverityTier {
    let score = count as f64 * confidence;
    if score >= HIGH_SEVERITY_SCORE {
        SeverityTier::High
    } else if score >= MODERATE_SEVERITY_SCORE {
        SeverityTier::Moderate
    } else {
        SeverityTier::Low
    }
}

/// First technique of each distortion, deduplicated, in detection order
pub fn recommended_techniques(kinds: &[DistortionKind]) -> Vec<Technique> {
    let mut techniques = Vec::new();
    for kind in kinds {
        if let Some(first) = kind.techniques().first() {
            if !techniques.contains(first) {
                techniques.push(*first);
            }
        }
    }
    techniques
}

/// A ready-made intervention for a technique
#[derive(Debug, Clone, Copy)]
pub struct InterventionTemplate {
    pub technique: Technique,
    pub title: &'static str,
    pub message: &'static str,
    pub steps: &'static [&'static str],
}

const INTERVENTIONS: &[InterventionTemplate] = &[
    InterventionTemplate {
        technique: Technique::Decatastrophizing,
        title: "Shrink the worst case",
        message: "Your thoughts are jumping to the worst possible outcome. Let's look at what is most likely instead.",
        steps: &[
            "Write down the worst outcome you fear",
            "Write the most likely outcome",
            "Name one thing you would do if the worst did happen",
        ],
    },
    InterventionTemplate {
        technique: Technique::Decatastrophizing,
        title: "Ten minutes, ten days, ten months",
        message: "Strong feelings make everything look permanent. Try stretching the timeline.",
        steps: &[
            "How will this feel in ten minutes?",
            "In ten days?",
            "In ten months?",
        ],
    },
    InterventionTemplate {
        technique: Technique::SelfCompassion,
        title: "Talk to yourself like a friend",
        message: "You're being very hard on yourself right now. A kinder voice helps more than a harsher one.",
        steps: &[
            "Put a hand on your chest and take three slow breaths",
            "Ask what you would say to a friend in this exact spot",
            "Say that sentence to yourself, out loud if you can",
        ],
    },
    InterventionTemplate {
        technique: Technique::EvidenceExamination,
        title: "Check the evidence",
        message: "This thought feels true, but feelings are not facts. Let's weigh it.",
        steps: &[
            "List the evidence that supports the thought",
            "List the evidence against it",
            "Write a more balanced version of the thought",
        ],
    },
    InterventionTemplate {
        technique: Technique::BalancedThinking,
        title: "Find the middle ground",
        message: "Things rarely fall at the extremes. Look for the shades of grey.",
        steps: &[
            "Rate the situation from 0 to 100 instead of good or bad",
            "Name one part that went okay",
            "Rephrase the thought without 'always' or 'never'",
        ],
    },
    InterventionTemplate {
        technique: Technique::CognitiveRestructuring,
        title: "Rewrite the thought",
        message: "Catch the thought, check it, change it.",
        steps: &[
            "Write the exact thought down",
            "Name the thinking trap it falls into",
            "Write an alternative you can believe at least 50%",
        ],
    },
    InterventionTemplate {
        technique: Technique::Grounding,
        title: "5-4-3-2-1 grounding",
        message: "When everything feels too much, bring your attention back to the room you're in.",
        steps: &[
            "Name 5 things you can see",
            "4 things you can touch",
            "3 things you can hear",
            "2 things you can smell and 1 you can taste",
        ],
    },
    InterventionTemplate {
        technique: Technique::Mindfulness,
        title: "Notice without judging",
        message: "You don't have to act on a feeling to let it pass.",
        steps: &[
            "Name the feeling in one word",
            "Notice where it sits in your body",
            "Breathe into that spot for one minute",
        ],
    },
    InterventionTemplate {
        technique: Technique::UrgeSurfing,
        title: "Surf the urge",
        message: "Urges rise, peak and fall like waves, usually within 20 minutes.",
        steps: &[
            "Set a timer for 15 minutes",
            "Rate the urge now from 0 to 10",
            "Rate it again when the timer ends",
        ],
    },
    InterventionTemplate {
        technique: Technique::BehavioralActivation,
        title: "One small action",
        message: "Doing something small and kind for yourself can shift your mood more than thinking about it.",
        steps: &[
            "Pick one activity that takes under 10 minutes",
            "Do it now",
            "Notice how you feel afterwards",
        ],
    },
    InterventionTemplate {
        technique: Technique::ProblemSolving,
        title: "Break it down",
        message: "A big problem gets lighter when it has a first step.",
        steps: &[
            "Describe the problem in one sentence",
            "List three possible next steps",
            "Pick the easiest one and schedule it",
        ],
    },
];

/// Intervention set for a technique (statically built)
pub fn interventions_for(technique: Technique) -> Vec<&'static InterventionTemplate> {
    INTERVENTIONS
        .iter()
        .filter(|i| i.technique == technique)
        .collect()
}

/// Pick one intervention deterministically for a given message
fn select_intervention(technique: Technique, message: &str) -> Option<&'static InterventionTemplate> {
    let options = interventions_for(technique);
    if options.is_empty() {
        return None;
    }
    let seed = message.bytes().fold(0usize, |acc, b| acc.wrapping_add(b as usize));
    Some(options[seed % options.len()])
}

/// Turn an intervention template into a candidate
pub fn intervention_candidate(
    template: &InterventionTemplate,
    kinds: &[DistortionKind],
    confidence: f64,
    ctx: &DetectionContext,
) -> InsightCandidate {
    InsightCandidate::new(
        Category::Coping,
        Priority::High,
        template.title,
        template.message,
        Provenance::RuleEngine,
        ctx.now,
    )
    .with_advice(template.steps.iter().copied())
    .with_technique(template.technique)
    .with_patterns(kinds.iter().map(|k| k.as_str()))
    .with_confidence(confidence)
    .with_source("distortion_detector")
    .with_ttl(ctx.intervention_ttl)
}

/// Distortion detector with a compiled, immutable rule set
#[derive(Debug, Clone)]
pub struct DistortionDetector {
    enabled: bool,
    rules: Vec<DistortionRule>,
}

impl Default for DistortionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DistortionDetector {
    /// Build the detector with the built-in phrase library
    pub fn new() -> Self {
        let rules = DistortionKind::all()
            .iter()
            .map(|kind| DistortionRule::compile(*kind).expect("built-in phrases form a valid regex"))
            .collect();
        Self {
            enabled: true,
            rules,
        }
    }

    /// A detector that refuses to run (configuration switched it off)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            rules: Vec::new(),
        }
    }

    pub fn with_enabled(enabled: bool) -> Self {
        if enabled {
            Self::new()
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Matched distortion kinds, in library order
    pub fn detect_kinds(&self, message: &str) -> Vec<DistortionKind> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(message))
            .map(|rule| rule.kind)
            .collect()
    }

    /// Assess one message.
    ///
    /// Returns `Error::FeatureDisabled` when the detector is switched off;
    /// callers skip the stage.
    pub fn assess(&self, message: &str, ctx: &DetectionContext) -> Result<DistortionAssessment> {
        if !self.enabled {
            return Err(Error::FeatureDisabled("distortion_detector"));
        }

        let detected = self.detect_kinds(message);
        let confidence = aggregate_confidence(&detected);
        let severity = severity_for(detected.len(), confidence);
        let recommended = recommended_techniques(&detected);

        let intervention = if severity == SeverityTier::High && confidence > INTERVENTION_MIN_CONFIDENCE {
            recommended
                .first()
                .and_then(|t| select_intervention(*t, message))
                .map(|template| intervention_candidate(template, &detected, confidence, ctx))
        } else {
            None
        };

        let rationale = if detected.is_empty() {
            "No unhelpful thinking patterns detected".to_string()
        } else {
            format!(
                "Detected {} ({} pattern{}, mean confidence {:.2}, severity {})",
                detected
                    .iter()
                    .map(|k| k.label())
                    .collect::<Vec<_>>()
                    .join(", "),
                detected.len(),
                if detected.len() == 1 { "" } else { "s" },
                confidence,
                severity.as_str()
            )
        };

        tracing::debug!(
            detected = detected.len(),
            confidence,
            severity = severity.as_str(),
            "Distortion assessment complete"
        );

        Ok(DistortionAssessment {
            detected,
            confidence,
            severity,
            recommended,
            intervention,
            rationale,
        })
    }
}
