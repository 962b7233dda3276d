//! Rule-based detectors.
//!
//! Lightweight pattern matchers over the user's message. They only need to
//! honor the detector contract; anything smarter (an LLM classifier, say)
//! can be swapped in through the same traits.
//!
//! Both detectors tie what they find to one child: the child named in the
//! message, or the only child when the user has exactly one.

use async_trait::async_trait;
use lumi_core::detection::{KnowledgeDetector, RoutineDetector};
use lumi_core::error::DetectionError;
use lumi_core::family::{ChildProfile, KnowledgeItem, RoutineActivity, RoutineProposal};
use regex_lite::Regex;

/// Detector that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDetection;

#[async_trait]
impl KnowledgeDetector for NoDetection {
    fn name(&self) -> &str {
        "none"
    }

    async fn analyze(
        &self,
        _message: &str,
        _babies: &[ChildProfile],
    ) -> Result<Option<Vec<KnowledgeItem>>, DetectionError> {
        Ok(None)
    }

    fn should_confirm(&self, _detected: &[KnowledgeItem]) -> bool {
        false
    }

    fn confirmation_prompt(&self, _detected: &[KnowledgeItem]) -> String {
        String::new()
    }
}

#[async_trait]
impl RoutineDetector for NoDetection {
    fn name(&self) -> &str {
        "none"
    }

    async fn analyze(
        &self,
        _message: &str,
        _babies: &[ChildProfile],
    ) -> Result<Option<RoutineProposal>, DetectionError> {
        Ok(None)
    }

    fn should_confirm(&self, _detected: &RoutineProposal) -> bool {
        false
    }

    fn confirmation_prompt(&self, _detected: &RoutineProposal) -> String {
        String::new()
    }
}

/// The child a message is about: the one it names, else the only child.
fn target_child<'a>(message_lower: &str, babies: &'a [ChildProfile]) -> Option<&'a ChildProfile> {
    babies
        .iter()
        .find(|b| mentions(message_lower, &b.name.trim().to_lowercase()))
        .or(match babies {
            [only] => Some(only),
            _ => None,
        })
}

/// Whole-word containment.
fn mentions(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn compile(detector: &str, pattern: &str) -> Result<Regex, DetectionError> {
    Regex::new(pattern).map_err(|e| DetectionError::Failed {
        detector: detector.to_string(),
        reason: format!("invalid pattern {pattern:?}: {e}"),
    })
}

// ── Knowledge ─────────────────────────────────────────────────────────────

/// Lowercase letters plus Spanish/Portuguese accented letters and spaces.
const PHRASE: &str = "[a-záéíóúñüãõç ]+";

struct KnowledgeRule {
    pattern: Regex,
    category: &'static str,
    subcategory: &'static str,
    title_prefix: &'static str,
    importance: u8,
}

/// Spots allergies, intolerances, medical conditions, and food preferences.
pub struct KeywordKnowledgeDetector {
    rules: Vec<KnowledgeRule>,
}

impl KeywordKnowledgeDetector {
    pub const NAME: &'static str = "keyword_knowledge";

    pub fn new() -> Result<Self, DetectionError> {
        let specs: [(&str, &'static str, &'static str, &'static str, u8); 5] = [
            (r"al[eé]rgic[oa]s? (?:a|al|a la|a los|a las) ", "salud", "alergias", "Alergia a", 3),
            (r"intolerantes? (?:a|al|a la|a los|a las) ", "salud", "intolerancias", "Intolerancia a", 3),
            (
                r"(?:tiene|diagnosticad[oa] con|sufre de) ",
                "salud",
                "condiciones médicas",
                "Condición:",
                3,
            ),
            (r"no le gustan? (?:el |la |los |las )?", "preferencias", "no le gusta", "No le gusta", 2),
            (r"le encantan? (?:el |la |los |las )?", "preferencias", "le encanta", "Le encanta", 1),
        ];

        let rules = specs
            .into_iter()
            .map(|(lead, category, subcategory, title_prefix, importance)| {
                Ok(KnowledgeRule {
                    pattern: compile(Self::NAME, &format!("{lead}({PHRASE})"))?,
                    category,
                    subcategory,
                    title_prefix,
                    importance,
                })
            })
            .collect::<Result<Vec<_>, DetectionError>>()?;
        Ok(Self { rules })
    }
}

/// Medical conditions the "tiene ..." rule accepts; anything else it captures is ignored.
const CONDITIONS: &[&str] = &[
    "reflujo",
    "asma",
    "dermatitis",
    "anemia",
    "bronquiolitis",
    "otitis",
    "cólicos",
    "colicos",
    "celiaquía",
    "celiaquia",
    "diabetes",
    "epilepsia",
];

/// Cut a captured phrase at the first connector and tidy it.
fn clean_phrase(raw: &str) -> String {
    let mut phrase = raw.trim();
    for connector in [" y ", " pero ", " porque ", " cuando ", " desde ", " que "] {
        if let Some(idx) = phrase.find(connector) {
            phrase = &phrase[..idx];
        }
    }
    phrase.trim().to_string()
}

#[async_trait]
impl KnowledgeDetector for KeywordKnowledgeDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn analyze(
        &self,
        message: &str,
        babies: &[ChildProfile],
    ) -> Result<Option<Vec<KnowledgeItem>>, DetectionError> {
        let lowered = message.to_lowercase();
        let Some(child) = target_child(&lowered, babies) else {
            return Ok(None);
        };

        let mut items = Vec::new();
        for rule in &self.rules {
            for captures in rule.pattern.captures_iter(&lowered) {
                let Some(raw) = captures.get(1) else { continue };
                let phrase = clean_phrase(raw.as_str());
                if phrase.is_empty() {
                    continue;
                }
                if rule.subcategory == "condiciones médicas"
                    && !CONDITIONS.iter().any(|c| phrase.starts_with(c))
                {
                    continue;
                }
                items.push(KnowledgeItem {
                    category: rule.category.to_string(),
                    subcategory: Some(rule.subcategory.to_string()),
                    title: format!("{} {}", rule.title_prefix, phrase),
                    description: message.trim().to_string(),
                    importance_level: rule.importance,
                    baby_name: child.name.clone(),
                });
            }
        }

        Ok(if items.is_empty() { None } else { Some(items) })
    }

    fn should_confirm(&self, detected: &[KnowledgeItem]) -> bool {
        !detected.is_empty()
    }

    fn confirmation_prompt(&self, detected: &[KnowledgeItem]) -> String {
        let baby = detected.first().map(|i| i.baby_name.as_str()).unwrap_or_default();
        let titles: Vec<&str> = detected.iter().map(|i| i.title.as_str()).collect();
        format!(
            "Noté información importante sobre {baby}: {}. ¿Quieres que la guarde en su perfil? Responde sí o no.",
            titles.join("; ")
        )
    }
}

// ── Routines ──────────────────────────────────────────────────────────────

const ROUTINE_VOCABULARY: &[&str] = &[
    "rutina",
    "horario",
    "se despierta",
    "despierta",
    "siesta",
    "se duerme",
    "a dormir",
    "baño",
    "desayuno",
    "almuerzo",
    "merienda",
    "cena",
    "toma",
    "papilla",
];

/// Trailing words that introduce the next time rather than describe an activity.
const TRAILING_CONNECTORS: &[&str] = &[
    " a las", " a la", " y", " luego", " después", " despues", " entonces", " hasta las",
];

const LEADING_CONNECTORS: &[&str] = &["hs ", "h ", "y ", "luego ", "después "];

/// Spots a schedule: two or more clock times plus routine vocabulary.
pub struct KeywordRoutineDetector {
    clock: Regex,
}

impl KeywordRoutineDetector {
    pub const NAME: &'static str = "keyword_routine";

    pub fn new() -> Result<Self, DetectionError> {
        Ok(Self {
            clock: compile(Self::NAME, r"\b([01]?[0-9]|2[0-3])[:.h]([0-5][0-9])\b")?,
        })
    }

    fn activities(&self, lowered: &str) -> Vec<RoutineActivity> {
        let matches: Vec<_> = self.clock.captures_iter(lowered).collect();
        let mut activities = Vec::with_capacity(matches.len());

        for (i, captures) in matches.iter().enumerate() {
            let (Some(whole), Some(hour), Some(minute)) =
                (captures.get(0), captures.get(1), captures.get(2))
            else {
                continue;
            };
            let segment_end = matches
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(lowered.len());
            let segment = &lowered[whole.end()..segment_end];
            let activity = describe_activity(segment);

            activities.push(RoutineActivity {
                time: format!("{:0>2}:{}", hour.as_str(), minute.as_str()),
                activity: if activity.is_empty() {
                    "actividad".to_string()
                } else {
                    activity
                },
                duration_minutes: None,
            });
        }
        activities
    }
}

fn describe_activity(segment: &str) -> String {
    let cut = segment
        .find([',', ';', '.', '\n'])
        .map(|idx| &segment[..idx])
        .unwrap_or(segment);
    let mut text = cut.trim().trim_start_matches(['-', ':']).trim().to_string();
    for prefix in LEADING_CONNECTORS {
        if let Some(stripped) = text.strip_prefix(prefix) {
            text = stripped.trim_start().to_string();
        }
    }

    loop {
        let before = text.len();
        for suffix in TRAILING_CONNECTORS {
            if let Some(stripped) = text.strip_suffix(suffix) {
                text = stripped.trim_end().to_string();
            }
        }
        if text.len() == before {
            break;
        }
    }
    text
}

fn routine_name(lowered: &str) -> &'static str {
    if lowered.contains("noche") || lowered.contains("dormir") {
        "Rutina de noche"
    } else if lowered.contains("mañana") {
        "Rutina de mañana"
    } else {
        "Rutina diaria"
    }
}

#[async_trait]
impl RoutineDetector for KeywordRoutineDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn analyze(
        &self,
        message: &str,
        babies: &[ChildProfile],
    ) -> Result<Option<RoutineProposal>, DetectionError> {
        let lowered = message.to_lowercase();
        if !ROUTINE_VOCABULARY.iter().any(|w| lowered.contains(w)) {
            return Ok(None);
        }
        let Some(child) = target_child(&lowered, babies) else {
            return Ok(None);
        };

        let activities = self.activities(&lowered);
        if activities.len() < 2 {
            return Ok(None);
        }

        let (first, last) = match (activities.first(), activities.last()) {
            (Some(first), Some(last)) => (first.time.clone(), last.time.clone()),
            _ => return Ok(None),
        };
        Ok(Some(RoutineProposal {
            baby_name: child.name.clone(),
            routine_name: routine_name(&lowered).to_string(),
            context_summary: format!(
                "Rutina de {} con {} actividades entre las {first} y las {last}",
                child.name,
                activities.len()
            ),
            activities,
        }))
    }

    fn should_confirm(&self, detected: &RoutineProposal) -> bool {
        detected.activities.len() >= 2
    }

    fn confirmation_prompt(&self, detected: &RoutineProposal) -> String {
        format!(
            "¿Quieres que guarde la rutina \"{}\" de {} ({} actividades) para tenerla en cuenta en próximas respuestas? Responde sí o no.",
            detected.routine_name,
            detected.baby_name,
            detected.activities.len()
        )
    }
}
